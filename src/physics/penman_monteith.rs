//! Penman-Monteith combination equation for canopy transpiration.
//!
//! The forward model estimates transpiration from a known canopy
//! conductance; the inversion recovers the conductance implied by an
//! observed transpiration rate (Landsberg & Sands eqn 2.53). The decoupling
//! coefficient follows McNaughton & Jarvis (1986).

use crate::utils::constants::{C_TO_K, RGAS};
use thiserror::Error;

/// Specific heat of dry air (J kg-1 K-1)
const CP: f64 = 1010.0;
/// von Karman's constant
const VK: f64 = 0.41;
/// Latent heat of vaporisation of water at 0 °C (J kg-1)
const H2OLV0: f64 = 2.501E6;
/// Molecular mass of water (kg mol-1)
const H2OMW: f64 = 18E-3;
/// Molecular mass of air (kg mol-1)
const MASS_AIR: f64 = 29.0E-3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PenmanMonteithError {
    #[error("friction velocity is required when boundary-layer conductance is computed from ustar")]
    MissingFrictionVelocity,

    #[error("boundary-layer conductance is not positive: {0}")]
    NonPositiveBoundaryLayer(f64),

    #[error("stomatal conductance must be positive, got {0}")]
    NonPositiveConductance(f64),

    #[error("non-finite result from {0}")]
    NonFinite(&'static str),
}

type PmResult<T> = std::result::Result<T, PenmanMonteithError>;

/// How the aerodynamic (boundary-layer) conductance is obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryLayer {
    /// From measured friction velocity (Monteith & Unsworth eqn 17.8)
    FrictionVelocity,
    /// From canopy height and wind speed (Jones 1992, pg. 67-8)
    CanopyHeight {
        /// Canopy height (m)
        height: f64,
    },
}

/// Meteorological drivers for one half-hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forcing {
    /// Vapour pressure deficit (Pa)
    pub vpd: f64,
    /// Wind speed (m s-1)
    pub wind: f64,
    /// Net radiation (W m-2)
    pub rnet: f64,
    /// Air temperature (°C)
    pub tair: f64,
    /// Air pressure (Pa)
    pub pressure: f64,
    /// Friction velocity (m s-1)
    pub ustar: Option<f64>,
    /// Ground heat flux (W m-2), treated as zero when absent
    pub ground_heat_flux: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PenmanMonteith {
    /// Rate of change of roughness length for momentum with canopy height
    dz0v_dh: f64,
    /// Ratio of roughness length for heat to roughness length for momentum
    z0h_z0m: f64,
    /// Zero-plane displacement height as a fraction of canopy height
    displace_ratio: f64,
    boundary_layer: BoundaryLayer,
}

impl PenmanMonteith {
    pub fn new(boundary_layer: BoundaryLayer) -> Self {
        Self {
            dz0v_dh: 0.075,
            z0h_z0m: 0.1,
            displace_ratio: 0.67,
            boundary_layer,
        }
    }

    /// Boundary-layer conductance from measured friction velocity.
    pub fn with_friction_velocity() -> Self {
        Self::new(BoundaryLayer::FrictionVelocity)
    }

    pub fn with_roughness(mut self, dz0v_dh: f64, z0h_z0m: f64, displace_ratio: f64) -> Self {
        self.dz0v_dh = dz0v_dh;
        self.z0h_z0m = z0h_z0m;
        self.displace_ratio = displace_ratio;
        self
    }

    pub fn boundary_layer(&self) -> BoundaryLayer {
        self.boundary_layer
    }

    /// Transpiration (mol H2O m-2 s-1) for stomatal conductance `gs`
    /// (mol m-2 s-1). Negative values are clipped to zero.
    pub fn forward(&self, forcing: &Forcing, gs: f64) -> PmResult<f64> {
        if gs <= 0.0 {
            return Err(PenmanMonteithError::NonPositiveConductance(gs));
        }
        let ga = self.boundary_layer_conductance(forcing)?;
        let lambda = latent_heat_of_vaporisation(forcing.tair);
        let gamma = psychrometric_constant(lambda, forcing.pressure);
        let slope = slope_of_saturation_vapour_pressure(forcing.tair);
        let ground = forcing.ground_heat_flux.unwrap_or(0.0);

        let arg1 = slope * (forcing.rnet - ground) + ga * MASS_AIR * CP * forcing.vpd;
        let arg2 = slope + gamma * (1.0 + ga / gs);
        let le = arg1 / arg2;

        let transpiration = (le / lambda).max(0.0);
        finite(transpiration, "forward")
    }

    /// Canopy conductance (mol m-2 s-1) implied by an observed
    /// transpiration rate (mol H2O m-2 s-1).
    pub fn invert(&self, forcing: &Forcing, transpiration: f64) -> PmResult<f64> {
        let ga = self.boundary_layer_conductance(forcing)?;
        let lambda = latent_heat_of_vaporisation(forcing.tair);
        let gamma = psychrometric_constant(lambda, forcing.pressure);
        let slope = slope_of_saturation_vapour_pressure(forcing.tair);
        let ground = forcing.ground_heat_flux.unwrap_or(0.0);
        let lambda_e = transpiration * lambda;

        let arg1 = ga * gamma * lambda_e;
        let arg2 = slope * (forcing.rnet - ground) - (slope + gamma) * lambda_e;
        let arg3 = ga * MASS_AIR * CP * forcing.vpd;

        finite(arg1 / (arg2 + arg3), "invert")
    }

    /// Decoupling coefficient: 0 when the canopy is fully coupled to the
    /// atmosphere, 1 when fully decoupled. Not clamped.
    pub fn decoupling_coefficient(&self, forcing: &Forcing, gs: f64) -> PmResult<f64> {
        let ga = self.boundary_layer_conductance(forcing)?;
        let lambda = latent_heat_of_vaporisation(forcing.tair);
        let gamma = psychrometric_constant(lambda, forcing.pressure);
        let slope = slope_of_saturation_vapour_pressure(forcing.tair);

        let epsilon = slope / gamma;
        finite((1.0 + epsilon) / (1.0 + epsilon + ga / gs), "decoupling")
    }

    /// Boundary-layer conductance (mol m-2 s-1)
    pub fn boundary_layer_conductance(&self, forcing: &Forcing) -> PmResult<f64> {
        let cmolar = forcing.pressure / (RGAS * (forcing.tair + C_TO_K));

        let ga = match self.boundary_layer {
            BoundaryLayer::FrictionVelocity => {
                let ustar = forcing
                    .ustar
                    .ok_or(PenmanMonteithError::MissingFrictionVelocity)?;
                cmolar / (forcing.wind / ustar.powi(2) + 6.2 * ustar.powf(-0.667))
            }
            BoundaryLayer::CanopyHeight { height } => {
                let z0m = self.dz0v_dh * height;
                let z0h = self.z0h_z0m * z0m;
                let d = self.displace_ratio * height;

                let arg1 = VK.powi(2) * forcing.wind;
                let arg2 = ((height - d) / z0m).ln();
                let arg3 = ((height - d) / z0h).ln();
                arg1 / (arg2 * arg3) * cmolar
            }
        };

        if !ga.is_finite() {
            return Err(PenmanMonteithError::NonFinite("boundary-layer conductance"));
        }
        if ga <= 0.0 {
            return Err(PenmanMonteithError::NonPositiveBoundaryLayer(ga));
        }
        Ok(ga)
    }
}

impl Default for PenmanMonteith {
    fn default() -> Self {
        Self::with_friction_velocity()
    }
}

fn finite(value: f64, stage: &'static str) -> PmResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PenmanMonteithError::NonFinite(stage))
    }
}

/// Latent heat of vaporisation (J mol-1) at air temperature `tair` (°C)
pub fn latent_heat_of_vaporisation(tair: f64) -> f64 {
    (H2OLV0 - 2.365E3 * tair) * H2OMW
}

/// Psychrometric constant (Pa K-1)
pub fn psychrometric_constant(lambda: f64, pressure: f64) -> f64 {
    CP * MASS_AIR * pressure / lambda
}

/// Saturation vapour pressure (Pa), Jones 1992 p 110
pub fn saturation_vapour_pressure(tair: f64) -> f64 {
    613.75 * (17.502 * tair / (240.97 + tair)).exp()
}

/// Slope of the saturation vapour pressure curve (Pa K-1)
pub fn slope_of_saturation_vapour_pressure(tair: f64) -> f64 {
    (saturation_vapour_pressure(tair + 0.1) - saturation_vapour_pressure(tair)) / 0.1
}
