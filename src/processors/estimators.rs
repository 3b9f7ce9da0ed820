//! Strategies for turning quality-controlled flux slots into canopy
//! conductance estimates.

use crate::error::{ProcessingError, Result};
use crate::models::{Elevation, HalfHourRecord};
use crate::physics::{estimate_pressure, Forcing, PenmanMonteith};
use crate::processors::filters::{latent_heat_to_et, SlotRequirements};
use crate::utils::constants::{BAD_VALUE, HPA_TO_KPA, KPA_TO_PA};
use crate::utils::stats::mean;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EstimationMethod {
    Simple,
    PenmanMonteith,
}

impl EstimationMethod {
    /// Suffix distinguishing the fit tables of the two variants
    pub fn output_suffix(&self) -> &'static str {
        match self {
            EstimationMethod::Simple => "",
            EstimationMethod::PenmanMonteith => "_PM",
        }
    }
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationMethod::Simple => write!(f, "simple"),
            EstimationMethod::PenmanMonteith => write!(f, "penman-monteith"),
        }
    }
}

/// `gs_method` labels written to the fit table
pub const GS_BULK_HYPSOMETRIC: &str = "bulk_hypsometric_pressure";
pub const GS_BULK_STANDARD: &str = "bulk_standard_pressure";
pub const GS_PENMAN_MONTEITH: &str = "penman_monteith";

/// Conductance per slot (NaN where a slot could not be estimated) and the
/// slot-mean decoupling coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct ConductanceEstimate {
    pub gs: Vec<f64>,
    pub omega: f64,
    pub method: &'static str,
}

pub trait ConductanceEstimator: Send + Sync {
    fn method(&self) -> EstimationMethod;

    /// QC flags the daylight filter must additionally require, decided
    /// from the productive-month slots and the site elevation.
    fn requirements(
        &self,
        productive: &[&HalfHourRecord],
        elevation: &Elevation,
    ) -> SlotRequirements;

    fn estimate(
        &self,
        slots: &[&HalfHourRecord],
        elevation: &Elevation,
        requirements: &SlotRequirements,
    ) -> Result<ConductanceEstimate>;
}

/// Fully coupled canopy: gs = ET · P / VPD.
///
/// Pressure is hypsometric when the elevation is usable and the slot has an
/// air temperature, otherwise the standard pressure. The row label follows
/// whichever source covered most slots.
#[derive(Debug, Clone)]
pub struct BulkTransferEstimator {
    standard_pressure_kpa: f64,
}

impl BulkTransferEstimator {
    pub fn new(standard_pressure_kpa: f64) -> Self {
        Self {
            standard_pressure_kpa,
        }
    }

    /// Pressure (kPa) and whether it came from the hypsometric equation
    fn pressure_kpa(&self, slot: &HalfHourRecord, elevation: Option<f64>) -> (f64, bool) {
        match (elevation, slot.tair) {
            (Some(elev), Some(tair)) => (estimate_pressure(tair, elev) / KPA_TO_PA, true),
            _ => (self.standard_pressure_kpa, false),
        }
    }
}

impl ConductanceEstimator for BulkTransferEstimator {
    fn method(&self) -> EstimationMethod {
        EstimationMethod::Simple
    }

    fn requirements(
        &self,
        _productive: &[&HalfHourRecord],
        _elevation: &Elevation,
    ) -> SlotRequirements {
        SlotRequirements::default()
    }

    fn estimate(
        &self,
        slots: &[&HalfHourRecord],
        elevation: &Elevation,
        _requirements: &SlotRequirements,
    ) -> Result<ConductanceEstimate> {
        let elev = elevation.metres();
        let mut hypsometric = 0;
        let gs = slots
            .iter()
            .map(|slot| {
                let (pressure, estimated) = self.pressure_kpa(slot, elev);
                if estimated {
                    hypsometric += 1;
                }
                match (slot.le, slot.vpd) {
                    (Some(le), Some(vpd)) => latent_heat_to_et(le) * pressure / (vpd * HPA_TO_KPA),
                    _ => f64::NAN,
                }
            })
            .collect();

        Ok(ConductanceEstimate {
            gs,
            omega: BAD_VALUE,
            method: if hypsometric * 2 > slots.len() {
                GS_BULK_HYPSOMETRIC
            } else {
                GS_BULK_STANDARD
            },
        })
    }
}

/// Inverted Penman-Monteith with boundary-layer conductance from ustar.
///
/// With a bulk fallback and an unusable elevation the site-year is estimated
/// by the fallback alone, so only the fallback's QC requirements apply.
#[derive(Debug, Clone)]
pub struct PenmanMonteithEstimator {
    model: PenmanMonteith,
    fallback: Option<BulkTransferEstimator>,
}

impl PenmanMonteithEstimator {
    pub fn new(model: PenmanMonteith) -> Self {
        Self {
            model,
            fallback: None,
        }
    }

    /// Estimate with the standard-pressure shortcut when elevation is unusable
    pub fn with_fallback(mut self, fallback: BulkTransferEstimator) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn forcing(
        slot: &HalfHourRecord,
        elevation: f64,
        requirements: &SlotRequirements,
    ) -> Option<Forcing> {
        let tair = slot.tair?;
        Some(Forcing {
            vpd: slot.vpd? * HPA_TO_KPA * KPA_TO_PA,
            wind: slot.wind?,
            rnet: slot.rnet?,
            tair,
            pressure: estimate_pressure(tair, elevation),
            ustar: slot.ustar,
            ground_heat_flux: if requirements.ground_heat {
                slot.ground_heat
            } else {
                None
            },
        })
    }
}

impl ConductanceEstimator for PenmanMonteithEstimator {
    fn method(&self) -> EstimationMethod {
        EstimationMethod::PenmanMonteith
    }

    fn requirements(
        &self,
        productive: &[&HalfHourRecord],
        elevation: &Elevation,
    ) -> SlotRequirements {
        if let (None, Some(bulk)) = (elevation.metres(), &self.fallback) {
            return bulk.requirements(productive, elevation);
        }
        SlotRequirements {
            wind: true,
            rnet: true,
            tair: true,
            ground_heat: productive.iter().any(|s| s.qc.ground_heat),
        }
    }

    fn estimate(
        &self,
        slots: &[&HalfHourRecord],
        elevation: &Elevation,
        requirements: &SlotRequirements,
    ) -> Result<ConductanceEstimate> {
        let Some(elev) = elevation.metres() else {
            return match &self.fallback {
                Some(bulk) => bulk.estimate(slots, elevation, requirements),
                None => Err(ProcessingError::MissingData(format!(
                    "unusable elevation {:?} for Penman-Monteith",
                    elevation
                ))),
            };
        };

        let mut gs = Vec::with_capacity(slots.len());
        let mut omegas = Vec::new();
        for slot in slots {
            let estimate = Self::forcing(slot, elev, requirements).and_then(|forcing| {
                let le = slot.le?;
                let g = self.model.invert(&forcing, latent_heat_to_et(le)).ok()?;
                Some((forcing, g))
            });

            match estimate {
                Some((forcing, g)) => {
                    if let Ok(omega) = self.model.decoupling_coefficient(&forcing, g) {
                        if (0.0..=1.0).contains(&omega) {
                            omegas.push(omega);
                        }
                    }
                    gs.push(g);
                }
                None => gs.push(f64::NAN),
            }
        }

        let omega = if omegas.len() > 1 {
            mean(&omegas).unwrap_or(BAD_VALUE)
        } else {
            BAD_VALUE
        };

        Ok(ConductanceEstimate {
            gs,
            omega,
            method: GS_PENMAN_MONTEITH,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QcFlags;
    use chrono::NaiveDate;

    fn slot() -> HalfHourRecord {
        let ts = NaiveDate::from_ymd_opt(2003, 7, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let mut r = HalfHourRecord::empty(ts);
        r.vpd = Some(15.0);
        r.gpp = Some(12.0);
        r.le = Some(250.0);
        r.h = Some(120.0);
        r.rnet = Some(500.0);
        r.ground_heat = Some(30.0);
        r.wind = Some(3.0);
        r.ustar = Some(0.5);
        r.tair = Some(22.0);
        r.qc = QcFlags::all_ok();
        r
    }

    #[test]
    fn test_bulk_standard_pressure() {
        let estimator = BulkTransferEstimator::new(101.135);
        let s = slot();
        let est = estimator
            .estimate(&[&s], &Elevation::Unusable("TBD".into()), &SlotRequirements::default())
            .unwrap();

        let expected = latent_heat_to_et(250.0) * 101.135 / 1.5;
        assert!((est.gs[0] - expected).abs() < 1e-12);
        assert_eq!(est.method, GS_BULK_STANDARD);
        assert_eq!(est.omega, BAD_VALUE);
    }

    #[test]
    fn test_bulk_estimated_pressure_is_lower_at_altitude() {
        let estimator = BulkTransferEstimator::new(101.135);
        let s = slot();
        let req = SlotRequirements::default();
        let low = estimator.estimate(&[&s], &Elevation::Metres(0.0), &req).unwrap();
        let high = estimator.estimate(&[&s], &Elevation::Metres(2000.0), &req).unwrap();
        assert!(high.gs[0] < low.gs[0]);
        assert_eq!(high.method, GS_BULK_HYPSOMETRIC);
    }

    #[test]
    fn test_pm_requirements_follow_ground_heat_qc() {
        let estimator = PenmanMonteithEstimator::new(PenmanMonteith::with_friction_velocity());
        let elevation = Elevation::Metres(300.0);
        let mut s = slot();
        assert!(estimator.requirements(&[&s], &elevation).ground_heat);
        s.qc.ground_heat = false;
        let req = estimator.requirements(&[&s], &elevation);
        assert!(!req.ground_heat);
        assert!(req.wind && req.rnet && req.tair);
    }

    #[test]
    fn test_pm_fallback_drops_energy_balance_requirements() {
        let unusable = Elevation::Unusable("TBD".into());
        let s = slot();

        let strict = PenmanMonteithEstimator::new(PenmanMonteith::with_friction_velocity());
        assert!(strict.requirements(&[&s], &unusable).wind);

        let lenient = strict.with_fallback(BulkTransferEstimator::new(101.135));
        assert_eq!(
            lenient.requirements(&[&s], &unusable),
            SlotRequirements::default()
        );
        assert!(lenient.requirements(&[&s], &Elevation::Metres(20.0)).rnet);
    }

    #[test]
    fn test_bulk_label_follows_majority_pressure_source() {
        let estimator = BulkTransferEstimator::new(101.135);
        let req = SlotRequirements::default();
        let elevation = Elevation::Metres(800.0);
        let with_tair = slot();
        let mut without_tair = slot();
        without_tair.tair = None;

        let mostly_missing = estimator
            .estimate(&[&with_tair, &without_tair, &without_tair], &elevation, &req)
            .unwrap();
        assert_eq!(mostly_missing.method, GS_BULK_STANDARD);
        let expected = latent_heat_to_et(250.0) * 101.135 / 1.5;
        assert!((mostly_missing.gs[1] - expected).abs() < 1e-12);
        assert!(mostly_missing.gs[0] < mostly_missing.gs[1]);

        let mostly_present = estimator
            .estimate(&[&with_tair, &with_tair, &without_tair], &elevation, &req)
            .unwrap();
        assert_eq!(mostly_present.method, GS_BULK_HYPSOMETRIC);
    }

    #[test]
    fn test_pm_inverts_forward_model() {
        let model = PenmanMonteith::with_friction_velocity();
        let estimator = PenmanMonteithEstimator::new(model.clone());
        let req = SlotRequirements {
            wind: true,
            rnet: true,
            tair: true,
            ground_heat: true,
        };

        // LE consistent with gs = 0.3 mol m-2 s-1
        let mut s = slot();
        let forcing = PenmanMonteithEstimator::forcing(&s, 500.0, &req).unwrap();
        let et = model.forward(&forcing, 0.3).unwrap();
        s.le = Some(et / latent_heat_to_et(1.0));

        let est = estimator
            .estimate(&[&s, &s], &Elevation::Metres(500.0), &req)
            .unwrap();
        assert!((est.gs[0] - 0.3).abs() < 1e-9);
        assert!(est.omega > 0.0 && est.omega < 1.0);
        assert_eq!(est.method, GS_PENMAN_MONTEITH);
    }

    #[test]
    fn test_pm_missing_ustar_gives_nan_slot() {
        let estimator = PenmanMonteithEstimator::new(PenmanMonteith::with_friction_velocity());
        let mut s = slot();
        s.ustar = None;
        let est = estimator
            .estimate(&[&s], &Elevation::Metres(100.0), &SlotRequirements::default())
            .unwrap();
        assert!(est.gs[0].is_nan());
        // a single slot never yields a mean omega
        assert_eq!(est.omega, BAD_VALUE);
    }

    #[test]
    fn test_pm_unusable_elevation() {
        let unusable = Elevation::Unusable("450-570".into());
        let strict = PenmanMonteithEstimator::new(PenmanMonteith::with_friction_velocity());
        let s = slot();
        let req = SlotRequirements::default();
        assert!(strict.estimate(&[&s], &unusable, &req).is_err());

        let lenient = strict.with_fallback(BulkTransferEstimator::new(101.135));
        let est = lenient.estimate(&[&s], &unusable, &req).unwrap();
        assert_eq!(est.method, GS_BULK_STANDARD);
    }
}
