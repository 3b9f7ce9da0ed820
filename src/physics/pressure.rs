//! Air pressure from elevation via the hypsometric equation.

use crate::utils::constants::{C_TO_K, MILLIBAR_TO_PA, RGAS};

/// Molecular weight of dry air (g mol-1)
const MA: f64 = 28.9;
/// Gravitational acceleration (m s-2)
const GRAVITY: f64 = 9.8;
/// Reference sea-level pressure (mb)
const P0_MB: f64 = 1013.0;

/// Estimate air pressure (Pa) at `elevation` (m) for air temperature `tair` (°C).
///
/// The thickness of the layer between sea level and the site is set by its
/// mean virtual temperature. A first pass with the dry-air temperature gives
/// a pressure estimate that is used to compute the saturation specific
/// humidity, the virtual temperature correction follows from that, and the
/// pressure is recomputed with the virtual temperature.
///
/// `elevation` must already be a validated finite number; unusable
/// elevations are rejected when site metadata is parsed.
///
/// # Examples
/// ```
/// use medlyn_g1::physics::estimate_pressure;
///
/// let p = estimate_pressure(15.0, 0.0);
/// assert!((p - 101325.0).abs() < 300.0);
/// ```
pub fn estimate_pressure(tair: f64, elevation: f64) -> f64 {
    let tk = tair + C_TO_K;
    let scale = GRAVITY / (RGAS / (MA / 1000.0));

    // first approximation with the dry-air temperature (mb)
    let first_pass = P0_MB / (scale / tk * elevation).exp();

    let esat = 6.112 * (17.61 * tair / (tk - 29.65)).exp(); // mb
    let qsat = esat * 0.622 / (first_pass - 0.378 * esat); // kg kg-1

    let tv = tk * (1.0 + 0.61 * qsat);
    let press = P0_MB / (scale / tv * elevation).exp();

    press * MILLIBAR_TO_PA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sea_level_pressure() {
        let p = estimate_pressure(15.0, 0.0);
        assert!((p - 101325.0).abs() < 300.0, "sea level pressure {}", p);
    }

    #[test]
    fn test_pressure_decreases_with_elevation() {
        for tair in [-10.0, 0.0, 15.0, 30.0] {
            let mut previous = f64::INFINITY;
            for elevation in (0..=4000).step_by(250) {
                let p = estimate_pressure(tair, elevation as f64);
                assert!(p < previous, "not decreasing at {} m, {} °C", elevation, tair);
                previous = p;
            }
        }
    }

    #[test]
    fn test_mountain_site_pressure() {
        // roughly 89 kPa expected at 1000 m
        let p = estimate_pressure(10.0, 1000.0);
        assert!(p > 87_000.0 && p < 91_000.0, "pressure at 1000 m {}", p);
    }

    #[test]
    fn test_warmer_air_thicker_layer() {
        let cold = estimate_pressure(-5.0, 2000.0);
        let warm = estimate_pressure(25.0, 2000.0);
        assert!(warm > cold);
    }
}
