//! Run configuration: filtering thresholds, screening lists and the
//! fixed site-year tables used by the pipeline.
//!
//! Sources are layered with the `config` crate: built-in defaults, an
//! optional TOML file, then `MEDLYN_G1_*` environment variables
//! (`__` separates nesting, e.g. `MEDLYN_G1_FILTER__MIN_SAMPLES=60`).

use crate::error::Result;
use crate::utils::constants::ENV_PREFIX;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteYear {
    pub site: String,
    pub year: i32,
}

impl SiteYear {
    pub fn new(site: &str, year: i32) -> Self {
        Self {
            site: site.to_string(),
            year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PftRename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FilterConfig {
    /// First daylight hour kept (inclusive)
    #[validate(range(min = 0, max = 23))]
    pub daylight_start_hour: u32,
    /// Last daylight hour kept (inclusive)
    #[validate(range(min = 0, max = 23))]
    pub daylight_end_hour: u32,
    /// ET threshold (mol m-2 s-1)
    pub min_et: f64,
    /// VPD threshold (kPa)
    #[validate(range(min = 0.0))]
    pub min_vpd: f64,
    #[validate(range(min = 2))]
    pub min_samples: usize,
    /// Conductance above mean + k * SD is discarded
    #[validate(range(min = 0.0))]
    pub extreme_sd_multiplier: f64,
    /// Half-hours excluded after a precipitation event
    #[validate(range(min = 0, max = 480))]
    pub rain_window_hours: i64,
    /// Pressure used when elevation is unusable (kPa)
    #[validate(range(min = 1.0))]
    pub standard_pressure_kpa: f64,
    #[validate(range(min = 0.0, max = 90.0))]
    pub tropics_latitude: f64,
    /// When the Penman-Monteith estimator meets an unusable elevation,
    /// estimate with the standard-pressure shortcut instead of failing
    pub pm_fallback_to_bulk: bool,
    /// Site-years whose tower CO2 departs from the global mean and is
    /// overridden with it
    pub bad_co2_site_years: Vec<SiteYear>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let bad_co2 = [
            ("BE-Vie", 1998),
            ("CN-Hny", 2005),
            ("CN-Hny", 2006),
            ("DK-Lva", 2005),
            ("DK-Sor", 2004),
            ("ES-ES1", 2003),
            ("IE-Dri", 2005),
            ("IT-Non", 2002),
            ("PT-Esp", 2004),
            ("UK-Gri", 2006),
            ("UK-Her", 2006),
            ("US-SRM", 2004),
            ("US-SRM", 2005),
            ("US-SRM", 2006),
            ("US-Wkg", 2004),
            ("US-Wkg", 2006),
            ("ZA-Kru", 2003),
        ];

        Self {
            daylight_start_hour: 9,
            daylight_end_hour: 15,
            min_et: 0.01 / 1000.0,
            min_vpd: 0.05,
            min_samples: 50,
            extreme_sd_multiplier: 3.0,
            rain_window_hours: 24,
            standard_pressure_kpa: 101.135,
            tropics_latitude: 23.43723,
            pm_fallback_to_bulk: true,
            bad_co2_site_years: bad_co2.iter().map(|(s, y)| SiteYear::new(s, *y)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScreeningConfig {
    /// Fits failing for known data problems (no summer precip, g1 = 0)
    pub bad_site_years: Vec<SiteYear>,
    /// Clearcut, burnt or recently planted sites
    pub disturbed_sites: Vec<String>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_r2: f64,
    /// Interannual g1 anomaly (%) above which a site-year is dropped
    #[validate(range(min = 0.0))]
    pub max_interannual_anomaly_pct: f64,
    /// Site-years re-labelled as C4 crops
    pub c4_crop_site_years: Vec<SiteYear>,
    pub c4_crop_pft: String,
    /// PFT code renames applied to every row
    pub pft_renames: Vec<PftRename>,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        let disturbed = [
            "CA-Ca2", "CA-NS7", "CA-Qcu", "CA-SF3", "CA-TP1", "US-Bn3", "US-Me1", "US-NC1",
            "US-SO4", "US-SP2", "US-Wi7", "US-Wi8", "CN-Ku1",
        ];
        let c4_crops = [
            ("NL-Lan", 2005),
            ("NL-Lan", 2006),
            ("US-ARM", 2005),
            ("US-Bo1", 1997),
            ("US-Bo1", 1999),
            ("US-Bo1", 2001),
            ("US-Bo1", 2003),
            ("US-Bo1", 2005),
            ("US-Bo1", 2007),
            ("US-Bo2", 2004),
            ("US-Bo2", 2006),
            ("US-IB1", 2006),
            ("US-Ne1", 2001),
            ("US-Ne1", 2002),
            ("US-Ne1", 2003),
            ("US-Ne1", 2004),
            ("US-Ne1", 2005),
            ("US-Ne2", 2001),
            ("US-Ne2", 2003),
            ("US-Ne2", 2005),
            ("US-Ne3", 2001),
            ("US-Ne3", 2003),
            ("US-Ne3", 2005),
            ("DK-Fou", 2005),
            ("FR-Gri", 2005),
            ("IT-BCi", 2004),
            ("IT-BCi", 2005),
            ("IT-BCi", 2006),
        ];
        let renames = [
            ("CSH", "SHB"),
            ("OSH", "SHB"),
            ("WSA", "SAV"),
            ("GRA", "C3G"),
            ("CRO", "C3C"),
            ("TropRF", "TRF"),
        ];

        Self {
            bad_site_years: vec![
                SiteYear::new("UK-Gri", 2005),
                SiteYear::new("IT-Col", 2003),
                SiteYear::new("IT-LMa", 2006),
            ],
            disturbed_sites: disturbed.iter().map(|s| s.to_string()).collect(),
            min_r2: 0.2,
            max_interannual_anomaly_pct: 50.0,
            c4_crop_site_years: c4_crops.iter().map(|(s, y)| SiteYear::new(s, *y)).collect(),
            c4_crop_pft: "C4C".to_string(),
            pft_renames: renames
                .iter()
                .map(|(from, to)| PftRename {
                    from: from.to_string(),
                    to: to.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[validate(nested)]
    pub filter: FilterConfig,
    #[validate(nested)]
    pub screening: ScreeningConfig,
    /// Worker count; defaults to the number of CPUs
    #[validate(range(min = 1))]
    pub workers: Option<usize>,
}

impl PipelineConfig {
    /// Load defaults, then the optional TOML file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: PipelineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn toml_file() -> std::io::Result<NamedTempFile> {
        Builder::new().suffix(".toml").tempfile()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filter.min_samples, 50);
        assert_eq!(config.filter.bad_co2_site_years.len(), 17);
        assert!(config
            .filter
            .bad_co2_site_years
            .contains(&SiteYear::new("US-SRM", 2005)));
        assert!(config
            .screening
            .pft_renames
            .iter()
            .any(|r| r.from == "TropRF" && r.to == "TRF"));
    }

    #[test]
    fn test_load_without_file_gives_defaults() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.filter, FilterConfig::default());
        assert_eq!(config.screening.min_r2, 0.2);
    }

    #[test]
    fn test_toml_overrides() -> Result<()> {
        let mut file = toml_file()?;
        writeln!(file, "workers = 3")?;
        writeln!(file, "[filter]")?;
        writeln!(file, "min_samples = 75")?;
        writeln!(file, "rain_window_hours = 12")?;
        writeln!(file, "[screening]")?;
        writeln!(file, "min_r2 = 0.3")?;

        let config = PipelineConfig::load(Some(file.path()))?;
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.filter.min_samples, 75);
        assert_eq!(config.filter.rain_window_hours, 12);
        assert_eq!(config.filter.daylight_start_hour, 9);
        assert_eq!(config.screening.min_r2, 0.3);
        Ok(())
    }

    #[test]
    fn test_invalid_values_rejected() -> Result<()> {
        let mut file = toml_file()?;
        writeln!(file, "[screening]")?;
        writeln!(file, "min_r2 = 1.5")?;

        assert!(PipelineConfig::load(Some(file.path())).is_err());
        Ok(())
    }
}
