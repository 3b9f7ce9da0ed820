use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Quality-control flags; `true` means the gap-filled value passed QC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcFlags {
    pub le: bool,
    pub h: bool,
    pub rnet: bool,
    pub ground_heat: bool,
    pub vpd: bool,
    pub gpp: bool,
    pub precip: bool,
    pub wind: bool,
    pub tair: bool,
}

impl QcFlags {
    pub fn all_ok() -> Self {
        Self {
            le: true,
            h: true,
            rnet: true,
            ground_heat: true,
            vpd: true,
            gpp: true,
            precip: true,
            wind: true,
            tair: true,
        }
    }

    /// QC needed for the energy-balance closure ratio
    pub fn energy_balance_ok(&self) -> bool {
        self.le && self.h && self.rnet && self.ground_heat
    }
}

/// One half-hourly flux-tower observation. Missing values are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfHourRecord {
    pub timestamp: NaiveDateTime,
    /// Vapour pressure deficit (hPa)
    pub vpd: Option<f64>,
    /// Gross primary productivity (umol m-2 s-1)
    pub gpp: Option<f64>,
    /// CO2 concentration (umol mol-1)
    pub co2: Option<f64>,
    /// Latent heat flux (W m-2)
    pub le: Option<f64>,
    /// Sensible heat flux (W m-2)
    pub h: Option<f64>,
    /// Net radiation (W m-2)
    pub rnet: Option<f64>,
    /// Ground heat flux (W m-2)
    pub ground_heat: Option<f64>,
    /// Precipitation (mm)
    pub precip: Option<f64>,
    /// Wind speed (m s-1)
    pub wind: Option<f64>,
    /// Friction velocity (m s-1)
    pub ustar: Option<f64>,
    /// Air temperature (°C)
    pub tair: Option<f64>,
    pub qc: QcFlags,
}

impl HalfHourRecord {
    pub fn empty(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            vpd: None,
            gpp: None,
            co2: None,
            le: None,
            h: None,
            rnet: None,
            ground_heat: None,
            precip: None,
            wind: None,
            ustar: None,
            tair: None,
            qc: QcFlags::default(),
        }
    }
}

/// A single site-year of half-hourly observations
#[derive(Debug, Clone)]
pub struct SiteYearSeries {
    pub site: String,
    pub year: i32,
    pub records: Vec<HalfHourRecord>,
}

impl SiteYearSeries {
    pub fn new(site: String, year: i32, records: Vec<HalfHourRecord>) -> Self {
        Self {
            site,
            year,
            records,
        }
    }

    /// The calendar year most slots fall in (median of slot years)
    pub fn dominant_year(&self) -> Option<i32> {
        let mut counts: HashMap<i32, usize> = HashMap::new();
        for record in &self.records {
            *counts.entry(record.timestamp.year()).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(year, _)| year)
    }

    /// Flux files carry one trailing slot stamped in the following year;
    /// drop every slot outside the dominant year. Returns the number removed.
    pub fn normalize_trailing_timestamp(&mut self) -> usize {
        let Some(year) = self.dominant_year() else {
            return 0;
        };
        let before = self.records.len();
        self.records.retain(|r| r.timestamp.year() == year);
        self.records.sort_by_key(|r| r.timestamp);
        before - self.records.len()
    }

    pub fn has_gpp(&self) -> bool {
        self.records.iter().any(|r| r.gpp.is_some())
    }
}
