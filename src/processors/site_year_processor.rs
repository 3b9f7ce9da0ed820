use crate::config::{FilterConfig, SiteYear};
use crate::models::{FitResult, FitStatistics, HalfHourRecord, SiteIdentity, SiteYearSeries};
use crate::physics::conductance::Drivers;
use crate::physics::{MedlynModel, PenmanMonteith};
use crate::processors::estimators::{
    BulkTransferEstimator, ConductanceEstimator, EstimationMethod, PenmanMonteithEstimator,
};
use crate::processors::filters::{
    energy_balance_ratio, extreme_value_mask, fill_co2, in_months, latent_heat_to_et,
    most_productive_months, passes_daylight_qc, summer_precipitation, RainWindow,
};
use crate::readers::{FluxReader, GlobalCo2Table, SiteCatalog};
use crate::utils::constants::{BAD_VALUE, HPA_TO_KPA, MOL_TO_MMOL, PFT_TROPICAL_RAINFOREST};
use crate::utils::filename::{parse_site_year, SiteYearKey};
use crate::utils::stats::{mean, std_population};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info_span};

/// Pipeline stages a site-year moves through on its way to a good row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    MonthSelected,
    ConductanceDerived,
    QcFiltered,
    Fitted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loaded => "loaded",
            Stage::MonthSelected => "month_selected",
            Stage::ConductanceDerived => "conductance_derived",
            Stage::QcFiltered => "qc_filtered",
            Stage::Fitted => "fitted",
        };
        f.write_str(name)
    }
}

/// Why a site-year ended as a bad row
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage}: {reason}")]
pub struct Rejection {
    pub stage: Stage,
    pub reason: String,
}

impl Rejection {
    fn at(stage: Stage, reason: impl fmt::Display) -> Self {
        Self {
            stage,
            reason: reason.to_string(),
        }
    }
}

/// One slot that survived every filter and has a usable conductance
struct Sample<'a> {
    slot: &'a HalfHourRecord,
    co2: f64,
    gs: f64,
}

/// Fits g1 for one site-year. Every call produces exactly one row; any
/// failure becomes the canonical bad row.
pub struct SiteYearProcessor {
    filter: FilterConfig,
    catalog: SiteCatalog,
    co2: GlobalCo2Table,
    estimator: Box<dyn ConductanceEstimator>,
    model: MedlynModel,
    reader: FluxReader,
}

impl SiteYearProcessor {
    pub fn new(
        filter: FilterConfig,
        catalog: SiteCatalog,
        co2: GlobalCo2Table,
        estimator: Box<dyn ConductanceEstimator>,
    ) -> Self {
        Self {
            filter,
            catalog,
            co2,
            estimator,
            model: MedlynModel::new(),
            reader: FluxReader::new(),
        }
    }

    /// Build the processor with the estimator for `method`
    pub fn for_method(
        method: EstimationMethod,
        filter: FilterConfig,
        catalog: SiteCatalog,
        co2: GlobalCo2Table,
    ) -> Self {
        let bulk = BulkTransferEstimator::new(filter.standard_pressure_kpa);
        let estimator: Box<dyn ConductanceEstimator> = match method {
            EstimationMethod::Simple => Box::new(bulk),
            EstimationMethod::PenmanMonteith => {
                let pm = PenmanMonteithEstimator::new(PenmanMonteith::with_friction_velocity());
                if filter.pm_fallback_to_bulk {
                    Box::new(pm.with_fallback(bulk))
                } else {
                    Box::new(pm)
                }
            }
        };
        Self::new(filter, catalog, co2, estimator)
    }

    pub fn with_model(mut self, model: MedlynModel) -> Self {
        self.model = model;
        self
    }

    pub fn method(&self) -> EstimationMethod {
        self.estimator.method()
    }

    /// Identity columns for a site-year, whether or not the site is known
    pub fn identity(&self, site: &str, year: i32) -> SiteIdentity {
        match self.catalog.metadata(site) {
            Some(metadata) => SiteIdentity::from_metadata(metadata, year),
            None => SiteIdentity::unknown(site, year),
        }
    }

    /// Bad row for a file, usable even when the file name does not parse
    pub fn bad_row_for_path(&self, path: &Path, reason: impl Into<String>) -> FitResult {
        let identity = match parse_site_year(path) {
            Ok(key) => self.identity(&key.site, key.year),
            Err(_) => SiteIdentity::unknown(&path.display().to_string(), 0),
        };
        FitResult::bad(identity, reason)
    }

    pub fn process_file(&self, path: &Path) -> FitResult {
        let key = match parse_site_year(path) {
            Ok(key) => key,
            Err(e) => return self.bad_row_for_path(path, format!("{}: {}", Stage::Loaded, e)),
        };

        let span = info_span!("site_year", site = %key.site, year = key.year);
        let _enter = span.enter();

        match self.reader.read_site_year(path) {
            Ok(series) => self.process_series(series),
            Err(e) => {
                let rejection = Rejection::at(Stage::Loaded, e);
                debug!("Bad row: {}", rejection);
                self.bad_row(&key, &rejection)
            }
        }
    }

    pub fn process_series(&self, mut series: SiteYearSeries) -> FitResult {
        let key = SiteYearKey {
            site: series.site.clone(),
            year: series.year,
        };
        match self.run(&mut series) {
            Ok(row) => {
                debug!(g1 = row.g1, r2 = row.r2, n = row.n, "Fit recorded");
                row
            }
            Err(rejection) => {
                debug!("Bad row: {}", rejection);
                self.bad_row(&key, &rejection)
            }
        }
    }

    fn bad_row(&self, key: &SiteYearKey, rejection: &Rejection) -> FitResult {
        FitResult::bad(self.identity(&key.site, key.year), rejection.to_string())
    }

    fn run(&self, series: &mut SiteYearSeries) -> Result<FitResult, Rejection> {
        let info = self
            .catalog
            .lookup(&series.site)
            .map_err(|e| Rejection::at(Stage::Loaded, e))?;
        let site = &info.metadata;
        if !site.has_fittable_pft() {
            return Err(Rejection::at(
                Stage::Loaded,
                format!("PFT '{}' is not fitted", site.pft),
            ));
        }
        if site.latitude.is_none() {
            return Err(Rejection::at(Stage::Loaded, "unknown latitude"));
        }

        let dropped = series.normalize_trailing_timestamp();
        if dropped > 0 {
            debug!(dropped, "Dropped slots outside the file's year");
        }
        if !series.has_gpp() {
            return Err(Rejection::at(Stage::Loaded, "no GPP data"));
        }

        let months = most_productive_months(&series.records).ok_or_else(|| {
            Rejection::at(Stage::MonthSelected, "three most productive months undefined")
        })?;
        let productive = in_months(&series.records, &months);
        let ebr = energy_balance_ratio(&productive);
        let summer_precip = summer_precipitation(&productive);
        debug!(?months, ebr, summer_precip, "Productive months selected");

        let requirements = self.estimator.requirements(&productive, &site.elevation);
        let slots: Vec<&HalfHourRecord> = productive
            .iter()
            .copied()
            .filter(|s| passes_daylight_qc(s, &self.filter, &requirements))
            .collect();

        let global_co2 = self
            .co2
            .mean_for(series.year)
            .map_err(|e| Rejection::at(Stage::MonthSelected, e))?;
        let force_global = self
            .filter
            .bad_co2_site_years
            .contains(&SiteYear::new(&series.site, series.year));
        let co2 = fill_co2(&slots, global_co2, force_global);

        let rain = RainWindow::from_records(&series.records, self.filter.rain_window_hours);
        let (dry_slots, dry_co2): (Vec<&HalfHourRecord>, Vec<f64>) = slots
            .iter()
            .zip(&co2.values)
            .filter(|(s, _)| !rain.excludes(s.timestamp))
            .map(|(s, c)| (*s, *c))
            .unzip();
        debug!(
            daylight = slots.len(),
            after_rain = dry_slots.len(),
            rain_events = rain.event_count(),
            "Slots screened"
        );

        let estimate = self
            .estimator
            .estimate(&dry_slots, &site.elevation, &requirements)
            .map_err(|e| Rejection::at(Stage::ConductanceDerived, e))?;

        let candidates: Vec<Sample> = dry_slots
            .iter()
            .zip(dry_co2)
            .zip(&estimate.gs)
            .filter(|(_, gs)| gs.is_finite() && **gs > 0.0)
            .map(|((slot, co2), gs)| Sample {
                slot: *slot,
                co2,
                gs: *gs,
            })
            .collect();

        let gs_values: Vec<f64> = candidates.iter().map(|s| s.gs).collect();
        let keep = extreme_value_mask(&gs_values, self.filter.extreme_sd_multiplier);
        let samples: Vec<Sample> = candidates
            .into_iter()
            .zip(keep)
            .filter_map(|(s, k)| k.then_some(s))
            .collect();

        if samples.len() < self.filter.min_samples {
            return Err(Rejection::at(
                Stage::QcFiltered,
                format!(
                    "{} samples after filtering, need {}",
                    samples.len(),
                    self.filter.min_samples
                ),
            ));
        }

        let mut drivers = Vec::with_capacity(samples.len());
        for s in &samples {
            let (Some(vpd), Some(gpp)) = (s.slot.vpd, s.slot.gpp) else {
                return Err(Rejection::at(Stage::QcFiltered, "sample without VPD or GPP"));
            };
            drivers.push(Drivers {
                vpd: vpd * HPA_TO_KPA,
                gpp,
                co2: s.co2,
            });
        }
        let observed: Vec<f64> = samples.iter().map(|s| s.gs).collect();

        let fit = self
            .model
            .fit(&drivers, &observed)
            .map_err(|e| Rejection::at(Stage::Fitted, e))?;

        let gpp: Vec<f64> = drivers.iter().map(|d| d.gpp).collect();
        let et: Vec<f64> = samples
            .iter()
            .map(|s| s.slot.le.map_or(f64::NAN, latent_heat_to_et))
            .collect();

        let mut identity = SiteIdentity::from_metadata(site, series.year);
        if site.is_tropical_forest(self.filter.tropics_latitude) {
            identity.pft = PFT_TROPICAL_RAINFOREST.to_string();
        }

        let stats = FitStatistics {
            g0: fit.g0,
            g1: fit.g1,
            g1_se: fit.g1_se,
            n: fit.n,
            r2: fit.r2,
            rmse: fit.rmse,
            site_co2: co2.site_mean.unwrap_or(BAD_VALUE),
            global_co2,
            summer_precip,
            summer_gpp_mean: mean(&gpp).unwrap_or(BAD_VALUE),
            summer_gpp_sd: std_population(&gpp).unwrap_or(BAD_VALUE),
            et_mean: mean(&et).map_or(BAD_VALUE, |v| v * MOL_TO_MMOL),
            et_sd: std_population(&et).map_or(BAD_VALUE, |v| v * MOL_TO_MMOL),
            ebr,
            lai: info.lai.lai,
            lai_min: info.lai.lai_min,
            lai_max: info.lai.lai_max,
            most_productive_months: months,
            omega: estimate.omega,
            gs_method: estimate.method.to_string(),
        };

        Ok(FitResult::good(identity, stats))
    }
}
