use crate::config::{ScreeningConfig, SiteYear};
use crate::models::{FitResult, ScreenedFitRow};
use crate::readers::{LandCoverGrid, Whitelist};
use crate::utils::constants::BAD_VALUE;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Rows removed or changed by each screening stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScreeningReport {
    pub input_rows: usize,
    pub known_bad: usize,
    pub disturbed: usize,
    pub low_r2: usize,
    pub interannual_outliers: usize,
    pub relabelled_c4: usize,
    pub renamed_pft: usize,
    pub not_whitelisted: usize,
    pub output_rows: usize,
}

#[derive(Debug, Clone)]
pub struct ScreeningOutcome {
    pub rows: Vec<ScreenedFitRow>,
    pub report: ScreeningReport,
}

/// Post-hoc filters over the merged fit table, applied in a fixed order.
pub struct ResultScreener {
    config: ScreeningConfig,
    land_cover: Option<LandCoverGrid>,
    whitelist: Option<Whitelist>,
}

impl ResultScreener {
    pub fn new(config: ScreeningConfig) -> Self {
        Self {
            config,
            land_cover: None,
            whitelist: None,
        }
    }

    pub fn with_land_cover(mut self, grid: LandCoverGrid) -> Self {
        self.land_cover = Some(grid);
        self
    }

    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = Some(whitelist);
        self
    }

    pub fn screen(&self, rows: Vec<FitResult>) -> ScreeningOutcome {
        let mut report = ScreeningReport {
            input_rows: rows.len(),
            ..Default::default()
        };

        let bad: HashSet<&SiteYear> = self.config.bad_site_years.iter().collect();
        let disturbed: HashSet<&str> = self
            .config
            .disturbed_sites
            .iter()
            .map(|s| s.as_str())
            .collect();

        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if bad.contains(&SiteYear::new(&row.site, row.year)) {
                report.known_bad += 1;
            } else if disturbed.contains(row.site.as_str()) {
                report.disturbed += 1;
            } else if !(row.r2 >= self.config.min_r2) {
                report.low_r2 += 1;
            } else {
                kept.push(row);
            }
        }

        let anomalies = self.interannual_anomalies(&kept);
        let mut screened: Vec<(FitResult, f64)> = Vec::with_capacity(kept.len());
        for (row, anomaly) in kept.into_iter().zip(anomalies) {
            if anomaly != BAD_VALUE && anomaly > self.config.max_interannual_anomaly_pct {
                report.interannual_outliers += 1;
            } else {
                screened.push((row, anomaly));
            }
        }

        let c4_crops: HashSet<&SiteYear> = self.config.c4_crop_site_years.iter().collect();
        for (row, _) in screened.iter_mut() {
            if c4_crops.contains(&SiteYear::new(&row.site, row.year)) {
                row.pft = self.config.c4_crop_pft.clone();
                report.relabelled_c4 += 1;
            }
            if let Some(rename) = self.config.pft_renames.iter().find(|r| r.from == row.pft) {
                row.pft = rename.to.clone();
                report.renamed_pft += 1;
            }
        }

        screened.sort_by(|a, b| a.0.site.cmp(&b.0.site).then(a.0.year.cmp(&b.0.year)));

        let mut out = Vec::with_capacity(screened.len());
        for (row, anomaly) in screened {
            if let Some(whitelist) = &self.whitelist {
                if !whitelist.allows(&row.site, row.year) {
                    report.not_whitelisted += 1;
                    continue;
                }
            }
            let c4_frac = self.c4_fraction(&row);
            out.push(ScreenedFitRow::from_fit(row, anomaly, c4_frac));
        }
        report.output_rows = out.len();

        info!(
            input = report.input_rows,
            output = report.output_rows,
            "Screening complete"
        );
        debug!(?report, "Screening report");

        ScreeningOutcome { rows: out, report }
    }

    /// |g1 - site mean| / site mean in percent; sentinel for single-year sites
    fn interannual_anomalies(&self, rows: &[FitResult]) -> Vec<f64> {
        let mut by_site: HashMap<&str, (f64, usize)> = HashMap::new();
        for row in rows {
            let entry = by_site.entry(row.site.as_str()).or_insert((0.0, 0));
            entry.0 += row.g1;
            entry.1 += 1;
        }

        rows.iter()
            .map(|row| match by_site.get(row.site.as_str()) {
                Some((sum, n)) if *n > 1 => {
                    let site_mean = sum / *n as f64;
                    (row.g1 - site_mean).abs() / site_mean * 100.0
                }
                _ => BAD_VALUE,
            })
            .collect()
    }

    fn c4_fraction(&self, row: &FitResult) -> f64 {
        if row.latitude == BAD_VALUE || row.longitude == BAD_VALUE {
            return BAD_VALUE;
        }
        self.land_cover
            .as_ref()
            .and_then(|grid| grid.lookup(row.latitude, row.longitude))
            .unwrap_or(BAD_VALUE)
    }
}
