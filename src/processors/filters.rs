//! Slot-level filters applied to a site-year before conductance estimation
//! and fitting.

use crate::config::FilterConfig;
use crate::models::HalfHourRecord;
use crate::utils::constants::{BAD_VALUE, HPA_TO_KPA, WM2_TO_MOL_H2O_M2_S};
use crate::utils::stats::{mean, std_sample};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use std::collections::BTreeMap;

/// Latent heat flux (W m-2) as evapotranspiration (mol H2O m-2 s-1)
pub fn latent_heat_to_et(le: f64) -> f64 {
    le * WM2_TO_MOL_H2O_M2_S
}

/// The three calendar months with the highest mean GPP, highest first.
/// Missing GPP is ignored; `None` when fewer than three months have GPP or
/// the third and fourth months tie exactly.
pub fn most_productive_months(records: &[HalfHourRecord]) -> Option<[u32; 3]> {
    let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for record in records {
        if let Some(gpp) = record.gpp {
            let entry = sums.entry(record.timestamp.month()).or_insert((0.0, 0));
            entry.0 += gpp;
            entry.1 += 1;
        }
    }

    let mut monthly: Vec<(u32, f64)> = sums
        .into_iter()
        .map(|(month, (sum, n))| (month, sum / n as f64))
        .filter(|(_, m)| m.is_finite())
        .collect();
    if monthly.len() < 3 {
        return None;
    }
    monthly.sort_by(|a, b| b.1.total_cmp(&a.1));

    if monthly.len() > 3 && monthly[2].1 == monthly[3].1 {
        return None;
    }
    Some([monthly[0].0, monthly[1].0, monthly[2].0])
}

pub fn in_months<'a>(records: &'a [HalfHourRecord], months: &[u32; 3]) -> Vec<&'a HalfHourRecord> {
    records
        .iter()
        .filter(|r| months.contains(&r.timestamp.month()))
        .collect()
}

/// Σ(LE + H) / Σ(Rn − G) over slots with all four fluxes QC'd
pub fn energy_balance_ratio(slots: &[&HalfHourRecord]) -> f64 {
    let (mut top, mut bottom) = (0.0, 0.0);
    for slot in slots.iter().filter(|s| s.qc.energy_balance_ok()) {
        if let (Some(le), Some(h), Some(rn), Some(g)) = (slot.le, slot.h, slot.rnet, slot.ground_heat)
        {
            top += le + h;
            bottom += rn - g;
        }
    }
    if bottom > 0.0 {
        top / bottom
    } else {
        BAD_VALUE
    }
}

pub fn summer_precipitation(slots: &[&HalfHourRecord]) -> f64 {
    slots
        .iter()
        .filter_map(|s| s.precip)
        .filter(|p| *p >= 0.0)
        .sum()
}

/// Extra QC flags a conductance estimator depends on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotRequirements {
    pub wind: bool,
    pub rnet: bool,
    pub tair: bool,
    pub ground_heat: bool,
}

/// Daylight hours, QC flags and minimum ET / VPD / GPP
pub fn passes_daylight_qc(
    record: &HalfHourRecord,
    filter: &FilterConfig,
    requirements: &SlotRequirements,
) -> bool {
    let hour = record.timestamp.hour();
    if hour < filter.daylight_start_hour || hour > filter.daylight_end_hour {
        return false;
    }

    let qc = &record.qc;
    if !(qc.le && qc.vpd && qc.gpp && qc.precip) {
        return false;
    }
    if (requirements.wind && !qc.wind)
        || (requirements.rnet && !qc.rnet)
        || (requirements.tair && !qc.tair)
        || (requirements.ground_heat && !qc.ground_heat)
    {
        return false;
    }

    let (Some(le), Some(vpd), Some(gpp)) = (record.le, record.vpd, record.gpp) else {
        return false;
    };
    latent_heat_to_et(le) > filter.min_et && vpd * HPA_TO_KPA > filter.min_vpd && gpp > 0.0
}

/// CO2 per slot after gap filling
#[derive(Debug, Clone, PartialEq)]
pub struct Co2Fill {
    pub values: Vec<f64>,
    /// Mean of the valid tower CO2, `None` when the site had none
    pub site_mean: Option<f64>,
}

/// Missing or non-positive CO2 takes the site-year mean, or the global
/// mean when the site has no valid CO2. `force_global` overrides every slot.
pub fn fill_co2(slots: &[&HalfHourRecord], global_mean: f64, force_global: bool) -> Co2Fill {
    let valid: Vec<f64> = slots
        .iter()
        .filter_map(|s| s.co2)
        .filter(|c| *c > 0.0)
        .collect();
    let site_mean = mean(&valid);
    let replacement = site_mean.unwrap_or(global_mean);

    let values = slots
        .iter()
        .map(|s| {
            if force_global {
                global_mean
            } else {
                s.co2.filter(|c| *c > 0.0).unwrap_or(replacement)
            }
        })
        .collect();

    Co2Fill { values, site_mean }
}

/// Windows following each precipitation event; a slot at `t` is excluded
/// when some event `e` satisfies `e <= t <= e + window`.
#[derive(Debug, Clone)]
pub struct RainWindow {
    events: Vec<NaiveDateTime>,
    window: Duration,
}

impl RainWindow {
    pub fn from_records(records: &[HalfHourRecord], window_hours: i64) -> Self {
        let mut events: Vec<NaiveDateTime> = records
            .iter()
            .filter(|r| r.precip.map_or(false, |p| p > 0.0))
            .map(|r| r.timestamp)
            .collect();
        events.sort();
        Self {
            events,
            window: Duration::hours(window_hours),
        }
    }

    pub fn excludes(&self, timestamp: NaiveDateTime) -> bool {
        let idx = self.events.partition_point(|e| *e <= timestamp);
        idx > 0 && timestamp - self.events[idx - 1] <= self.window
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Keep-mask for conductance values below mean + k·SD (sample SD)
pub fn extreme_value_mask(values: &[f64], sd_multiplier: f64) -> Vec<bool> {
    let (Some(mu), Some(sd)) = (mean(values), std_sample(values)) else {
        return vec![true; values.len()];
    };
    let threshold = mu + sd_multiplier * sd;
    values.iter().map(|v| *v < threshold).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QcFlags;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2003, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn slot(ts: NaiveDateTime) -> HalfHourRecord {
        let mut r = HalfHourRecord::empty(ts);
        r.vpd = Some(15.0);
        r.gpp = Some(10.0);
        r.le = Some(200.0);
        r.co2 = Some(380.0);
        r.precip = Some(0.0);
        r.qc = QcFlags::all_ok();
        r
    }

    #[test]
    fn test_most_productive_months() {
        let mut records = Vec::new();
        for (month, gpp) in [(1, 1.0), (5, 8.0), (6, 12.0), (7, 10.0), (8, 2.0)] {
            let mut r = slot(at(month, 10, 12, 0));
            r.gpp = Some(gpp);
            records.push(r);
            let mut missing = slot(at(month, 11, 12, 0));
            missing.gpp = None;
            records.push(missing);
        }
        assert_eq!(most_productive_months(&records), Some([6, 7, 5]));
    }

    #[test]
    fn test_productive_months_need_three_months_without_ties() {
        let two: Vec<_> = [1, 2].iter().map(|m| slot(at(*m, 1, 12, 0))).collect();
        assert_eq!(most_productive_months(&two), None);

        // months 2, 3 and 4 all have GPP 10; 3rd and 4th tie
        let mut tied: Vec<_> = [2, 3, 4].iter().map(|m| slot(at(*m, 1, 12, 0))).collect();
        let mut top = slot(at(1, 1, 12, 0));
        top.gpp = Some(20.0);
        tied.push(top);
        assert_eq!(most_productive_months(&tied), None);
    }

    #[test]
    fn test_daylight_qc() {
        let filter = FilterConfig::default();
        let req = SlotRequirements::default();

        assert!(passes_daylight_qc(&slot(at(6, 1, 9, 0)), &filter, &req));
        assert!(passes_daylight_qc(&slot(at(6, 1, 15, 30)), &filter, &req));
        assert!(!passes_daylight_qc(&slot(at(6, 1, 8, 30)), &filter, &req));
        assert!(!passes_daylight_qc(&slot(at(6, 1, 16, 0)), &filter, &req));

        let mut low_vpd = slot(at(6, 1, 12, 0));
        low_vpd.vpd = Some(0.4); // 0.04 kPa
        assert!(!passes_daylight_qc(&low_vpd, &filter, &req));

        let mut no_gpp = slot(at(6, 1, 12, 0));
        no_gpp.gpp = Some(0.0);
        assert!(!passes_daylight_qc(&no_gpp, &filter, &req));

        let mut bad_wind = slot(at(6, 1, 12, 0));
        bad_wind.qc.wind = false;
        assert!(passes_daylight_qc(&bad_wind, &filter, &req));
        let pm = SlotRequirements {
            wind: true,
            rnet: true,
            tair: true,
            ground_heat: false,
        };
        assert!(!passes_daylight_qc(&bad_wind, &filter, &pm));
    }

    #[test]
    fn test_energy_balance_ratio() {
        let mut a = slot(at(6, 1, 12, 0));
        (a.le, a.h, a.rnet, a.ground_heat) = (Some(100.0), Some(50.0), Some(200.0), Some(20.0));
        let mut b = a.clone();
        b.qc.ground_heat = false;
        b.le = Some(1000.0);

        let ebr = energy_balance_ratio(&[&a, &b]);
        assert!((ebr - 150.0 / 180.0).abs() < 1e-12);

        a.rnet = Some(10.0);
        assert_eq!(energy_balance_ratio(&[&a]), BAD_VALUE);
    }

    #[test]
    fn test_summer_precipitation_ignores_negative() {
        let mut a = slot(at(6, 1, 12, 0));
        a.precip = Some(2.5);
        let mut b = slot(at(6, 1, 12, 30));
        b.precip = Some(-1.0);
        let mut c = slot(at(6, 1, 13, 0));
        c.precip = None;
        assert_eq!(summer_precipitation(&[&a, &b, &c]), 2.5);
    }

    #[test]
    fn test_fill_co2() {
        let mut a = slot(at(6, 1, 12, 0));
        a.co2 = Some(370.0);
        let mut b = slot(at(6, 1, 12, 30));
        b.co2 = Some(390.0);
        let mut c = slot(at(6, 1, 13, 0));
        c.co2 = Some(-5.0);
        let mut d = slot(at(6, 1, 13, 30));
        d.co2 = None;

        let filled = fill_co2(&[&a, &b, &c, &d], 375.0, false);
        assert_eq!(filled.site_mean, Some(380.0));
        assert_eq!(filled.values, vec![370.0, 390.0, 380.0, 380.0]);

        let no_site = fill_co2(&[&c, &d], 375.0, false);
        assert_eq!(no_site.site_mean, None);
        assert_eq!(no_site.values, vec![375.0, 375.0]);

        let forced = fill_co2(&[&a, &b], 375.0, true);
        assert_eq!(forced.site_mean, Some(380.0));
        assert_eq!(forced.values, vec![375.0, 375.0]);
    }

    #[test]
    fn test_rain_window_boundaries() {
        let event = at(6, 10, 12, 0);
        let mut records: Vec<HalfHourRecord> = (0..120)
            .map(|i| slot(event - Duration::hours(12) + Duration::minutes(30 * i)))
            .collect();
        for r in records.iter_mut() {
            if r.timestamp == event {
                r.precip = Some(1.2);
            }
        }

        let window = RainWindow::from_records(&records, 24);
        assert_eq!(window.event_count(), 1);
        assert!(!window.excludes(event - Duration::minutes(30)));
        assert!(window.excludes(event));
        assert!(window.excludes(event + Duration::hours(12)));
        assert!(window.excludes(event + Duration::hours(24)));
        assert!(!window.excludes(event + Duration::hours(24) + Duration::minutes(30)));

        let excluded = records.iter().filter(|r| window.excludes(r.timestamp)).count();
        assert_eq!(excluded, 49);
    }

    #[test]
    fn test_extreme_value_mask_drops_planted_outlier() {
        let mut values: Vec<f64> = (0..99)
            .map(|i| 0.10 + if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect();
        let base_mean = mean(&values).unwrap();
        let base_sd = std_sample(&values).unwrap();
        values.push(base_mean + 10.0 * base_sd);

        let keep = extreme_value_mask(&values, 3.0);
        assert!(!keep[99]);
        assert!(keep[..99].iter().all(|k| *k));
    }

    #[test]
    fn test_extreme_value_mask_single_value() {
        assert_eq!(extreme_value_mask(&[0.2], 3.0), vec![true]);
    }
}
