use crate::error::{ProcessingError, Result};
use crate::models::{HalfHourRecord, QcFlags, SiteYearSeries};
use crate::utils::constants::MISSING_THRESHOLD;
use crate::utils::filename::parse_site_year;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Column layout of a gap-filled half-hourly flux file. Any value column
/// may be absent from a given file; absent columns read as missing.
#[derive(Debug, Deserialize)]
struct RawFluxRow {
    #[serde(rename = "Year")]
    year: f64,
    #[serde(rename = "DoY")]
    doy: f64,
    #[serde(rename = "Time")]
    time: f64,
    #[serde(rename = "VPD_f", default)]
    vpd: Option<f64>,
    #[serde(rename = "GPP_f", default)]
    gpp: Option<f64>,
    #[serde(rename = "CO2", default)]
    co2: Option<f64>,
    #[serde(rename = "LE_f", default)]
    le: Option<f64>,
    #[serde(rename = "H_f", default)]
    h: Option<f64>,
    #[serde(rename = "Rn_f", default)]
    rnet: Option<f64>,
    #[serde(rename = "G_f", default)]
    ground_heat: Option<f64>,
    #[serde(rename = "Precip_f", default)]
    precip: Option<f64>,
    #[serde(rename = "WS_f", default)]
    wind: Option<f64>,
    #[serde(rename = "ustar", default)]
    ustar: Option<f64>,
    #[serde(rename = "Ta_f", default)]
    tair: Option<f64>,
    #[serde(rename = "LE_fqcOK", default)]
    le_qc: Option<f64>,
    #[serde(rename = "H_fqcOK", default)]
    h_qc: Option<f64>,
    #[serde(rename = "Rn_fqcOK", default)]
    rnet_qc: Option<f64>,
    #[serde(rename = "G_fqcOK", default)]
    ground_heat_qc: Option<f64>,
    #[serde(rename = "VPD_fqcOK", default)]
    vpd_qc: Option<f64>,
    #[serde(rename = "NEE_GPP_qcOK", default)]
    gpp_qc: Option<f64>,
    #[serde(rename = "Precip_fqcOK", default)]
    precip_qc: Option<f64>,
    #[serde(rename = "WS_fqcOK", default)]
    wind_qc: Option<f64>,
    #[serde(rename = "Ta_fqcOK", default)]
    tair_qc: Option<f64>,
}

fn value(raw: Option<f64>) -> Option<f64> {
    raw.filter(|v| v.is_finite() && *v > MISSING_THRESHOLD)
}

fn flag(raw: Option<f64>) -> bool {
    raw == Some(1.0)
}

/// Year + day-of-year + decimal hour. Day numbers past the end of the year
/// roll into the next one rather than failing, so the trailing slot that
/// flux files carry survives until normalization drops it.
fn slot_timestamp(year: f64, doy: f64, time: f64) -> Result<NaiveDateTime> {
    let start = NaiveDate::from_yo_opt(year as i32, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ProcessingError::InvalidFormat(format!("Invalid year: {}", year)))?;

    if !(1.0..=367.0).contains(&doy) || !(0.0..=24.0).contains(&time) {
        return Err(ProcessingError::InvalidFormat(format!(
            "Invalid day/time: DoY={} Time={}",
            doy, time
        )));
    }

    let minutes = (time * 60.0).round() as i64;
    Ok(start + Duration::days(doy as i64 - 1) + Duration::minutes(minutes))
}

impl RawFluxRow {
    fn into_record(self) -> Result<HalfHourRecord> {
        let timestamp = slot_timestamp(self.year, self.doy, self.time)?;

        Ok(HalfHourRecord {
            timestamp,
            vpd: value(self.vpd),
            gpp: value(self.gpp),
            co2: value(self.co2),
            le: value(self.le),
            h: value(self.h),
            rnet: value(self.rnet),
            ground_heat: value(self.ground_heat),
            precip: value(self.precip),
            wind: value(self.wind),
            ustar: value(self.ustar),
            tair: value(self.tair),
            qc: QcFlags {
                le: flag(self.le_qc),
                h: flag(self.h_qc),
                rnet: flag(self.rnet_qc),
                ground_heat: flag(self.ground_heat_qc),
                vpd: flag(self.vpd_qc),
                gpp: flag(self.gpp_qc),
                precip: flag(self.precip_qc),
                wind: flag(self.wind_qc),
                tair: flag(self.tair_qc),
            },
        })
    }
}

pub struct FluxReader {
    extension: String,
}

impl FluxReader {
    pub fn new() -> Self {
        Self {
            extension: "csv".to_string(),
        }
    }

    /// List the site-year files in a directory, sorted by name
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case(&self.extension));
            if path.is_file() && matches {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read one site-year file. Site and year come from the file name.
    pub fn read_site_year(&self, path: &Path) -> Result<SiteYearSeries> {
        let key = parse_site_year(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut records = Vec::new();
        for row in reader.deserialize::<RawFluxRow>() {
            records.push(row?.into_record()?);
        }

        Ok(SiteYearSeries::new(key.site, key.year, records))
    }
}

impl Default for FluxReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_slot_timestamp() {
        let ts = slot_timestamp(2003.0, 32.0, 13.5).unwrap();
        assert_eq!((ts.month(), ts.day(), ts.hour(), ts.minute()), (2, 1, 13, 30));

        // DoY 366 in a non-leap year is the next year's first slot
        let ts = slot_timestamp(2003.0, 366.0, 0.0).unwrap();
        assert_eq!((ts.year(), ts.ordinal()), (2004, 1));

        let ts = slot_timestamp(2004.0, 367.0, 0.0).unwrap();
        assert_eq!((ts.year(), ts.ordinal()), (2005, 1));

        assert!(slot_timestamp(2003.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_read_site_year() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("AT-Neu.2003.synth.csv");
        let mut file = fs::File::create(&path)?;
        writeln!(file, "Year,DoY,Time,VPD_f,GPP_f,LE_f,LE_fqcOK,VPD_fqcOK")?;
        writeln!(file, "2003,1,0.0,5.0,-9999,20.0,1,1")?;
        writeln!(file, "2003,1,0.5,6.0,2.5,,0,1")?;

        let series = FluxReader::new().read_site_year(&path)?;
        assert_eq!(series.site, "AT-Neu");
        assert_eq!(series.year, 2003);
        assert_eq!(series.records.len(), 2);

        let first = &series.records[0];
        assert_eq!(first.vpd, Some(5.0));
        assert_eq!(first.gpp, None);
        assert_eq!(first.co2, None);
        assert!(first.qc.le && first.qc.vpd);
        assert!(!first.qc.gpp);

        let second = &series.records[1];
        assert_eq!(second.timestamp.minute(), 30);
        assert_eq!(second.le, None);
        assert!(!second.qc.le);
        Ok(())
    }

    #[test]
    fn test_discover_lists_csv_files_sorted() -> Result<()> {
        let dir = TempDir::new()?;
        for name in ["US-Ha1.1999.csv", "AT-Neu.2003.csv", "notes.txt"] {
            fs::File::create(dir.path().join(name))?;
        }

        let files = FluxReader::new().discover(dir.path())?;
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|f| f.to_str()))
            .collect();
        assert_eq!(names, vec!["AT-Neu.2003.csv", "US-Ha1.1999.csv"]);
        Ok(())
    }
}
