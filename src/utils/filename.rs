use crate::error::{ProcessingError, Result};
use chrono::{Datelike, Local};
use std::path::{Path, PathBuf};

/// Site id and year encoded in a flux file name, e.g. `AT-Neu.2003.synth.csv`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteYearKey {
    pub site: String,
    pub year: i32,
}

/// Extract the site id and year from a flux file path
pub fn parse_site_year(path: &Path) -> Result<SiteYearKey> {
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| ProcessingError::InvalidFormat("Invalid file path".to_string()))?;

    let mut parts = filename.split('.');
    let site = parts.next().filter(|s| !s.is_empty());
    let year = parts.next().and_then(|y| y.parse::<i32>().ok());

    match (site, year) {
        (Some(site), Some(year)) => Ok(SiteYearKey {
            site: site.to_string(),
            year,
        }),
        _ => Err(ProcessingError::InvalidFormat(format!(
            "Filename does not match <SITE>.<YEAR>.*.csv: {}",
            filename
        ))),
    }
}

/// Generate default fit table filename: output/g1_fluxnet[_PM]-{YYMMDD}.csv
pub fn generate_default_fit_filename(method_suffix: &str) -> PathBuf {
    let now = Local::now();
    let year = now.year() % 100; // Get last 2 digits of year

    let filename = format!(
        "g1_fluxnet{}-{:02}{:02}{:02}.csv",
        method_suffix,
        year,
        now.month(),
        now.day()
    );
    PathBuf::from("output").join(filename)
}
