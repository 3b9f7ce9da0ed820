use crate::error::Result;
use crate::models::{FitResult, ScreenedFitRow};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Comma-separated fit tables with a header row named after the columns.
#[derive(Debug, Clone, Default)]
pub struct CsvWriter;

impl CsvWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write_fits(&self, rows: &[FitResult], path: &Path) -> Result<()> {
        self.write_rows(rows, path)
    }

    pub fn write_screened(&self, rows: &[ScreenedFitRow], path: &Path) -> Result<()> {
        self.write_rows(rows, path)
    }

    pub fn read_fits(&self, path: &Path) -> Result<Vec<FitResult>> {
        self.read_rows(path)
    }

    pub fn read_screened(&self, path: &Path) -> Result<Vec<ScreenedFitRow>> {
        self.read_rows(path)
    }

    fn write_rows<T: Serialize>(&self, rows: &[T], path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        debug!(path = %path.display(), rows = rows.len(), "Wrote CSV table");
        Ok(())
    }

    fn read_rows<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteIdentity;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_fit_table_header_and_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("g1_fluxnet.csv");

        let mut good = FitResult::bad(SiteIdentity::unknown("AT-Neu", 2003), "");
        good.success = true;
        good.g1 = 3.25;
        let rows = vec![good, FitResult::bad(SiteIdentity::unknown("XX-Bad", 2004), "no GPP")];

        let writer = CsvWriter::new();
        writer.write_fits(&rows, &path)?;

        let text = std::fs::read_to_string(&path)?;
        let header = text.lines().next().unwrap_or_default();
        assert!(header.starts_with("site,name,country,year,latitude,longitude,PFT"));
        assert!(header.contains("summer_mu_GPP_umol_m2_s"));
        assert!(text.contains("-999.9"));

        assert_eq!(writer.read_fits(&path)?, rows);
        Ok(())
    }

    #[test]
    fn test_screened_table_columns() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("g1_fluxnet_screened.csv");

        let mut fit = FitResult::bad(SiteIdentity::unknown("AT-Neu", 2003), "");
        fit.success = true;
        let row = ScreenedFitRow::from_fit(fit, 12.5, 0.0);

        let writer = CsvWriter::new();
        writer.write_screened(&[row.clone()], &path)?;

        let text = std::fs::read_to_string(&path)?;
        let header = text.lines().next().unwrap_or_default();
        assert!(header.starts_with("Scale,site"));
        assert!(header.contains("g1_interannual_anomaly (%)"));
        assert!(!header.contains("success"));
        assert_eq!(writer.read_screened(&path)?, vec![row]);
        Ok(())
    }
}
