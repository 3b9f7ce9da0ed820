use crate::error::{ProcessingError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawCo2Row {
    year: i32,
    mean: f64,
}

/// Annual global mean CO2 (umol mol-1), keyed by year
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalCo2Table {
    by_year: BTreeMap<i32, f64>,
}

impl GlobalCo2Table {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i32, f64)>) -> Self {
        Self {
            by_year: pairs.into_iter().collect(),
        }
    }

    /// Read a `year,mean[,unc]` table; `#` lines are comments
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .flexible(true)
            .from_path(path)?;

        let mut by_year = BTreeMap::new();
        for row in reader.deserialize::<RawCo2Row>() {
            let row = row?;
            by_year.insert(row.year, row.mean);
        }

        if by_year.is_empty() {
            return Err(ProcessingError::MissingData(format!(
                "No CO2 records in {}",
                path.display()
            )));
        }
        Ok(Self { by_year })
    }

    pub fn mean_for(&self, year: i32) -> Result<f64> {
        self.by_year
            .get(&year)
            .copied()
            .ok_or(ProcessingError::GlobalCo2NotFound { year })
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.by_year.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_table_with_comments() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "# NOAA global annual means")?;
        writeln!(file, "year,mean,unc")?;
        writeln!(file, "2003,374.63,0.10")?;
        writeln!(file, "2004,376.39,0.10")?;

        let table = GlobalCo2Table::read(file.path())?;
        assert_eq!(table.mean_for(2004)?, 376.39);
        assert_eq!(table.years().collect::<Vec<_>>(), vec![2003, 2004]);
        assert!(matches!(
            table.mean_for(1990),
            Err(ProcessingError::GlobalCo2NotFound { year: 1990 })
        ));
        Ok(())
    }
}
