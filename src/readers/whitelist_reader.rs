use crate::config::SiteYear;
use crate::error::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawWhitelistRow {
    site: String,
    yr: i32,
}

/// Site-years released under a free or fair-use data policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Whitelist {
    entries: HashSet<SiteYear>,
}

impl Whitelist {
    pub fn from_entries(entries: impl IntoIterator<Item = SiteYear>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Read a `site,yr` table
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut entries = HashSet::new();
        for row in reader.deserialize::<RawWhitelistRow>() {
            let row = row?;
            entries.insert(SiteYear {
                site: row.site,
                year: row.yr,
            });
        }
        Ok(Self { entries })
    }

    pub fn allows(&self, site: &str, year: i32) -> bool {
        self.entries.contains(&SiteYear::new(site, year))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_whitelist() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "site,yr")?;
        writeln!(file, "AT-Neu,2003")?;
        writeln!(file, "US-Ha1, 1999")?;

        let whitelist = Whitelist::read(file.path())?;
        assert_eq!(whitelist.len(), 2);
        assert!(whitelist.allows("US-Ha1", 1999));
        assert!(!whitelist.allows("AT-Neu", 2004));
        Ok(())
    }
}
