use crate::error::{ProcessingError, Result};
use crate::models::{Elevation, LaiRecord, SiteInfo, SiteMetadata};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;
use validator::Validate;

#[derive(Debug, Deserialize)]
struct RawSiteRow {
    #[serde(rename = "Site_ID")]
    site_id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Country", default)]
    country: String,
    #[serde(rename = "Latitude", default)]
    latitude: String,
    #[serde(rename = "Longitude", default)]
    longitude: String,
    #[serde(rename = "Elevation", default)]
    elevation: String,
    #[serde(rename = "IGBP_class", default)]
    pft: String,
    #[serde(rename = "Climate_class", default)]
    climate_class: String,
    #[serde(rename = "Climate_group", default)]
    climate_group: String,
}

/// Coordinates recorded as "TBD" (or anything non-numeric) are unknown
fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl From<RawSiteRow> for SiteMetadata {
    fn from(row: RawSiteRow) -> Self {
        SiteMetadata::new(
            row.site_id,
            row.name.replace(',', ""),
            row.country,
            parse_coordinate(&row.latitude),
            parse_coordinate(&row.longitude),
            Elevation::parse(&row.elevation),
            row.pft,
            row.climate_class,
            row.climate_group,
        )
    }
}

pub struct SiteReader;

impl SiteReader {
    pub fn new() -> Self {
        Self
    }

    /// Read the site ancillary table. Rows failing validation are skipped
    /// with a warning, so their site-years later fail the lookup.
    pub fn read_sites(&self, path: &Path) -> Result<Vec<SiteMetadata>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut sites = Vec::new();

        for row in reader.deserialize::<RawSiteRow>() {
            let site = SiteMetadata::from(row?);
            match site.validate() {
                Ok(()) => sites.push(site),
                Err(e) => warn!(site = %site.site_id, "Skipping invalid site row: {}", e),
            }
        }

        Ok(sites)
    }

    pub fn read_sites_map(&self, path: &Path) -> Result<HashMap<String, SiteMetadata>> {
        let sites = self.read_sites(path)?;
        let mut map = HashMap::with_capacity(sites.len());
        for site in sites {
            map.insert(site.site_id.clone(), site);
        }
        Ok(map)
    }

    /// Read the per-site leaf area index table
    pub fn read_lai_map(&self, path: &Path) -> Result<HashMap<String, LaiRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut map = HashMap::new();
        for row in reader.deserialize::<LaiRecord>() {
            let record = row?;
            map.insert(record.site.clone(), record);
        }
        Ok(map)
    }
}

impl Default for SiteReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Site metadata and LAI joined by site id
#[derive(Debug, Clone, Default)]
pub struct SiteCatalog {
    sites: HashMap<String, SiteMetadata>,
    lai: HashMap<String, LaiRecord>,
}

impl SiteCatalog {
    pub fn new(sites: HashMap<String, SiteMetadata>, lai: HashMap<String, LaiRecord>) -> Self {
        Self { sites, lai }
    }

    pub fn load(site_file: &Path, lai_file: &Path) -> Result<Self> {
        let reader = SiteReader::new();
        Ok(Self::new(
            reader.read_sites_map(site_file)?,
            reader.read_lai_map(lai_file)?,
        ))
    }

    pub fn metadata(&self, site: &str) -> Option<&SiteMetadata> {
        self.sites.get(site)
    }

    pub fn lookup(&self, site: &str) -> Result<SiteInfo> {
        let metadata = self
            .sites
            .get(site)
            .ok_or_else(|| ProcessingError::SiteNotFound {
                site: site.to_string(),
            })?;
        let lai = self
            .lai
            .get(site)
            .ok_or_else(|| ProcessingError::LaiNotFound {
                site: site.to_string(),
            })?;

        Ok(SiteInfo {
            metadata: metadata.clone(),
            lai: lai.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
