use crate::utils::constants::{
    CLIMATE_GROUP_TROPICAL, MIN_VALID_ELEVATION, PFT_UNKNOWN, PFT_WETLAND, TROPICAL_TREE_PFTS,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Site elevation as recorded in the ancillary table. Some sites carry
/// placeholders ("TBD") or ranges ("450-570") instead of a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Elevation {
    Metres(f64),
    Unusable(String),
}

impl Elevation {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() && value > MIN_VALID_ELEVATION => {
                Elevation::Metres(value)
            }
            _ => Elevation::Unusable(trimmed.to_string()),
        }
    }

    pub fn metres(&self) -> Option<f64> {
        match self {
            Elevation::Metres(m) => Some(*m),
            Elevation::Unusable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SiteMetadata {
    #[validate(length(min = 1))]
    pub site_id: String,

    pub name: String,

    pub country: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,

    pub elevation: Elevation,

    /// IGBP plant functional type code
    pub pft: String,

    pub climate_class: String,

    pub climate_group: String,
}

impl SiteMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        site_id: String,
        name: String,
        country: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
        elevation: Elevation,
        pft: String,
        climate_class: String,
        climate_group: String,
    ) -> Self {
        Self {
            site_id,
            name,
            country,
            latitude,
            longitude,
            elevation,
            pft,
            climate_class,
            climate_group,
        }
    }

    /// Unknown and wetland PFTs are never fitted
    pub fn has_fittable_pft(&self) -> bool {
        self.pft != PFT_UNKNOWN && self.pft != PFT_WETLAND && !self.pft.is_empty()
    }

    /// Tree PFTs in the tropics, or in a site flagged as tropical climate
    pub fn is_tropical_forest(&self, tropics_latitude: f64) -> bool {
        if !TROPICAL_TREE_PFTS.contains(&self.pft.as_str()) {
            return false;
        }
        let in_band = self
            .latitude
            .map_or(false, |lat| (-tropics_latitude..=tropics_latitude).contains(&lat));
        in_band || self.climate_group == CLIMATE_GROUP_TROPICAL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaiRecord {
    #[serde(rename = "sitename")]
    pub site: String,
    #[serde(rename = "LAI")]
    pub lai: f64,
    #[serde(rename = "LAI_MIN")]
    pub lai_min: f64,
    #[serde(rename = "LAI_MAX")]
    pub lai_max: f64,
}

/// Everything the processor needs to know about one site
#[derive(Debug, Clone)]
pub struct SiteInfo {
    pub metadata: SiteMetadata,
    pub lai: LaiRecord,
}
