use crate::models::SiteMetadata;
use crate::utils::constants::{BAD_VALUE, SCALE_FLUXNET};
use serde::{Deserialize, Serialize};

/// Site identity columns, present on good and bad rows alike
#[derive(Debug, Clone, PartialEq)]
pub struct SiteIdentity {
    pub site: String,
    pub name: String,
    pub country: String,
    pub year: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub pft: String,
    pub climate_class: String,
}

impl SiteIdentity {
    pub fn from_metadata(metadata: &SiteMetadata, year: i32) -> Self {
        Self {
            site: metadata.site_id.clone(),
            name: metadata.name.replace(',', ""),
            country: metadata.country.clone(),
            year,
            latitude: metadata.latitude.unwrap_or(BAD_VALUE),
            longitude: metadata.longitude.unwrap_or(BAD_VALUE),
            pft: metadata.pft.clone(),
            climate_class: metadata.climate_class.clone(),
        }
    }

    /// Identity for a file whose site could not be looked up
    pub fn unknown(site: &str, year: i32) -> Self {
        Self {
            site: site.to_string(),
            name: String::new(),
            country: String::new(),
            year,
            latitude: BAD_VALUE,
            longitude: BAD_VALUE,
            pft: String::new(),
            climate_class: String::new(),
        }
    }
}

/// Everything a successful site-year fit produces
#[derive(Debug, Clone, PartialEq)]
pub struct FitStatistics {
    pub g0: f64,
    pub g1: f64,
    pub g1_se: f64,
    pub n: usize,
    pub r2: f64,
    pub rmse: f64,
    pub site_co2: f64,
    pub global_co2: f64,
    pub summer_precip: f64,
    pub summer_gpp_mean: f64,
    pub summer_gpp_sd: f64,
    pub et_mean: f64,
    pub et_sd: f64,
    pub ebr: f64,
    pub lai: f64,
    pub lai_min: f64,
    pub lai_max: f64,
    pub most_productive_months: [u32; 3],
    pub omega: f64,
    pub gs_method: String,
}

/// One row of the fit table. Built only through [`FitResult::good`] or
/// [`FitResult::bad`], so a row is either completely populated or carries
/// the sentinel in every numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub site: String,
    pub name: String,
    pub country: String,
    pub year: i32,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "PFT")]
    pub pft: String,
    pub climate_class: String,
    pub g0: f64,
    pub g1: f64,
    pub g1_se: f64,
    /// Sample size, sentinel on bad rows
    pub n: f64,
    pub r2: f64,
    pub rmse: f64,
    #[serde(rename = "CO2")]
    pub co2: f64,
    #[serde(rename = "global_CO2")]
    pub global_co2: f64,
    pub summer_precip: f64,
    #[serde(rename = "summer_mu_GPP_umol_m2_s")]
    pub summer_gpp_mean: f64,
    #[serde(rename = "summer_sd_GPP_umol_m2_s")]
    pub summer_gpp_sd: f64,
    #[serde(rename = "ET_mmol_m2_s")]
    pub et_mean: f64,
    #[serde(rename = "ET_sd_mmol_m2_s")]
    pub et_sd: f64,
    pub ebr: f64,
    pub lai: f64,
    pub lai_min: f64,
    pub lai_max: f64,
    pub most_prod_mths: String,
    pub omega: f64,
    pub gs_method: String,
    pub success: bool,
    pub failure_reason: String,
}

impl FitResult {
    pub fn good(identity: SiteIdentity, stats: FitStatistics) -> Self {
        let months = stats
            .most_productive_months
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            site: identity.site,
            name: identity.name,
            country: identity.country,
            year: identity.year,
            latitude: identity.latitude,
            longitude: identity.longitude,
            pft: identity.pft,
            climate_class: identity.climate_class,
            g0: stats.g0,
            g1: stats.g1,
            g1_se: stats.g1_se,
            n: stats.n as f64,
            r2: stats.r2,
            rmse: stats.rmse,
            co2: stats.site_co2,
            global_co2: stats.global_co2,
            summer_precip: stats.summer_precip,
            summer_gpp_mean: stats.summer_gpp_mean,
            summer_gpp_sd: stats.summer_gpp_sd,
            et_mean: stats.et_mean,
            et_sd: stats.et_sd,
            ebr: stats.ebr,
            lai: stats.lai,
            lai_min: stats.lai_min,
            lai_max: stats.lai_max,
            most_prod_mths: months,
            omega: stats.omega,
            gs_method: stats.gs_method,
            success: true,
            failure_reason: String::new(),
        }
    }

    pub fn bad(identity: SiteIdentity, reason: impl Into<String>) -> Self {
        Self {
            site: identity.site,
            name: identity.name,
            country: identity.country,
            year: identity.year,
            latitude: identity.latitude,
            longitude: identity.longitude,
            pft: identity.pft,
            climate_class: identity.climate_class,
            g0: BAD_VALUE,
            g1: BAD_VALUE,
            g1_se: BAD_VALUE,
            n: BAD_VALUE,
            r2: BAD_VALUE,
            rmse: BAD_VALUE,
            co2: BAD_VALUE,
            global_co2: BAD_VALUE,
            summer_precip: BAD_VALUE,
            summer_gpp_mean: BAD_VALUE,
            summer_gpp_sd: BAD_VALUE,
            et_mean: BAD_VALUE,
            et_sd: BAD_VALUE,
            ebr: BAD_VALUE,
            lai: BAD_VALUE,
            lai_min: BAD_VALUE,
            lai_max: BAD_VALUE,
            most_prod_mths: BAD_VALUE.to_string(),
            omega: BAD_VALUE,
            gs_method: String::new(),
            success: false,
            failure_reason: reason.into(),
        }
    }

    pub fn is_good(&self) -> bool {
        self.success
    }
}

/// A fit row that survived screening, with its screening annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenedFitRow {
    #[serde(rename = "Scale")]
    pub scale: String,
    pub site: String,
    pub name: String,
    pub country: String,
    pub year: i32,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "PFT")]
    pub pft: String,
    pub climate_class: String,
    pub g1: f64,
    pub g1_se: f64,
    pub n: f64,
    pub r2: f64,
    pub rmse: f64,
    #[serde(rename = "CO2")]
    pub co2: f64,
    #[serde(rename = "global_CO2")]
    pub global_co2: f64,
    pub summer_precip: f64,
    #[serde(rename = "summer_mu_GPP_umol_m2_s")]
    pub summer_gpp_mean: f64,
    #[serde(rename = "summer_sd_GPP_umol_m2_s")]
    pub summer_gpp_sd: f64,
    #[serde(rename = "ET_mmol_m2_s")]
    pub et_mean: f64,
    #[serde(rename = "ET_sd_mmol_m2_s")]
    pub et_sd: f64,
    pub ebr: f64,
    pub lai: f64,
    pub lai_min: f64,
    pub lai_max: f64,
    pub most_prod_mths: String,
    pub omega: f64,
    pub gs_method: String,
    #[serde(rename = "g1_interannual_anomaly (%)")]
    pub g1_anomaly_pct: f64,
    pub c4_frac: f64,
}

impl ScreenedFitRow {
    pub fn from_fit(fit: FitResult, g1_anomaly_pct: f64, c4_frac: f64) -> Self {
        Self {
            scale: SCALE_FLUXNET.to_string(),
            site: fit.site,
            name: fit.name,
            country: fit.country,
            year: fit.year,
            latitude: fit.latitude,
            longitude: fit.longitude,
            pft: fit.pft,
            climate_class: fit.climate_class,
            g1: fit.g1,
            g1_se: fit.g1_se,
            n: fit.n,
            r2: fit.r2,
            rmse: fit.rmse,
            co2: fit.co2,
            global_co2: fit.global_co2,
            summer_precip: fit.summer_precip,
            summer_gpp_mean: fit.summer_gpp_mean,
            summer_gpp_sd: fit.summer_gpp_sd,
            et_mean: fit.et_mean,
            et_sd: fit.et_sd,
            ebr: fit.ebr,
            lai: fit.lai,
            lai_min: fit.lai_min,
            lai_max: fit.lai_max,
            most_prod_mths: fit.most_prod_mths,
            omega: fit.omega,
            gs_method: fit.gs_method,
            g1_anomaly_pct,
            c4_frac,
        }
    }
}
