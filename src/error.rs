use crate::physics::conductance::FitError;
use crate::physics::penman_monteith::PenmanMonteithError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Site {site} not found in site metadata")]
    SiteNotFound { site: String },

    #[error("Site {site} not found in LAI table")]
    LaiNotFound { site: String },

    #[error("No global CO2 mean for year {year}")]
    GlobalCo2NotFound { year: i32 },

    #[error("Parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("Penman-Monteith error: {0}")]
    PenmanMonteith(#[from] PenmanMonteithError),
}
