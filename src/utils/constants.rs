/// Sentinel written to every numeric field that is undefined on a row
pub const BAD_VALUE: f64 = -999.9;

/// Raw flux files flag missing values with -9999; anything below this is missing
pub const MISSING_THRESHOLD: f64 = -9000.0;

/// Elevations at or below this are placeholders, not metres
pub const MIN_VALID_ELEVATION: f64 = -500.0;

/// Physical constants
pub const C_TO_K: f64 = 273.15;
pub const RGAS: f64 = 8.314; // J mol-1 K-1
pub const MILLIBAR_TO_PA: f64 = 100.0;
pub const HPA_TO_KPA: f64 = 0.1;
pub const KPA_TO_PA: f64 = 1000.0;
pub const MOL_TO_MMOL: f64 = 1000.0;

/// W m-2 -> mol H2O m-2 s-1, using a fixed latent heat of 2.45 MJ kg-1
pub const WM2_TO_MOL_H2O_M2_S: f64 = 1.0 / 2.45E6 * 1000.0 / 18.0;

/// Plant functional type codes
pub const PFT_UNKNOWN: &str = "TBD";
pub const PFT_WETLAND: &str = "WET";
pub const PFT_TROPICAL_RAINFOREST: &str = "TropRF";
pub const TROPICAL_TREE_PFTS: [&str; 3] = ["DBF", "EBF", "ENF"];
pub const CLIMATE_GROUP_TROPICAL: &str = "Tropical";

/// Label attached to screened flux rows
pub const SCALE_FLUXNET: &str = "FLUXNET";

/// Global C4 fraction grid (0.5 degree)
pub const LAND_COVER_NCOLS: usize = 720;
pub const LAND_COVER_NROWS: usize = 360;

/// Processing defaults
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "MEDLYN_G1";
