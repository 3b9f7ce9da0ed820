pub mod constants;
pub mod filename;
pub mod progress;
pub mod stats;

pub use constants::*;
pub use filename::{generate_default_fit_filename, parse_site_year, SiteYearKey};
pub use progress::ProgressReporter;
