pub mod fit_result;
pub mod flux;
pub mod site;

pub use fit_result::{FitResult, FitStatistics, ScreenedFitRow, SiteIdentity};
pub use flux::{HalfHourRecord, QcFlags, SiteYearSeries};
pub use site::{Elevation, LaiRecord, SiteInfo, SiteMetadata};
