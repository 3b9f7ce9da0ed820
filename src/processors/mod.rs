pub mod dispatcher;
pub mod estimators;
pub mod filters;
pub mod result_screener;
pub mod site_year_processor;

pub use dispatcher::{DispatchOutcome, DispatchSummary, ParallelDispatcher, SiteYearTask};
pub use estimators::{
    BulkTransferEstimator, ConductanceEstimate, ConductanceEstimator, EstimationMethod,
    PenmanMonteithEstimator,
};
pub use result_screener::{ResultScreener, ScreeningOutcome, ScreeningReport};
pub use site_year_processor::{Rejection, SiteYearProcessor, Stage};
