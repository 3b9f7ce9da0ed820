//! Physical models used to turn flux-tower observations into canopy
//! conductance and to fit the Medlyn stomatal-conductance relation.

pub mod conductance;
pub mod penman_monteith;
pub mod pressure;

pub use conductance::{FitError, MedlynFit, MedlynModel, SolverStatus};
pub use penman_monteith::{BoundaryLayer, Forcing, PenmanMonteith, PenmanMonteithError};
pub use pressure::estimate_pressure;
