//! Medlyn et al. (2011) optimal stomatal conductance model and its
//! least-squares fit.
//!
//! g_s = g0 + 1.6 (1 + g1 / sqrt(D)) A / Ca
//!
//! g0 is held fixed (zero for the flux fits); only g1 is estimated, with a
//! lower bound of zero. The minimiser is a bounded Levenberg-Marquardt
//! iteration whose termination codes follow MINPACK's `info` convention so
//! that a fit can be classified the same way regardless of how it ended.

use crate::utils::stats::{pearson_r, rmse};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("observation and driver lengths differ ({observed} vs {drivers})")]
    LengthMismatch { observed: usize, drivers: usize },

    #[error("too few points to fit: {0}")]
    TooFewPoints(usize),

    #[error("degenerate input at index {index}: {reason}")]
    DegenerateInput { index: usize, reason: &'static str },

    #[error("singular Jacobian")]
    SingularJacobian,

    #[error("solver did not converge ({0:?})")]
    NotConverged(SolverStatus),

    #[error("standard error could not be estimated")]
    NoStandardError,
}

/// Why the minimiser stopped. Codes 1-4 are convergence, larger codes are
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// Relative reduction of the sum of squares is below `ftol`
    SumOfSquaresConverged,
    /// Relative change of the parameter is below `xtol`
    ParameterConverged,
    /// Both of the above
    BothConverged,
    /// Residuals are orthogonal to the Jacobian (gradient below `gtol`)
    Orthogonal,
    /// Evaluation budget exhausted
    MaxEvaluations,
    /// Damping grew without finding a downhill step
    Stalled,
}

impl SolverStatus {
    pub fn code(&self) -> u8 {
        match self {
            SolverStatus::SumOfSquaresConverged => 1,
            SolverStatus::ParameterConverged => 2,
            SolverStatus::BothConverged => 3,
            SolverStatus::Orthogonal => 4,
            SolverStatus::MaxEvaluations => 5,
            SolverStatus::Stalled => 6,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.code() <= 4
    }
}

/// One observation of the fit drivers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drivers {
    /// Vapour pressure deficit (kPa)
    pub vpd: f64,
    /// Photosynthesis / GPP (umol m-2 s-1)
    pub gpp: f64,
    /// CO2 concentration (umol mol-1)
    pub co2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MedlynFit {
    pub g0: f64,
    pub g1: f64,
    pub g1_se: f64,
    pub r2: f64,
    pub rmse: f64,
    pub n: usize,
    pub iterations: usize,
    pub status: SolverStatus,
}

#[derive(Debug, Clone)]
pub struct MedlynModel {
    g0: f64,
    initial_g1: f64,
    lower_g1: f64,
    upper_g1: f64,
    max_evaluations: usize,
    ftol: f64,
    xtol: f64,
    gtol: f64,
}

impl MedlynModel {
    pub fn new() -> Self {
        Self {
            g0: 0.0,
            initial_g1: 2.0,
            lower_g1: 0.0,
            upper_g1: f64::INFINITY,
            max_evaluations: 400,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 0.0,
        }
    }

    pub fn with_initial_g1(mut self, g1: f64) -> Self {
        self.initial_g1 = g1;
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    /// Stomatal conductance (mol m-2 s-1)
    pub fn conductance(vpd: f64, gpp: f64, co2: f64, g0: f64, g1: f64) -> f64 {
        g0 + 1.6 * (1.0 + g1 / vpd.sqrt()) * (gpp / co2)
    }

    pub fn predict(&self, drivers: &[Drivers], g1: f64) -> Vec<f64> {
        drivers
            .iter()
            .map(|d| Self::conductance(d.vpd, d.gpp, d.co2, self.g0, g1))
            .collect()
    }

    /// Fit g1 to observed conductance. Any non-convergence, singularity or
    /// missing standard error is returned as an error; a returned
    /// `MedlynFit` is always complete.
    pub fn fit(&self, drivers: &[Drivers], observed: &[f64]) -> Result<MedlynFit, FitError> {
        if drivers.len() != observed.len() {
            return Err(FitError::LengthMismatch {
                observed: observed.len(),
                drivers: drivers.len(),
            });
        }
        let n = observed.len();
        if n < 2 {
            return Err(FitError::TooFewPoints(n));
        }
        let jacobian = self.jacobian(drivers, observed)?;

        let mut g1 = self.initial_g1.clamp(self.lower_g1, self.upper_g1);
        let mut ssr = self.sum_of_squares(drivers, observed, g1);
        let mut lambda = 1e-3;
        let mut evaluations = 1;
        let mut iterations = 0;

        // the Jacobian is independent of g1
        let jtj: f64 = jacobian.iter().map(|j| j * j).sum();
        if !jtj.is_finite() || jtj <= f64::EPSILON {
            return Err(FitError::SingularJacobian);
        }

        let status = loop {
            if ssr == 0.0 {
                break SolverStatus::BothConverged;
            }
            let jtr: f64 = jacobian
                .iter()
                .zip(drivers.iter().zip(observed))
                .map(|(j, (d, obs))| {
                    j * (obs - Self::conductance(d.vpd, d.gpp, d.co2, self.g0, g1))
                })
                .sum();

            let gradient = jtr.abs() / (jtj.sqrt() * ssr.sqrt());
            if gradient <= self.gtol {
                break SolverStatus::Orthogonal;
            }
            if evaluations >= self.max_evaluations {
                break SolverStatus::MaxEvaluations;
            }

            let step = jtr / (jtj * (1.0 + lambda));
            let candidate = (g1 + step).clamp(self.lower_g1, self.upper_g1);
            if candidate == g1 {
                // pinned at a bound or step below floating-point resolution
                break SolverStatus::ParameterConverged;
            }
            let candidate_ssr = self.sum_of_squares(drivers, observed, candidate);
            evaluations += 1;

            if !candidate_ssr.is_finite() {
                return Err(FitError::NotConverged(SolverStatus::Stalled));
            }

            if candidate_ssr <= ssr {
                iterations += 1;
                let reduction = (ssr - candidate_ssr) / ssr;
                let dx = (candidate - g1).abs();
                let x_done = dx <= self.xtol * (g1.abs() + self.xtol);
                let f_done = reduction <= self.ftol;

                g1 = candidate;
                ssr = candidate_ssr;
                lambda = (lambda / 10.0).max(1e-12);

                match (f_done, x_done) {
                    (true, true) => break SolverStatus::BothConverged,
                    (true, false) => break SolverStatus::SumOfSquaresConverged,
                    (false, true) => break SolverStatus::ParameterConverged,
                    (false, false) => {}
                }
            } else {
                lambda *= 10.0;
                if lambda > 1e16 {
                    break SolverStatus::Stalled;
                }
            }
        };

        if !status.is_converged() {
            return Err(FitError::NotConverged(status));
        }

        // covariance = inv(J'J) * reduced chi-square
        let dof = (n - 1) as f64;
        let variance = ssr / dof / jtj;
        let g1_se = variance.sqrt();
        if !g1_se.is_finite() || !g1.is_finite() {
            return Err(FitError::NoStandardError);
        }

        let predicted = self.predict(drivers, g1);
        let r = pearson_r(observed, &predicted);
        let r2 = r.map(|r| r * r).unwrap_or(f64::NAN);
        if !r2.is_finite() {
            return Err(FitError::DegenerateInput {
                index: 0,
                reason: "no variance in observed or predicted conductance",
            });
        }

        Ok(MedlynFit {
            g0: self.g0,
            g1,
            g1_se,
            r2,
            rmse: rmse(observed, &predicted),
            n,
            iterations,
            status,
        })
    }

    fn sum_of_squares(&self, drivers: &[Drivers], observed: &[f64], g1: f64) -> f64 {
        drivers
            .iter()
            .zip(observed)
            .map(|(d, obs)| (obs - Self::conductance(d.vpd, d.gpp, d.co2, self.g0, g1)).powi(2))
            .sum()
    }

    /// d(model)/d(g1), validating each driver row on the way.
    fn jacobian(&self, drivers: &[Drivers], observed: &[f64]) -> Result<Vec<f64>, FitError> {
        drivers
            .iter()
            .zip(observed)
            .enumerate()
            .map(|(index, (d, obs))| {
                if !(d.vpd > 0.0) || !d.vpd.is_finite() {
                    return Err(FitError::DegenerateInput {
                        index,
                        reason: "VPD must be positive",
                    });
                }
                if !(d.co2 > 0.0) || !d.co2.is_finite() {
                    return Err(FitError::DegenerateInput {
                        index,
                        reason: "CO2 must be positive",
                    });
                }
                if !d.gpp.is_finite() || !obs.is_finite() {
                    return Err(FitError::DegenerateInput {
                        index,
                        reason: "non-finite GPP or conductance",
                    });
                }
                Ok(1.6 * d.gpp / (d.co2 * d.vpd.sqrt()))
            })
            .collect()
    }
}

impl Default for MedlynModel {
    fn default() -> Self {
        Self::new()
    }
}
