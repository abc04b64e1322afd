//! Drives a [`BoundedProblem`] through Levenberg-Marquardt and collects statistics.

use derive_builder::Builder;
use levenberg_marquardt::LevenbergMarquardt;
use log::{debug, warn};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::parameter::ParameterName;
use crate::simulation::setup::SimulationSetup;

use super::bound::Bound;
use super::covariance::{estimate, Covariance};
use super::metrics::{
    akaike_information_criterion, bayesian_information_criterion, reduced_chi_square,
    sum_of_squared_errors,
};
use super::problem::BoundedProblem;
use super::report::{FitReport, Termination};

/// Patience handed to the minimizer. The evaluation budget of [`FitConfig`] is
/// always reached first.
const PATIENCE: usize = 10_000;

/// Optimizer budget and tolerances
///
/// # Examples
///
/// ```
/// use enzynetics::prelude::FitConfigBuilder;
///
/// let config = FitConfigBuilder::default().max_nfev(500).build().unwrap();
/// assert_eq!(config.ftol, 1e-8);
/// ```
#[derive(Debug, Clone, Copy, Builder, Serialize, Deserialize, PartialEq)]
pub struct FitConfig {
    /// Maximum number of residual evaluations per fit
    #[builder(default = "300")]
    pub max_nfev: usize,
    #[builder(default = "1e-8")]
    pub ftol: f64,
    #[builder(default = "1e-8")]
    pub xtol: f64,
    #[builder(default = "1e-10")]
    pub gtol: f64,
    #[builder(default)]
    pub simulation: SimulationSetup,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_nfev: 300,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-10,
            simulation: SimulationSetup::default(),
        }
    }
}

/// Everything a finished least-squares run produced
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub report: FitReport,
    /// Parameter names, in snapshot order
    pub names: Vec<ParameterName>,
    /// Final external values, in snapshot order
    pub values: Vec<f64>,
    /// Bounds of the varying parameters, in snapshot order
    pub bounds: Vec<Bound>,
    /// Residuals at the final values, `None` if they could not be evaluated
    pub residuals: Option<Array1<f64>>,
    /// Covariance of the varying parameters, `None` if it could not be estimated
    pub covariance: Option<Covariance>,
}

/// Minimizes the problem and evaluates statistics at the optimum.
///
/// Numerical trouble never surfaces as an error; it ends up as an unsuccessful
/// [`FitReport`].
pub fn minimize(problem: BoundedProblem<'_>, config: &FitConfig) -> FitOutcome {
    let (problem, termination) = if problem.n_varys() == 0 {
        (problem, Termination::NoVaryingParameters)
    } else {
        let (problem, report) = LevenbergMarquardt::new()
            .with_ftol(config.ftol)
            .with_xtol(config.xtol)
            .with_gtol(config.gtol)
            .with_patience(PATIENCE)
            .minimize(problem);

        debug!(
            "Levenberg-Marquardt stopped after {} evaluations: {:?}",
            problem.nfev(),
            report.termination
        );

        let termination = Termination::from_reason(&report.termination, problem.budget_exhausted());
        (problem, termination)
    };

    let residuals = problem.final_residuals();
    let ndata = problem.n_residuals();
    let nvarys = problem.n_varys();

    let (termination, success) = match (&residuals, termination.is_success()) {
        (Some(_), true) => (termination, true),
        (None, true) => (
            Termination::Numerical("residuals at optimum".to_string()),
            false,
        ),
        (_, false) => (termination, false),
    };

    let chisqr = residuals
        .as_ref()
        .map(sum_of_squared_errors)
        .unwrap_or(f64::NAN);

    let covariance = if success && nvarys > 0 {
        problem
            .final_jacobian()
            .and_then(|jacobian| match estimate(&jacobian, chisqr, &problem.gradients()) {
                Ok(covariance) => Some(covariance),
                Err(e) => {
                    warn!("Could not estimate parameter uncertainties: {}", e);
                    None
                }
            })
    } else {
        None
    };

    let message = match &termination {
        Termination::Converged => "Fit converged".to_string(),
        Termination::ResidualsZero => "Residuals are zero".to_string(),
        Termination::Orthogonal => "Residuals are orthogonal to the Jacobian".to_string(),
        Termination::BudgetExhausted => format!(
            "Evaluation budget of {} residual evaluations exhausted",
            config.max_nfev
        ),
        Termination::Numerical(what) => format!("Numerical failure while evaluating {}", what),
        Termination::NoVaryingParameters => "All parameters fixed".to_string(),
        Termination::Other(what) => what.clone(),
    };

    let report = FitReport {
        termination,
        success,
        nfev: problem.nfev(),
        chisqr,
        redchi: reduced_chi_square(chisqr, ndata, nvarys),
        ndata,
        nvarys,
        aic: akaike_information_criterion(chisqr, ndata, nvarys),
        bic: bayesian_information_criterion(chisqr, ndata, nvarys),
        message,
    };

    FitOutcome {
        report,
        names: problem.names().to_vec(),
        values: problem.external(problem.internal()),
        bounds: problem.bounds().to_vec(),
        residuals,
        covariance,
    }
}
