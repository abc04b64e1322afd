//! The raw outcome of a single least-squares run.

use levenberg_marquardt::TerminationReason;
use serde::{Deserialize, Serialize};

/// Why the optimizer stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Relative reduction of χ² or of the step fell below tolerance
    Converged,
    /// Residuals became exactly zero
    ResidualsZero,
    /// Residuals are orthogonal to the Jacobian columns
    Orthogonal,
    /// The residual evaluation budget was spent
    BudgetExhausted,
    /// Non-finite residuals or a failed simulation
    Numerical(String),
    /// Every parameter was fixed, residuals were evaluated once
    NoVaryingParameters,
    /// Any other reason reported by the minimizer
    Other(String),
}

impl Termination {
    pub(crate) fn from_reason(reason: &TerminationReason, budget_exhausted: bool) -> Self {
        match reason {
            TerminationReason::Converged { .. } => Termination::Converged,
            TerminationReason::ResidualsZero => Termination::ResidualsZero,
            TerminationReason::Orthogonal => Termination::Orthogonal,
            TerminationReason::LostPatience => Termination::BudgetExhausted,
            _ if budget_exhausted => Termination::BudgetExhausted,
            TerminationReason::Numerical(what) => Termination::Numerical(what.to_string()),
            TerminationReason::User(what) => Termination::Numerical(what.to_string()),
            TerminationReason::NoParameters => Termination::NoVaryingParameters,
            other => Termination::Other(format!("{:?}", other)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Termination::Converged
                | Termination::ResidualsZero
                | Termination::Orthogonal
                | Termination::NoVaryingParameters
        )
    }
}

/// Statistics reported by a least-squares run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub termination: Termination,
    pub success: bool,
    /// Residual evaluations, including those spent on the Jacobian
    pub nfev: usize,
    /// Sum of squared residuals
    pub chisqr: f64,
    /// χ² per degree of freedom
    pub redchi: f64,
    pub ndata: usize,
    pub nvarys: usize,
    pub aic: f64,
    pub bic: f64,
    pub message: String,
}
