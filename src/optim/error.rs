use thiserror::Error;

use crate::parameter::ParameterName;
use crate::simulation::error::SimulationError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
    #[error("Failed to simulate with given parameters")]
    SimulationError(#[from] SimulationError),
    #[error("Parameter {0} not found")]
    UnknownParameter(ParameterName),
    #[error("Observations have shape {found:?}, simulation has {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Residual vector contains non-finite values")]
    NonFiniteResiduals,
    #[error("Jacobian could not be evaluated")]
    JacobianUnavailable,
    #[error("JᵀJ is singular, covariance is undefined")]
    SingularJacobian,
    #[error("No degrees of freedom left: {n_data} data points for {n_varys} varying parameters")]
    NoDegreesOfFreedom { n_data: usize, n_varys: usize },
}
