//! Simulation Error Module
//!
//! Errors raised while assembling or integrating the ODE system of a reaction system.

use thiserror::Error;

use crate::parameter::ParameterName;
use crate::ratelaw::RateLawError;
use crate::species::SpeciesRole;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Error evaluating rate law: {0}")]
    RateLaw(#[from] RateLawError),
    #[error("Rate law for {0} cannot drive the state vector")]
    UnsupportedLhs(SpeciesRole),
    #[error("No value supplied for parameter {0}")]
    MissingParameter(ParameterName),
    #[error("Expected {expected} parameter values, got {found}")]
    ParameterCount { expected: usize, found: usize },
    #[error("Batch dimensions disagree: {0}")]
    ShapeMismatch(String),
    #[error("Integration failed: {0}")]
    Integration(String),
    #[error("Simulation produced non-finite values at t = {0}")]
    NonFinite(f64),
    #[error("Observation times must not decrease, got {next} after {previous}")]
    UnorderedTimes { previous: f64, next: f64 },
}
