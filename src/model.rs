//! A named rate law together with the parameters it references.

use std::sync::Arc;

use thiserror::Error;

use crate::initials::InitialGuesses;
use crate::parameter::{ParameterError, ParameterName, ParameterRegistry};
use crate::ratelaw::{RateLaw, RateLawError};
use crate::species::SpeciesRole;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid rate law: {0}")]
    RateLaw(#[from] RateLawError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error("No initial guess available for parameter {0}")]
    MissingGuess(ParameterName),
}

/// A compiled rate law and its parameter registry.
///
/// The registry always holds exactly the parameters appearing in the rate law.
#[derive(Debug, Clone)]
pub struct KineticModel {
    name: String,
    law: Arc<RateLaw>,
    parameters: ParameterRegistry,
}

impl KineticModel {
    /// Compiles `equation` and registers one parameter per parameter symbol, using
    /// `guesses` for starting values and bounds.
    pub fn new(
        name: impl Into<String>,
        equation: &str,
        guesses: &InitialGuesses,
    ) -> Result<Self, ModelError> {
        let law = RateLaw::compile(equation)?;
        Self::from_law(name, Arc::new(law), guesses)
    }

    /// Builds a model around an already compiled rate law
    pub fn from_law(
        name: impl Into<String>,
        law: Arc<RateLaw>,
        guesses: &InitialGuesses,
    ) -> Result<Self, ModelError> {
        let mut parameters = ParameterRegistry::new();
        for &param in law.parameters() {
            let guess = guesses.get(param).ok_or(ModelError::MissingGuess(param))?;
            parameters.add(param, guess.value, guess.lower, guess.upper, false)?;
        }

        Ok(Self {
            name: name.into(),
            law,
            parameters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Species whose derivative this model provides
    pub fn species(&self) -> SpeciesRole {
        self.law.lhs()
    }

    pub fn law(&self) -> &RateLaw {
        &self.law
    }

    /// Shared handle to the compiled rate law
    pub fn shared_law(&self) -> Arc<RateLaw> {
        Arc::clone(&self.law)
    }

    pub fn parameters(&self) -> &ParameterRegistry {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterRegistry {
        &mut self.parameters
    }
}
