//! Enzyme kinetics model-family fitting
//!
//! This library estimates kinetic parameters from enzyme assay time-courses and ranks
//! competing rate laws:
//! - Compiling textual rate laws into callable right-hand sides
//! - Integrating substrate and enzyme-inactivation laws as one ODE system
//! - Deriving initial guesses and bounds from raw data
//! - Bounded Levenberg-Marquardt fitting with standard errors and correlations
//! - Ranking candidate models by AIC

#![warn(unused_imports)]

/// Commonly used types and functionality re-exported for convenience
pub mod prelude {
    pub use crate::data::error::*;
    pub use crate::data::measurement::*;
    pub use crate::data::prepare::*;
    pub use crate::data::validation::*;
    pub use crate::initials::*;
    pub use crate::library::*;
    pub use crate::model::*;
    pub use crate::optim::report::*;
    pub use crate::optim::runner::{FitConfig, FitConfigBuilder};
    pub use crate::orchestrator::*;
    pub use crate::parameter::*;
    pub use crate::ratelaw::*;
    pub use crate::result::*;
    pub use crate::simulation::setup::*;
    pub use crate::species::*;
    pub use crate::system::*;
    pub use peroxide::fuga::{GL4, RK4, RK5, RKF45};
}

/// Species roles and entities
pub mod species;

/// Rate-law compilation
pub mod ratelaw;

/// Kinetic parameters and their registry
pub mod parameter;

/// Initial guesses and bounds derived from data
pub mod initials;

/// Kinetic models
pub mod model;

/// Built-in candidate rate laws
pub mod library;

/// ODE right-hand side and integration of reaction systems
pub mod simulation {
    pub use crate::simulation::setup::SimulationSetup;
    pub use crate::simulation::system::ReactionRhs;
    pub use peroxide::fuga::{ImplicitSolver, ODEIntegrator, GL4, RK4, RK5, RKF45};

    /// Error types for simulation failures
    pub mod error;
    /// Simulation setup and configuration
    pub mod setup;
    /// Dispatch of rate laws onto the shared state vector
    pub mod system;
}

/// Bounded least-squares fitting
pub mod optim {
    pub use crate::optim::bound::*;
    pub use crate::optim::covariance::*;
    pub use crate::optim::error::*;
    pub use crate::optim::problem::*;
    pub use crate::optim::report::*;
    pub use crate::optim::runner::*;

    pub mod bound;
    pub mod covariance;
    pub mod error;
    pub mod metrics;
    pub mod problem;
    pub mod report;
    pub mod runner;
}

/// Reactions and reaction systems
pub mod system;

/// Per-system fit results
pub mod result;

/// Experiment records and their preparation for fitting
pub mod data {
    pub mod error;
    pub mod measurement;
    pub mod prepare;
    pub mod validation;
}

/// Model-family fitting and ranking
pub mod orchestrator;

/// Display implementations for results
pub mod info;
