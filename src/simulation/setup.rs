//! Setup module for configuring ODE simulations.
//!
//! This module provides the [`SimulationSetup`] struct and its builder for configuring
//! the numerical integration of a reaction system:
//!
//! - Initial integration step size
//! - Error tolerance and step size limits of the adaptive integrator
//!
//! The integration range is not part of the setup. It follows the observation times of
//! each sample.
//!
//! Fits integrate with the adaptive [`RKF45`] unless told otherwise. It is explicit and
//! slows down on stiff systems, where the implicit [`GL4`] from [`SimulationSetup::gl4`]
//! is the better choice. GL4 steps with the fixed `dt`.

use derive_builder::Builder;
use peroxide::fuga::{ImplicitSolver, GL4, RKF45};
use serde::{Deserialize, Serialize};

/// Configuration for numerical integration of ODE systems
///
/// # Fields
///
/// * `dt` - Initial step size, and the step size of fixed-step integrators (default: 0.1)
/// * `tol` - Local error tolerance of the adaptive integrator (default: 1e-8)
/// * `safety_factor` - Damping applied to adaptive step size updates (default: 0.9)
/// * `min_step` - Smallest step the adaptive integrator may take (default: 1e-6)
/// * `max_step` - Largest step the adaptive integrator may take (default: 0.25)
/// * `max_step_iter` - Step size reductions tried before giving up on a step (default: 100)
///
/// # Examples
///
/// ```
/// use enzynetics::prelude::SimulationSetupBuilder;
///
/// let setup = SimulationSetupBuilder::default()
///     .dt(0.05)
///     .tol(1e-10)
///     .build()
///     .unwrap();
///
/// assert_eq!(setup.max_step, 0.25);
/// ```
#[derive(Debug, Clone, Copy, Builder, Serialize, Deserialize, PartialEq)]
pub struct SimulationSetup {
    #[builder(default = "0.1")]
    pub dt: f64,
    #[builder(default = "1e-8")]
    pub tol: f64,
    #[builder(default = "0.9")]
    pub safety_factor: f64,
    #[builder(default = "1e-6")]
    pub min_step: f64,
    #[builder(default = "0.25")]
    pub max_step: f64,
    #[builder(default = "100")]
    pub max_step_iter: usize,
}

impl Default for SimulationSetup {
    fn default() -> Self {
        Self {
            dt: 0.1,
            tol: 1e-8,
            safety_factor: 0.9,
            min_step: 1e-6,
            max_step: 0.25,
            max_step_iter: 100,
        }
    }
}

impl SimulationSetup {
    /// Adaptive Runge-Kutta-Fehlberg integrator configured from this setup
    pub fn rkf45(&self) -> RKF45 {
        RKF45::new(
            self.tol,
            self.safety_factor,
            self.min_step,
            self.max_step,
            self.max_step_iter,
        )
    }

    /// Implicit Gauss-Legendre integrator for stiff systems, solving each stage with
    /// Broyden's method to `tol`
    pub fn gl4(&self) -> GL4 {
        GL4::new(ImplicitSolver::Broyden, self.tol, self.max_step_iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_match_default() {
        let built = SimulationSetupBuilder::default().build().unwrap();
        assert_eq!(built, SimulationSetup::default());
    }

    #[test]
    fn test_integrators_follow_setup() {
        let setup = SimulationSetupBuilder::default()
            .tol(1e-6)
            .max_step_iter(20)
            .build()
            .unwrap();

        let gl4 = setup.gl4();
        assert!(matches!(gl4.solver, ImplicitSolver::Broyden));
        assert_eq!(gl4.tol, 1e-6);
        assert_eq!(gl4.max_step_iter, 20);

        let rkf45 = setup.rkf45();
        assert_eq!(rkf45.tol, 1e-6);
        assert_eq!(rkf45.max_step_iter, 20);
    }
}
