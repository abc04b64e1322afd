//! ODE right-hand side of a reaction system and its batch integration.
//!
//! Each compiled rate law declares an alphabetised argument list. When the right-hand
//! side is assembled, every argument is resolved once to a [`Binding`] into the state
//! vector, the inhibitor level or the joint parameter vector. Evaluation then only copies
//! values into a stack buffer in that order and calls the rate law.
//!
//! The state vector is `(substrate, catalyst, product)`; `d product = -d substrate`.

use std::cell::Cell;
use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayView1, Axis};
use peroxide::fuga::{ODEIntegrator, ODEProblem};

use crate::parameter::{ParameterName, ParameterValues};
use crate::ratelaw::{RateLaw, Symbol};
use crate::species::{SpeciesRole, N_STATES};

use super::error::SimulationError;
use super::setup::SimulationSetup;

/// Upper bound on the number of arguments of any rate law (four species, five parameters)
const MAX_ARGUMENTS: usize = SpeciesRole::ALL.len() + ParameterName::ALL.len();

const SUBSTRATE: usize = 0;
const CATALYST: usize = 1;
const PRODUCT: usize = 2;

/// Where a rate-law argument is read from
#[derive(Debug, Clone, Copy, PartialEq)]
enum Binding {
    State(usize),
    Inhibitor,
    Parameter(usize),
}

#[derive(Debug, Clone)]
struct BoundLaw {
    law: Arc<RateLaw>,
    bindings: Vec<Binding>,
}

impl BoundLaw {
    fn new(law: Arc<RateLaw>, parameters: &[ParameterName]) -> Result<Self, SimulationError> {
        let bindings = law
            .arguments()
            .iter()
            .map(|symbol| match symbol {
                Symbol::Species(SpeciesRole::Inhibitor) => Ok(Binding::Inhibitor),
                Symbol::Species(role) => role
                    .state_index()
                    .map(Binding::State)
                    .ok_or(SimulationError::UnsupportedLhs(*role)),
                Symbol::Parameter(name) => parameters
                    .iter()
                    .position(|p| p == name)
                    .map(Binding::Parameter)
                    .ok_or(SimulationError::MissingParameter(*name)),
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { law, bindings })
    }

    fn eval(&self, y: &[f64], inhibitor: f64, params: &[f64]) -> Result<f64, SimulationError> {
        let mut buffer = [0.0; MAX_ARGUMENTS];
        for (slot, binding) in buffer.iter_mut().zip(self.bindings.iter()) {
            *slot = match *binding {
                Binding::State(i) => y[i],
                Binding::Inhibitor => inhibitor,
                Binding::Parameter(i) => params[i],
            };
        }

        Ok(self.law.call(&buffer[..self.bindings.len()])?)
    }
}

/// The joint right-hand side `f(y, t, p)` of a reaction system
#[derive(Debug, Clone)]
pub struct ReactionRhs {
    substrate: BoundLaw,
    catalyst: Option<BoundLaw>,
    parameters: Vec<ParameterName>,
}

impl ReactionRhs {
    /// Binds a substrate law and an optional catalyst law to a shared parameter vector.
    ///
    /// `parameters` fixes the order of the parameter vector passed to
    /// [`ReactionRhs::derivatives`]. It must contain every parameter used by either law.
    pub fn new(
        substrate: Arc<RateLaw>,
        catalyst: Option<Arc<RateLaw>>,
        parameters: Vec<ParameterName>,
    ) -> Result<Self, SimulationError> {
        if substrate.lhs() != SpeciesRole::Substrate {
            return Err(SimulationError::UnsupportedLhs(substrate.lhs()));
        }
        if let Some(law) = catalyst.as_ref().filter(|l| l.lhs() != SpeciesRole::Catalyst) {
            return Err(SimulationError::UnsupportedLhs(law.lhs()));
        }

        Ok(Self {
            substrate: BoundLaw::new(substrate, &parameters)?,
            catalyst: catalyst
                .map(|law| BoundLaw::new(law, &parameters))
                .transpose()?,
            parameters,
        })
    }

    /// Order of the parameter vector
    pub fn parameter_order(&self) -> &[ParameterName] {
        &self.parameters
    }

    /// Projects a parameter map onto the parameter vector
    pub fn bind(&self, values: &ParameterValues) -> Result<Vec<f64>, SimulationError> {
        self.parameters
            .iter()
            .map(|name| {
                values
                    .get(name)
                    .copied()
                    .ok_or(SimulationError::MissingParameter(*name))
            })
            .collect()
    }

    /// Writes the derivatives of `y` into `dy`
    pub fn derivatives(
        &self,
        y: &[f64],
        inhibitor: f64,
        params: &[f64],
        dy: &mut [f64],
    ) -> Result<(), SimulationError> {
        if params.len() != self.parameters.len() {
            return Err(SimulationError::ParameterCount {
                expected: self.parameters.len(),
                found: params.len(),
            });
        }

        let d_substrate = self.substrate.eval(y, inhibitor, params)?;
        let d_catalyst = match &self.catalyst {
            Some(law) => law.eval(y, inhibitor, params)?,
            None => 0.0,
        };

        dy[SUBSTRATE] = d_substrate;
        dy[CATALYST] = d_catalyst;
        dy[PRODUCT] = -d_substrate;

        Ok(())
    }

    /// Evaluates `f(y, t, p)` for a named parameter map
    pub fn call(
        &self,
        y: &[f64; N_STATES],
        _t: f64,
        params: &ParameterValues,
        inhibitor: f64,
    ) -> Result<[f64; N_STATES], SimulationError> {
        let params = self.bind(params)?;
        let mut dy = [0.0; N_STATES];
        self.derivatives(y, inhibitor, &params, &mut dy)?;
        Ok(dy)
    }

    /// Integrates every row of the batch independently.
    ///
    /// # Arguments
    ///
    /// * `initial_conditions` - `(batch, 3)` rows of `(substrate, catalyst, product)`
    /// * `time` - `(batch, n_times)` output times per row, ascending
    /// * `inhibitor` - inhibitor level per row
    /// * `params` - parameter vector in [`ReactionRhs::parameter_order`]
    ///
    /// # Returns
    ///
    /// Array indexed `[batch, time, species]`, species in state order.
    pub fn simulate<S: ODEIntegrator + Copy>(
        &self,
        initial_conditions: &Array2<f64>,
        time: &Array2<f64>,
        inhibitor: &Array1<f64>,
        params: &[f64],
        setup: &SimulationSetup,
        solver: S,
    ) -> Result<Array3<f64>, SimulationError> {
        let batch = initial_conditions.nrows();
        if initial_conditions.ncols() != N_STATES {
            return Err(SimulationError::ShapeMismatch(format!(
                "initial conditions have {} columns, expected {}",
                initial_conditions.ncols(),
                N_STATES
            )));
        }
        if time.nrows() != batch || inhibitor.len() != batch {
            return Err(SimulationError::ShapeMismatch(format!(
                "{} initial condition rows, {} time rows, {} inhibitor levels",
                batch,
                time.nrows(),
                inhibitor.len()
            )));
        }

        let mut output = Array3::zeros((batch, time.ncols(), N_STATES));
        for (i, mut out) in output.axis_iter_mut(Axis(0)).enumerate() {
            let y0 = initial_conditions.row(i).to_vec();
            let times = time.row(i).to_vec();
            let problem = RowProblem::new(self, params, inhibitor[i]);

            for (mut state, y) in out
                .rows_mut()
                .into_iter()
                .zip(integrate_row(&problem, y0, &times, setup, solver)?)
            {
                state.assign(&ArrayView1::from(y.as_slice()));
            }
        }

        Ok(output)
    }
}

/// One row of a batch as an ODE problem for the integrator.
///
/// Adaptive integrators retry a step internally with a smaller size when its error
/// estimate is too large, and only report the size suggested for the next step. Every
/// attempt starts with an evaluation at the start time of the step, so counting those
/// evaluations tells whether the requested step size was the one accepted.
struct RowProblem<'a> {
    rhs: &'a ReactionRhs,
    params: &'a [f64],
    inhibitor: f64,
    step_start: Cell<f64>,
    attempts: Cell<usize>,
}

impl<'a> RowProblem<'a> {
    fn new(rhs: &'a ReactionRhs, params: &'a [f64], inhibitor: f64) -> Self {
        Self {
            rhs,
            params,
            inhibitor,
            step_start: Cell::new(f64::NAN),
            attempts: Cell::new(0),
        }
    }

    fn begin_step(&self, t: f64) {
        self.step_start.set(t);
        self.attempts.set(0);
    }

    fn was_retried(&self) -> bool {
        self.attempts.get() > 1
    }
}

impl ODEProblem for RowProblem<'_> {
    fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]) -> anyhow::Result<()> {
        if t == self.step_start.get() {
            self.attempts.set(self.attempts.get() + 1);
        }
        self.rhs.derivatives(y, self.inhibitor, self.params, dy)?;
        Ok(())
    }
}

/// Takes one step of exactly `h` from `(t, y)`.
///
/// Returns the step size the integrator suggests next. Attempts the integrator had to
/// shrink are discarded and repeated with a smaller `h`, so on success `y` always sits
/// at `t + h`.
fn exact_step<S: ODEIntegrator + Copy>(
    problem: &RowProblem,
    solver: S,
    t: f64,
    y: &mut Vec<f64>,
    h: f64,
    setup: &SimulationSetup,
) -> Result<(f64, f64), SimulationError> {
    let mut h = h;
    for _ in 0..setup.max_step_iter.max(1) {
        let mut trial = y.clone();
        problem.begin_step(t);
        let suggested = solver
            .step(problem, t, &mut trial, h)
            .map_err(|e| SimulationError::Integration(e.to_string()))?;

        if !problem.was_retried() {
            *y = trial;
            return Ok((h, suggested));
        }
        h = suggested.min(0.5 * h);
    }

    Err(SimulationError::Integration(format!(
        "no step accepted at t = {}",
        t
    )))
}

/// Integrates one row and returns the state at every observation time.
///
/// The integrator lands exactly on each observation time; the step size it suggests is
/// carried over whenever a step was shortened to hit one.
fn integrate_row<S: ODEIntegrator + Copy>(
    problem: &RowProblem,
    y0: Vec<f64>,
    times: &[f64],
    setup: &SimulationSetup,
    solver: S,
) -> Result<Vec<Vec<f64>>, SimulationError> {
    let Some(&t0) = times.first() else {
        return Ok(Vec::new());
    };

    if y0.iter().any(|v| !v.is_finite()) {
        return Err(SimulationError::NonFinite(t0));
    }

    let mut t = t0;
    let mut y = y0;
    let mut suggestion = setup.dt;
    let mut out = Vec::with_capacity(times.len());

    for &target in times {
        if target < t {
            return Err(SimulationError::UnorderedTimes {
                previous: t,
                next: target,
            });
        }

        while t < target {
            let remaining = target - t;
            let requested = suggestion.min(remaining);
            let clipped = requested < suggestion;
            let (taken, next) = exact_step(problem, solver, t, &mut y, requested, setup)?;

            if y.iter().any(|v| !v.is_finite()) {
                return Err(SimulationError::NonFinite(t + taken));
            }

            if taken >= remaining {
                t = target;
            } else if t + taken == t {
                return Err(SimulationError::Integration(format!(
                    "step size underflow at t = {}",
                    t
                )));
            } else {
                t += taken;
            }

            // A step cut short by an observation time says nothing about the next one
            suggestion = if clipped && taken == requested {
                suggestion.max(next)
            } else {
                next
            };
        }

        out.push(y.clone());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use peroxide::fuga::RK4;

    const MENTEN: &str = "substrate = -k_cat * catalyst * substrate / (K_m + substrate)";

    fn menten_rhs() -> ReactionRhs {
        ReactionRhs::new(
            Arc::new(RateLaw::compile(MENTEN).unwrap()),
            None,
            vec![ParameterName::KCat, ParameterName::Km],
        )
        .unwrap()
    }

    #[test]
    fn test_derivatives_dispatch_by_name() {
        let rhs = menten_rhs();
        let params = ParameterValues::from([(ParameterName::KCat, 10.0), (ParameterName::Km, 5.0)]);

        let dy = rhs.call(&[5.0, 0.1, 0.0], 0.0, &params, 0.0).unwrap();

        assert_relative_eq!(dy[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(dy[1], 0.0);
        assert_relative_eq!(dy[2], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_catalyst_law_and_inhibitor() {
        let substrate = RateLaw::compile(
            "substrate = -k_cat * catalyst * substrate / (K_m * (1 + inhibitor / K_ic) + substrate)",
        )
        .unwrap();
        let catalyst = RateLaw::compile("catalyst = -K_ie * catalyst").unwrap();
        let rhs = ReactionRhs::new(
            Arc::new(substrate),
            Some(Arc::new(catalyst)),
            vec![
                ParameterName::KCat,
                ParameterName::Km,
                ParameterName::Kic,
                ParameterName::Kie,
            ],
        )
        .unwrap();

        let mut dy = [0.0; N_STATES];
        rhs.derivatives(&[5.0, 0.1, 0.0], 2.0, &[10.0, 5.0, 2.0, 0.5], &mut dy)
            .unwrap();

        // K_m * (1 + 2 / 2) + 5 = 15
        assert_relative_eq!(dy[0], -5.0 / 15.0, epsilon = 1e-12);
        assert_relative_eq!(dy[1], -0.05, epsilon = 1e-12);
        assert_relative_eq!(dy[2], 5.0 / 15.0, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_parameter_is_rejected() {
        let result = ReactionRhs::new(
            Arc::new(RateLaw::compile(MENTEN).unwrap()),
            None,
            vec![ParameterName::KCat],
        );
        assert_eq!(
            result.unwrap_err(),
            SimulationError::MissingParameter(ParameterName::Km)
        );
    }

    #[test]
    fn test_swapped_laws_are_rejected() {
        let law = Arc::new(RateLaw::compile("catalyst = -K_ie * catalyst").unwrap());
        assert!(matches!(
            ReactionRhs::new(law, None, vec![ParameterName::Kie]),
            Err(SimulationError::UnsupportedLhs(SpeciesRole::Catalyst))
        ));
    }

    #[test]
    fn test_simulate_shape_and_initial_state() {
        let rhs = menten_rhs();
        let initials = array![[10.0, 0.1, 0.0], [2.0, 0.1, 0.0]];
        let time = array![[0.0, 1.0, 2.0, 3.0], [0.0, 1.0, 2.0, 3.0]];
        let inhibitor = array![0.0, 0.0];

        let out = rhs
            .simulate(
                &initials,
                &time,
                &inhibitor,
                &[10.0, 5.0],
                &SimulationSetup::default(),
                RK4,
            )
            .unwrap();

        assert_eq!(out.shape(), &[2, 4, 3]);
        assert_relative_eq!(out[[0, 0, 0]], 10.0);
        assert_relative_eq!(out[[1, 0, 0]], 2.0);
        assert!(out[[0, 3, 0]] < out[[0, 0, 0]]);
    }

    #[test]
    fn test_single_time_point() {
        let rhs = menten_rhs();
        let out = rhs
            .simulate(
                &array![[3.0, 0.1, 0.0]],
                &array![[0.0]],
                &array![0.0],
                &[10.0, 5.0],
                &SimulationSetup::default(),
                RK4,
            )
            .unwrap();

        assert_eq!(out.shape(), &[1, 1, 3]);
        assert_eq!(out[[0, 0, 0]], 3.0);
    }

    #[test]
    fn test_repeated_and_unordered_times() {
        let rhs = menten_rhs();
        let setup = SimulationSetup::default();

        let repeated = rhs
            .simulate(
                &array![[3.0, 0.1, 0.0]],
                &array![[0.0, 1.0, 1.0, 2.0]],
                &array![0.0],
                &[10.0, 5.0],
                &setup,
                setup.rkf45(),
            )
            .unwrap();
        let unordered = rhs.simulate(
            &array![[3.0, 0.1, 0.0]],
            &array![[0.0, 2.0, 1.0]],
            &array![0.0],
            &[10.0, 5.0],
            &setup,
            setup.rkf45(),
        );

        // ASSERT
        assert_eq!(repeated[[0, 1, 0]], repeated[[0, 2, 0]]);
        assert!(repeated[[0, 3, 0]] < repeated[[0, 2, 0]]);
        assert_eq!(
            unordered.unwrap_err(),
            SimulationError::UnorderedTimes {
                previous: 2.0,
                next: 1.0
            }
        );
    }

    #[test]
    fn test_shrunk_steps_keep_time_and_state_together() {
        // Fast inactivation forces the adaptive integrator to shrink its first steps
        let rhs = ReactionRhs::new(
            Arc::new(RateLaw::compile(MENTEN).unwrap()),
            Some(Arc::new(RateLaw::compile("catalyst = -K_ie * catalyst").unwrap())),
            vec![ParameterName::KCat, ParameterName::Km, ParameterName::Kie],
        )
        .unwrap();
        let setup = SimulationSetup::default();

        let out = rhs
            .simulate(
                &array![[1.0, 1.0, 0.0]],
                &array![[0.0, 0.5, 1.0, 2.0]],
                &array![0.0],
                &[1.0, 1.0, 8.0],
                &setup,
                setup.rkf45(),
            )
            .unwrap();

        for (j, t) in [0.0_f64, 0.5, 1.0, 2.0].iter().enumerate() {
            assert_relative_eq!(out[[0, j, 1]], (-8.0 * t).exp(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let rhs = menten_rhs();
        assert!(matches!(
            rhs.simulate(
                &array![[3.0, 0.1, 0.0]],
                &array![[0.0, 1.0], [0.0, 1.0]],
                &array![0.0],
                &[10.0, 5.0],
                &SimulationSetup::default(),
                RK4,
            ),
            Err(SimulationError::ShapeMismatch(_))
        ));
    }
}
