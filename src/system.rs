//! Reaction systems: one substrate rate law plus an optional catalyst inactivation law.
//!
//! A [`ReactionSystem`] integrates its rate laws jointly over the state vector
//! `(substrate, catalyst, product)` and fits them jointly against substrate
//! observations. Parameters shared between the two laws (same name) are a single
//! quantity in the fit.
//!
//! The system owns the [`FitResult`] of its last fit and is the only place where the
//! parameter registries of its models are written.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Array3, Axis};
use peroxide::fuga::ODEIntegrator;
use serde::{Deserialize, Serialize};

use crate::data::prepare::PreparedData;
use crate::model::KineticModel;
use crate::optim::error::OptimizeError;
use crate::optim::problem::{BoundedProblem, Objective};
use crate::optim::report::FitReport;
use crate::optim::runner::{minimize, FitConfig};
use crate::orchestrator::FitError;
use crate::parameter::{ParameterName, ParameterRegistry, ParameterValues};
use crate::result::FitResult;
use crate::simulation::setup::SimulationSetup;
use crate::simulation::system::ReactionRhs;
use crate::species::{Species, SpeciesRole};

/// Separator between the substrate and catalyst model names in a system name
pub const NAME_SEPARATOR: &str = " | ";

/// Which state variable the rate law of a reaction drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionRole {
    SubstrateDynamics,
    CatalystDynamics,
}

/// A kinetic model together with the species it acts on
#[derive(Debug, Clone)]
pub struct Reaction {
    pub role: ReactionRole,
    pub model: KineticModel,
    pub species: Vec<Species>,
}

impl Reaction {
    /// Wraps a model, deriving the role from the left-hand side of its rate law
    pub fn new(model: KineticModel, species: Vec<Species>) -> Result<Self, FitError> {
        let role = match model.species() {
            SpeciesRole::Substrate => ReactionRole::SubstrateDynamics,
            SpeciesRole::Catalyst => ReactionRole::CatalystDynamics,
            other => {
                return Err(FitError::SystemAssembly(format!(
                    "model '{}' drives {}, expected substrate or catalyst",
                    model.name(),
                    other
                )))
            }
        };

        Ok(Self {
            role,
            model,
            species,
        })
    }
}

/// Substrate observations and the inputs needed to simulate them
struct Observations<'a> {
    initial_conditions: Array2<f64>,
    time: &'a Array2<f64>,
    inhibitor: Array1<f64>,
    substrate: &'a Array2<f64>,
}

/// One or two kinetic models integrated and fitted as a single ODE system
#[derive(Debug, Clone)]
pub struct ReactionSystem {
    name: String,
    reactions: Vec<Reaction>,
    result: Option<FitResult>,
}

impl ReactionSystem {
    /// Assembles a system from its reactions.
    ///
    /// # Errors
    ///
    /// [`FitError::SystemAssembly`] unless there is exactly one substrate reaction and
    /// at most one catalyst reaction.
    pub fn new(reactions: Vec<Reaction>) -> Result<Self, FitError> {
        let (mut reactions, mut catalyst): (Vec<_>, Vec<_>) = reactions
            .into_iter()
            .partition(|r| r.role == ReactionRole::SubstrateDynamics);

        if reactions.len() != 1 {
            return Err(FitError::SystemAssembly(format!(
                "expected exactly one substrate reaction, got {}",
                reactions.len()
            )));
        }
        if catalyst.len() > 1 {
            return Err(FitError::SystemAssembly(format!(
                "expected at most one catalyst reaction, got {}",
                catalyst.len()
            )));
        }

        reactions.append(&mut catalyst);

        let name = reactions.iter().map(|r| r.model.name()).join(NAME_SEPARATOR);

        Ok(Self {
            name,
            reactions,
            result: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    /// Result of the last fit, if any
    pub fn result(&self) -> Option<&FitResult> {
        self.result.as_ref()
    }

    pub fn substrate_model(&self) -> &KineticModel {
        &self.reactions[0].model
    }

    pub fn catalyst_model(&self) -> Option<&KineticModel> {
        self.reactions.get(1).map(|r| &r.model)
    }

    /// Joint parameter registry. A name used by both models appears once, with the
    /// settings of the substrate model.
    pub fn parameters(&self) -> ParameterRegistry {
        let mut joint = self.substrate_model().parameters().clone();
        if let Some(catalyst) = self.catalyst_model() {
            joint.merge(catalyst.parameters());
        }
        joint
    }

    /// Pins the current value of a parameter in every model using it.
    ///
    /// Returns whether any model knows the parameter.
    pub(crate) fn set_parameter_value(
        &mut self,
        name: ParameterName,
        value: f64,
    ) -> Result<bool, FitError> {
        let mut found = false;
        for reaction in self.reactions.iter_mut() {
            let registry = reaction.model.parameters_mut();
            if registry.contains(name) {
                registry.set_value(name, value)?;
                found = true;
            }
        }
        Ok(found)
    }

    /// Joint right-hand side `f(y, t, p)` over the state `(substrate, catalyst, product)`,
    /// with the parameter vector ordered like [`ReactionSystem::parameters`]
    pub fn setup_rhs(&self) -> Result<ReactionRhs, FitError> {
        let rhs = ReactionRhs::new(
            self.substrate_model().shared_law(),
            self.catalyst_model().map(KineticModel::shared_law),
            self.parameters().names().collect(),
        )?;
        Ok(rhs)
    }

    /// Integrates every row of the batch with the given parameter values.
    ///
    /// # Arguments
    ///
    /// * `initial_conditions` - `(batch, 3)` rows of `(substrate, catalyst, product)`
    /// * `time` - `(batch, n_times)` output times per row
    /// * `inhibitor` - Inhibitor level per row
    /// * `params` - Values of all parameters of the system
    ///
    /// # Returns
    ///
    /// Array indexed `[batch, time, species]`
    pub fn simulate<S: ODEIntegrator + Copy>(
        &self,
        initial_conditions: &Array2<f64>,
        time: &Array2<f64>,
        inhibitor: &Array1<f64>,
        params: &ParameterValues,
        setup: &SimulationSetup,
        solver: S,
    ) -> Result<Array3<f64>, FitError> {
        let rhs = self.setup_rhs()?;
        let params = rhs.bind(params)?;
        let output = rhs.simulate(initial_conditions, time, inhibitor, &params, setup, solver)?;
        Ok(output)
    }

    /// Simulated minus observed substrate, flattened row by row.
    ///
    /// Product observations have to be converted to substrate beforehand.
    #[allow(clippy::too_many_arguments)]
    pub fn residuals<S: ODEIntegrator + Copy>(
        &self,
        params: &ParameterValues,
        time: &Array2<f64>,
        initial_conditions: &Array2<f64>,
        inhibitor: &Array1<f64>,
        observed_substrate: &Array2<f64>,
        setup: &SimulationSetup,
        solver: S,
    ) -> Result<Array1<f64>, FitError> {
        let rhs = self.setup_rhs()?;
        let params = rhs.bind(params)?;
        let observations = Observations {
            initial_conditions: initial_conditions.clone(),
            time,
            inhibitor: inhibitor.clone(),
            substrate: observed_substrate,
        };

        Ok(substrate_residuals(
            &rhs,
            &params,
            &observations,
            setup,
            solver,
        )?)
    }

    /// Fits all non-fixed parameters against the substrate series of `data`.
    ///
    /// Parameters listed in `fixed` keep their current value. Initial conditions are
    /// the first column of the substrate, enzyme and product series. On success the
    /// fitted values, standard errors and correlations are written into the model
    /// registries; on failure these are cleared, except for the frozen parameters.
    /// The [`FitResult`] replaces any earlier one.
    ///
    /// # Errors
    ///
    /// Only structural problems are returned as errors. A fit that does not converge
    /// or runs into non-finite residuals yields an unsuccessful report.
    pub fn fit<S: ODEIntegrator + Copy>(
        &mut self,
        data: &PreparedData,
        fixed: &[ParameterName],
        config: &FitConfig,
        solver: S,
    ) -> Result<FitReport, FitError> {
        if data.substrate.dim() != data.time.dim() {
            return Err(OptimizeError::ShapeMismatch {
                expected: data.time.dim(),
                found: data.substrate.dim(),
            }
            .into());
        }

        let snapshot = self.parameters().snapshot_for_fit(fixed);
        let rhs = self.setup_rhs()?;
        let observations = Observations {
            initial_conditions: data.initial_conditions()?,
            time: &data.time,
            inhibitor: data.inhibitor_levels()?,
            substrate: &data.substrate,
        };

        info!(
            "Fitting '{}' to {} samples ({} varying parameters)",
            self.name,
            data.n_samples(),
            snapshot.iter().filter(|p| p.vary).count()
        );

        let outcome = {
            let objective: Objective<'_> = Box::new(|params: &[f64]| {
                substrate_residuals(&rhs, params, &observations, &config.simulation, solver)
            });
            let problem =
                BoundedProblem::new(&snapshot, data.substrate.len(), config.max_nfev, objective);
            minimize(problem, config)
        };

        let result = FitResult::from_outcome(self.name.clone(), &outcome);
        let fitted = result.fitted_parameters();

        if result.success {
            info!(
                "Fitted '{}': AIC = {:.3}, {} evaluations",
                self.name, result.report.aic, result.report.nfev
            );
            for reaction in self.reactions.iter_mut() {
                reaction.model.parameters_mut().update_from_fit(&fitted);
            }
        } else {
            warn!("Fit of '{}' failed: {}", self.name, result.report.message);
            let varied = result.varied();
            let frozen: BTreeMap<_, _> = fitted
                .into_iter()
                .filter(|(name, _)| !varied.contains(name))
                .collect();
            for reaction in self.reactions.iter_mut() {
                let registry = reaction.model.parameters_mut();
                registry.clear_fit();
                registry.update_from_fit(&frozen);
            }
        }

        let report = result.report.clone();
        self.result = Some(result);
        Ok(report)
    }
}

fn substrate_residuals<S: ODEIntegrator + Copy>(
    rhs: &ReactionRhs,
    params: &[f64],
    observations: &Observations,
    setup: &SimulationSetup,
    solver: S,
) -> Result<Array1<f64>, OptimizeError> {
    if observations.substrate.dim() != observations.time.dim() {
        return Err(OptimizeError::ShapeMismatch {
            expected: observations.time.dim(),
            found: observations.substrate.dim(),
        });
    }

    let simulated = rhs.simulate(
        &observations.initial_conditions,
        observations.time,
        &observations.inhibitor,
        params,
        setup,
        solver,
    )?;

    let substrate = simulated.index_axis(Axis(2), 0);
    let residuals: Array1<f64> = (&substrate - observations.substrate).iter().copied().collect();

    debug!(
        "χ² = {:.6e} at {:?}",
        residuals.iter().map(|r| r * r).sum::<f64>(),
        params
    );

    Ok(residuals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initials::InitialGuesses;
    use approx::assert_relative_eq;
    use ndarray::array;
    use peroxide::fuga::RK4;

    const MENTEN: &str = "substrate = -k_cat * catalyst * substrate / (K_m + substrate)";
    const DECAY: &str = "catalyst = -K_ie * catalyst";

    fn reaction(name: &str, equation: &str) -> Reaction {
        let model = KineticModel::new(name, equation, &InitialGuesses::default()).unwrap();
        Reaction::new(model, vec![]).unwrap()
    }

    #[test]
    fn test_system_name_and_order() {
        let system =
            ReactionSystem::new(vec![reaction("decay", DECAY), reaction("mm", MENTEN)]).unwrap();

        assert_eq!(system.name(), "mm | decay");
        assert_eq!(system.reactions()[0].role, ReactionRole::SubstrateDynamics);
        assert_eq!(
            system.parameters().names().collect::<Vec<_>>(),
            vec![ParameterName::KCat, ParameterName::Km, ParameterName::Kie]
        );
    }

    #[test]
    fn test_invalid_compositions() {
        assert!(matches!(
            ReactionSystem::new(vec![reaction("decay", DECAY)]),
            Err(FitError::SystemAssembly(_))
        ));
        assert!(matches!(
            ReactionSystem::new(vec![reaction("a", MENTEN), reaction("b", MENTEN)]),
            Err(FitError::SystemAssembly(_))
        ));
        assert!(matches!(
            ReactionSystem::new(vec![
                reaction("mm", MENTEN),
                reaction("a", DECAY),
                reaction("b", DECAY)
            ]),
            Err(FitError::SystemAssembly(_))
        ));
    }

    #[test]
    fn test_residuals_are_flattened_row_major() {
        let system = ReactionSystem::new(vec![reaction("mm", MENTEN)]).unwrap();
        let params = ParameterValues::from([(ParameterName::KCat, 10.0), (ParameterName::Km, 5.0)]);

        // Observations equal to the initial state leave zero residuals at t = 0
        let residuals = system
            .residuals(
                &params,
                &array![[0.0, 1.0], [0.0, 1.0]],
                &array![[2.0, 0.1, 0.0], [4.0, 0.1, 0.0]],
                &array![0.0, 0.0],
                &array![[2.0, 2.0], [4.0, 4.0]],
                &SimulationSetup::default(),
                RK4,
            )
            .unwrap();

        assert_eq!(residuals.len(), 4);
        assert_relative_eq!(residuals[0], 0.0);
        assert_relative_eq!(residuals[2], 0.0);
        assert!(residuals[1] < 0.0);
        assert!(residuals[3] < 0.0);
    }

    #[test]
    fn test_set_parameter_value_reaches_both_models() {
        let mut system =
            ReactionSystem::new(vec![reaction("mm", MENTEN), reaction("decay", DECAY)]).unwrap();

        assert!(system.set_parameter_value(ParameterName::Kie, 0.5).unwrap());
        assert!(!system.set_parameter_value(ParameterName::Kic, 0.5).unwrap());
        assert_eq!(
            system.parameters().get(ParameterName::Kie).unwrap().value,
            Some(0.5)
        );
    }
}
