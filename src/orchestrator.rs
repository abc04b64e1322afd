//! Fitting a whole family of candidate models and ranking them.
//!
//! The [`FitOrchestrator`] expands a [`RateLawLibrary`] into reaction systems, fits
//! each of them against the same prepared data and ranks the outcome by AIC. Systems
//! are enumerated and fitted in library order: every substrate law on its own, then
//! once per catalyst law with enzyme inactivation added.
//!
//! # Examples
//!
//! ```no_run
//! use enzynetics::prelude::*;
//!
//! # fn run(experiment: Experiment) -> Result<(), FitError> {
//! let library = RateLawLibrary::for_experiment(experiment.has_inhibitor());
//! let orchestrator = fit_experiment(
//!     &experiment,
//!     library,
//!     &PreparationConfig::default(),
//!     FitConfig::default(),
//! )?;
//!
//! println!("{}", orchestrator.ranking());
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use log::{info, warn};
use ordered_float::OrderedFloat;
use peroxide::fuga::{ODEIntegrator, RKF45};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::error::DataError;
use crate::data::measurement::Experiment;
use crate::data::prepare::{prepare, PreparationConfig, PreparedData};
use crate::initials::InitialGuesses;
use crate::library::RateLawLibrary;
use crate::model::{KineticModel, ModelError};
use crate::optim::error::OptimizeError;
use crate::optim::runner::FitConfig;
use crate::parameter::{ParameterError, ParameterName};
use crate::ratelaw::RateLawError;
use crate::result::FitResult;
use crate::simulation::error::SimulationError;
use crate::species::{Species, SpeciesRole};
use crate::system::{Reaction, ReactionSystem};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Invalid rate law: {0}")]
    RateLaw(#[from] RateLawError),
    #[error("Simulation failed: {0}")]
    Simulation(#[from] SimulationError),
    #[error("Optimization failed: {0}")]
    Optimize(#[from] OptimizeError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error("No candidate substrate rate laws given")]
    EmptyCandidateSet,
    #[error("Unknown reaction system '{0}'")]
    UnknownSystem(String),
    #[error("Reference system '{0}' has no successful fit")]
    ReferenceNotFitted(String),
    #[error("Invalid reaction system: {0}")]
    SystemAssembly(String),
}

/// The species taking part in the reaction, shared by every candidate system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseReaction {
    pub substrate: Species,
    pub product: Species,
    pub catalyst: Species,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inhibitor: Option<Species>,
}

impl BaseReaction {
    pub fn new(substrate: Species, product: Species, catalyst: Species) -> Self {
        Self {
            substrate,
            product,
            catalyst,
            inhibitor: None,
        }
    }

    pub fn with_inhibitor(mut self, inhibitor: Species) -> Self {
        self.inhibitor = Some(inhibitor);
        self
    }

    /// Takes the species identifiers from the first measurement. Roles without an
    /// entry are named after the role.
    pub fn from_experiment(experiment: &Experiment) -> Result<Self, FitError> {
        let measurement = experiment
            .measurements
            .first()
            .ok_or(DataError::EmptyExperiment)?;

        let species = |role: SpeciesRole| {
            measurement
                .species_by_role(role)
                .map(|s| Species::new(s.id.clone(), s.id.clone(), role))
        };
        let or_default =
            |role: SpeciesRole| species(role).unwrap_or_else(|| Species::new(role.symbol(), role.symbol(), role));

        Ok(Self {
            substrate: or_default(SpeciesRole::Substrate),
            product: or_default(SpeciesRole::Product),
            catalyst: or_default(SpeciesRole::Catalyst),
            inhibitor: species(SpeciesRole::Inhibitor),
        })
    }

    /// All species of the reaction
    pub fn species(&self) -> Vec<Species> {
        let mut species = vec![
            self.substrate.clone(),
            self.product.clone(),
            self.catalyst.clone(),
        ];
        species.extend(self.inhibitor.clone());
        species
    }
}

/// Expands a library into reaction systems, in enumeration order.
///
/// Each substrate law yields one system without catalyst dynamics followed by one
/// system per catalyst law. Every rate law is compiled once and shared between the
/// systems using it.
pub fn enumerate(
    base: &BaseReaction,
    library: &RateLawLibrary,
    guesses: &InitialGuesses,
) -> Result<Vec<ReactionSystem>, FitError> {
    if library.substrate.is_empty() {
        return Err(FitError::EmptyCandidateSet);
    }

    let catalyst_laws = library
        .catalyst
        .iter()
        .map(|law| Ok((law.name.clone(), Arc::new(law.compile()?))))
        .collect::<Result<Vec<_>, FitError>>()?;

    let catalyst_species = vec![base.catalyst.clone(), base.catalyst.inactivated()];

    let mut systems = Vec::new();
    for substrate_law in library.substrate.iter() {
        let law = Arc::new(substrate_law.compile()?);
        let substrate_reaction = || -> Result<Reaction, FitError> {
            let model = KineticModel::from_law(&substrate_law.name, Arc::clone(&law), guesses)?;
            Reaction::new(model, base.species())
        };

        systems.push(ReactionSystem::new(vec![substrate_reaction()?])?);

        for (name, catalyst_law) in catalyst_laws.iter() {
            let model = KineticModel::from_law(name, Arc::clone(catalyst_law), guesses)?;
            let catalyst_reaction = Reaction::new(model, catalyst_species.clone())?;
            systems.push(ReactionSystem::new(vec![
                substrate_reaction()?,
                catalyst_reaction,
            ])?);
        }
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = systems.iter().find(|s| !seen.insert(s.name())) {
        return Err(FitError::SystemAssembly(format!(
            "duplicate system name '{}'",
            duplicate.name()
        )));
    }

    Ok(systems)
}

/// Fits every candidate system against one prepared data set
#[derive(Debug, Clone)]
pub struct FitOrchestrator<S: ODEIntegrator + Copy = RKF45> {
    base: BaseReaction,
    library: RateLawLibrary,
    data: PreparedData,
    guesses: InitialGuesses,
    config: FitConfig,
    solver: S,
    systems: Vec<ReactionSystem>,
}

impl FitOrchestrator {
    /// Sets up the candidate systems with the adaptive RKF45 integrator configured by
    /// `config.simulation` and initial guesses derived from `data`
    pub fn new(
        base: BaseReaction,
        library: RateLawLibrary,
        data: PreparedData,
        config: FitConfig,
    ) -> Result<Self, FitError> {
        let solver = config.simulation.rkf45();
        Self::with_solver(base, library, data, config, solver)
    }
}

impl<S: ODEIntegrator + Copy> FitOrchestrator<S> {
    /// Sets up the candidate systems with a custom integrator
    pub fn with_solver(
        base: BaseReaction,
        library: RateLawLibrary,
        data: PreparedData,
        config: FitConfig,
        solver: S,
    ) -> Result<Self, FitError> {
        let guesses = data.initial_guesses()?;
        let systems = enumerate(&base, &library, &guesses)?;

        info!(
            "Enumerated {} candidate systems from {} substrate and {} catalyst laws",
            systems.len(),
            library.substrate.len(),
            library.catalyst.len()
        );

        Ok(Self {
            base,
            library,
            data,
            guesses,
            config,
            solver,
            systems,
        })
    }

    /// Replaces the data-derived initial guesses and re-enumerates the systems,
    /// discarding earlier results
    pub fn with_guesses(mut self, guesses: InitialGuesses) -> Result<Self, FitError> {
        self.systems = enumerate(&self.base, &self.library, &guesses)?;
        self.guesses = guesses;
        Ok(self)
    }

    pub fn systems(&self) -> &[ReactionSystem] {
        &self.systems
    }

    pub fn system(&self, name: &str) -> Option<&ReactionSystem> {
        self.systems.iter().find(|s| s.name() == name)
    }

    pub fn data(&self) -> &PreparedData {
        &self.data
    }

    pub fn guesses(&self) -> &InitialGuesses {
        &self.guesses
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn base(&self) -> &BaseReaction {
        &self.base
    }

    /// Fits every system in enumeration order and ranks them.
    ///
    /// A system whose fit fails numerically is recorded as unsuccessful and does not
    /// stop the remaining fits.
    pub fn fit_all(&mut self) -> Result<Ranking, FitError> {
        for system in self.systems.iter_mut() {
            system.fit(&self.data, &[], &self.config, self.solver)?;
        }

        let ranking = self.ranking();
        log_ranking(&ranking);
        Ok(ranking)
    }

    /// Freezes `fixed` at the values fitted for `reference` and refits every other
    /// system with them.
    ///
    /// # Errors
    ///
    /// [`FitError::UnknownSystem`] if there is no system called `reference`,
    /// [`FitError::ReferenceNotFitted`] if its last fit was not successful, and
    /// [`ParameterError::UnknownParameter`] if it has no parameter of a fixed name.
    pub fn refit_with_fixed(
        &mut self,
        reference: &str,
        fixed: &[ParameterName],
    ) -> Result<Ranking, FitError> {
        let result = self
            .system(reference)
            .ok_or_else(|| FitError::UnknownSystem(reference.to_string()))?
            .result()
            .filter(|r| r.success)
            .ok_or_else(|| FitError::ReferenceNotFitted(reference.to_string()))?;

        let pins = fixed
            .iter()
            .map(|&name| {
                result
                    .value(name)
                    .map(|value| (name, value))
                    .ok_or(ParameterError::UnknownParameter(name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("Refitting with {:?} fixed to the values of '{}'", pins, reference);

        for system in self.systems.iter_mut().filter(|s| s.name() != reference) {
            for &(name, value) in pins.iter() {
                system.set_parameter_value(name, value)?;
            }
            system.fit(&self.data, fixed, &self.config, self.solver)?;
        }

        let ranking = self.ranking();
        log_ranking(&ranking);
        Ok(ranking)
    }

    /// Systems ordered by AIC, unsuccessful and unfitted systems last
    pub fn ranking(&self) -> Ranking {
        Ranking::from_systems(&self.systems)
    }

    /// Result of every fitted system, keyed by system name
    pub fn results(&self) -> BTreeMap<&str, &FitResult> {
        self.systems
            .iter()
            .filter_map(|s| s.result().map(|r| (s.name(), r)))
            .collect()
    }
}

fn log_ranking(ranking: &Ranking) {
    match ranking.best() {
        Some(best) => info!("Best system: '{}'", best.name),
        None => warn!("No candidate system could be fitted"),
    }
}

/// One row of a [`Ranking`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSystem {
    pub name: String,
    pub success: bool,
    pub aic: Option<f64>,
    /// AIC difference to the best successful system
    pub delta_aic: Option<f64>,
    pub bic: Option<f64>,
    pub rmsd: Option<f64>,
    /// Number of varied parameters
    pub nvarys: Option<usize>,
}

/// Reaction systems ordered by ascending AIC.
///
/// The sort is stable, so systems with equal AIC keep their enumeration order.
/// Unsuccessful or unfitted systems come last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub entries: Vec<RankedSystem>,
}

impl Ranking {
    pub fn from_systems<'a>(systems: impl IntoIterator<Item = &'a ReactionSystem>) -> Self {
        let mut entries: Vec<RankedSystem> = systems
            .into_iter()
            .map(|system| match system.result() {
                Some(result) => RankedSystem {
                    name: system.name().to_string(),
                    success: result.success,
                    aic: result.aic,
                    delta_aic: None,
                    bic: result.bic,
                    rmsd: result.rmsd,
                    nvarys: Some(result.report.nvarys),
                },
                None => RankedSystem {
                    name: system.name().to_string(),
                    success: false,
                    aic: None,
                    delta_aic: None,
                    bic: None,
                    rmsd: None,
                    nvarys: None,
                },
            })
            .collect();

        entries.sort_by_key(|e| (!e.success, OrderedFloat(e.aic.unwrap_or(f64::INFINITY))));

        let best = entries.first().filter(|e| e.success).and_then(|e| e.aic);
        if let Some(best) = best {
            for entry in entries.iter_mut().filter(|e| e.success) {
                entry.delta_aic = entry.aic.map(|aic| aic - best);
            }
        }

        Self { entries }
    }

    /// System names, best first
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// The best successful system
    pub fn best(&self) -> Option<&RankedSystem> {
        self.entries.first().filter(|e| e.success)
    }

    pub fn get(&self, name: &str) -> Option<&RankedSystem> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Zero-based rank of a system
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Prepares an experiment, enumerates the library and fits every candidate system.
///
/// Structural problems with the data or the library abort before any fit starts.
pub fn fit_experiment(
    experiment: &Experiment,
    library: RateLawLibrary,
    preparation: &PreparationConfig,
    config: FitConfig,
) -> Result<FitOrchestrator, FitError> {
    let data = prepare(experiment, preparation)?;
    let base = BaseReaction::from_experiment(experiment)?;

    let mut orchestrator = FitOrchestrator::new(base, library, data, config)?;
    orchestrator.fit_all()?;

    Ok(orchestrator)
}
