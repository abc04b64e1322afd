//! Kinetic parameters and the per-model parameter registry.
//!
//! The registry is the single place where fitted values, standard errors and
//! correlations end up. It is written by [`ReactionSystem::fit`](crate::system::ReactionSystem::fit)
//! only; everything else reads it.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kinetic constants a rate law may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParameterName {
    /// Turnover number
    #[serde(rename = "k_cat")]
    KCat,
    /// Michaelis constant
    #[serde(rename = "K_m")]
    Km,
    /// Competitive inhibition constant
    #[serde(rename = "K_ic")]
    Kic,
    /// Uncompetitive inhibition constant
    #[serde(rename = "K_iu")]
    Kiu,
    /// First-order enzyme inactivation rate constant
    #[serde(rename = "K_ie")]
    Kie,
}

impl ParameterName {
    pub const ALL: [ParameterName; 5] = [
        ParameterName::KCat,
        ParameterName::Km,
        ParameterName::Kic,
        ParameterName::Kiu,
        ParameterName::Kie,
    ];

    /// Symbol used inside rate-law expressions
    pub fn symbol(&self) -> &'static str {
        match self {
            ParameterName::KCat => "k_cat",
            ParameterName::Km => "K_m",
            ParameterName::Kic => "K_ic",
            ParameterName::Kiu => "K_iu",
            ParameterName::Kie => "K_ie",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.symbol() == symbol)
    }
}

impl Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Parameter values keyed by name, as consumed by the ODE right-hand side
pub type ParameterValues = BTreeMap<ParameterName, f64>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Bounds of {name} must be finite, got [{lower}, {upper}]")]
    NonFiniteBounds {
        name: ParameterName,
        lower: f64,
        upper: f64,
    },
    #[error("Invalid bounds for {name}: lower ({lower}) must be less than upper ({upper})")]
    InvalidBounds {
        name: ParameterName,
        lower: f64,
        upper: f64,
    },
    #[error("Initial value {value} of {name} lies outside [{lower}, {upper}]")]
    InitialOutOfBounds {
        name: ParameterName,
        value: f64,
        lower: f64,
        upper: f64,
    },
    #[error("Unknown parameter {0}")]
    UnknownParameter(ParameterName),
}

/// A single kinetic parameter with its search window and fit outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KineticParameter {
    pub name: ParameterName,
    /// Opaque unit label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub initial_value: f64,
    pub lower: f64,
    pub upper: f64,
    /// Value after the last completed fit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<f64>,
    pub is_fixed: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub correlations: BTreeMap<ParameterName, f64>,
}

impl KineticParameter {
    /// Creates a parameter after checking `lower < upper`, finiteness and that the
    /// initial value lies within the bounds.
    pub fn new(
        name: ParameterName,
        initial_value: f64,
        lower: f64,
        upper: f64,
        is_fixed: bool,
    ) -> Result<Self, ParameterError> {
        if !lower.is_finite() || !upper.is_finite() {
            return Err(ParameterError::NonFiniteBounds { name, lower, upper });
        }
        if lower >= upper {
            return Err(ParameterError::InvalidBounds { name, lower, upper });
        }
        if !(lower..=upper).contains(&initial_value) {
            return Err(ParameterError::InitialOutOfBounds {
                name,
                value: initial_value,
                lower,
                upper,
            });
        }

        Ok(Self {
            name,
            unit: None,
            initial_value,
            lower,
            upper,
            value: None,
            stderr: None,
            is_fixed,
            correlations: BTreeMap::new(),
        })
    }

    /// Fitted value if available, initial value otherwise
    pub fn current_value(&self) -> f64 {
        self.value.unwrap_or(self.initial_value)
    }

    fn clear_fit(&mut self) {
        self.value = None;
        self.stderr = None;
        self.correlations.clear();
    }
}

/// One entry of the optimizer's parameter snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    pub name: ParameterName,
    /// Starting value for varying parameters, frozen value for fixed ones
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
    pub vary: bool,
}

/// Fitted quantities written back into a registry
#[derive(Debug, Clone, PartialEq)]
pub struct FittedParameter {
    pub value: f64,
    pub stderr: Option<f64>,
    pub correlations: BTreeMap<ParameterName, f64>,
}

/// Parameters of a kinetic model, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterRegistry {
    parameters: BTreeMap<ParameterName, KineticParameter>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any existing one with the same name
    pub fn add(
        &mut self,
        name: ParameterName,
        initial_value: f64,
        lower: f64,
        upper: f64,
        is_fixed: bool,
    ) -> Result<(), ParameterError> {
        let parameter = KineticParameter::new(name, initial_value, lower, upper, is_fixed)?;
        self.parameters.insert(name, parameter);
        Ok(())
    }

    pub fn get(&self, name: ParameterName) -> Option<&KineticParameter> {
        self.parameters.get(&name)
    }

    pub fn contains(&self, name: ParameterName) -> bool {
        self.parameters.contains_key(&name)
    }

    pub fn names(&self) -> impl Iterator<Item = ParameterName> + '_ {
        self.parameters.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KineticParameter> {
        self.parameters.values()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Adds the parameters of `other` that are not yet present
    pub fn merge(&mut self, other: &ParameterRegistry) {
        for (name, parameter) in other.parameters.iter() {
            self.parameters
                .entry(*name)
                .or_insert_with(|| parameter.clone());
        }
    }

    /// Current value of every parameter
    pub fn values(&self) -> ParameterValues {
        self.parameters
            .iter()
            .map(|(name, p)| (*name, p.current_value()))
            .collect()
    }

    /// Emits the ordered parameter list fed to the optimizer.
    ///
    /// Parameters listed in `fixed` or flagged `is_fixed` are frozen at their current
    /// value; all others start from their initial value so that repeated fits begin
    /// from the same point.
    pub fn snapshot_for_fit(&self, fixed: &[ParameterName]) -> Vec<ParameterSnapshot> {
        self.parameters
            .values()
            .map(|p| {
                let vary = !(p.is_fixed || fixed.contains(&p.name));
                ParameterSnapshot {
                    name: p.name,
                    value: if vary { p.initial_value } else { p.current_value() },
                    lower: p.lower,
                    upper: p.upper,
                    vary,
                }
            })
            .collect()
    }

    /// Writes fitted values and uncertainties back; names not present are ignored
    pub fn update_from_fit(&mut self, results: &BTreeMap<ParameterName, FittedParameter>) {
        for (name, fitted) in results {
            if let Some(parameter) = self.parameters.get_mut(name) {
                parameter.value = Some(fitted.value);
                parameter.stderr = fitted.stderr;
                parameter.correlations = fitted.correlations.clone();
            }
        }
    }

    /// Forgets the outcome of any previous fit
    pub fn clear_fit(&mut self) {
        self.parameters
            .values_mut()
            .for_each(KineticParameter::clear_fit);
    }

    /// Sets the current value of a parameter, e.g. to pin it to a reference fit
    pub fn set_value(&mut self, name: ParameterName, value: f64) -> Result<(), ParameterError> {
        let parameter = self
            .parameters
            .get_mut(&name)
            .ok_or(ParameterError::UnknownParameter(name))?;
        parameter.value = Some(value);
        parameter.stderr = None;
        parameter.correlations.clear();
        Ok(())
    }
}
