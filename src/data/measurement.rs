//! The experiment record handed to the fitter.
//!
//! An [`Experiment`] groups [`Measurement`]s; each measurement holds one
//! [`MeasurementSpecies`] entry per species with its initial concentration and zero or
//! more [`Replicate`] time-courses. The fitter never mutates these records.

use std::fmt::{self, Display};
use std::str::FromStr;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::species::SpeciesRole;

use super::error::DataError;

/// Time unit of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[serde(alias = "s")]
    Seconds,
    #[default]
    #[serde(alias = "min")]
    Minutes,
    #[serde(alias = "h")]
    Hours,
}

impl TimeUnit {
    /// Number of this unit in one minute
    pub fn per_minute(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 60.0,
            TimeUnit::Minutes => 1.0,
            TimeUnit::Hours => 1.0 / 60.0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Ok(TimeUnit::Seconds),
            "min" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hr" | "hour" | "hours" => Ok(TimeUnit::Hours),
            other => Err(DataError::UnknownTimeUnit(other.to_string())),
        }
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Seconds => write!(f, "s"),
            TimeUnit::Minutes => write!(f, "min"),
            TimeUnit::Hours => write!(f, "h"),
        }
    }
}

/// A single time-course of one species
#[derive(Debug, Clone, Serialize, Deserialize, Builder, Default, PartialEq)]
pub struct Replicate {
    #[builder(setter(into))]
    pub time: Vec<f64>,
    #[builder(setter(into))]
    pub data: Vec<f64>,
}

impl Replicate {
    pub fn new(time: Vec<f64>, data: Vec<f64>) -> Self {
        Self { time, data }
    }
}

/// One species within a measurement
#[derive(Debug, Clone, Serialize, Deserialize, Builder, PartialEq)]
pub struct MeasurementSpecies {
    /// Identifier of the species
    #[builder(setter(into))]
    pub id: String,

    pub role: SpeciesRole,

    /// Concentration unit label
    #[builder(setter(into))]
    pub unit: String,

    /// Initial concentration
    pub initial: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default, setter(into, each(name = "to_replicates")))]
    pub replicates: Vec<Replicate>,
}

/// Replicate time-courses recorded under identical conditions
#[derive(Debug, Clone, Serialize, Deserialize, Builder, PartialEq)]
pub struct Measurement {
    #[builder(setter(into))]
    pub id: String,

    pub ph: f64,

    pub temperature: f64,

    #[builder(setter(into))]
    pub temperature_unit: String,

    #[builder(default)]
    pub time_unit: TimeUnit,

    /// Measurement-wide time vector. When present it must agree with every replicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(into, strip_option))]
    pub time: Option<Vec<f64>>,

    #[builder(default, setter(into, each(name = "to_species")))]
    pub species: Vec<MeasurementSpecies>,
}

impl Measurement {
    /// Species entry playing the given role
    pub fn species_by_role(&self, role: SpeciesRole) -> Option<&MeasurementSpecies> {
        self.species.iter().find(|s| s.role == role)
    }

    /// Initial concentration of the given role, zero if the species is absent
    pub fn initial(&self, role: SpeciesRole) -> f64 {
        self.species_by_role(role).map(|s| s.initial).unwrap_or(0.0)
    }
}

/// An ordered list of measurements of the same measured species
#[derive(Debug, Clone, Serialize, Deserialize, Builder, PartialEq)]
pub struct Experiment {
    #[builder(setter(into))]
    pub name: String,

    /// The species whose concentration was recorded, substrate or product
    pub measured_species: SpeciesRole,

    #[builder(default)]
    pub time_unit: TimeUnit,

    #[builder(default, setter(into, each(name = "to_measurements")))]
    pub measurements: Vec<Measurement>,
}

impl Experiment {
    /// Whether any measurement carries a non-zero inhibitor concentration
    pub fn has_inhibitor(&self) -> bool {
        self.measurements
            .iter()
            .any(|m| m.initial(SpeciesRole::Inhibitor) > 0.0)
    }
}
