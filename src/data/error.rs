use thiserror::Error;

use crate::species::SpeciesRole;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Experiment contains no measurements")]
    EmptyExperiment,
    #[error("Measurements disagree on {quantity}: '{expected}' in '{reference}' vs '{found}' in '{measurement}'")]
    InconsistentUnits {
        quantity: String,
        reference: String,
        expected: String,
        measurement: String,
        found: String,
    },
    #[error("Replicates of measurement '{0}' do not share a common time grid")]
    InconsistentTimeGrid(String),
    #[error("Negative {role} concentration {value} in measurement '{measurement}'")]
    NegativeConcentration {
        measurement: String,
        role: SpeciesRole,
        value: f64,
    },
    #[error("Measured species {role} has no replicate data in measurement '{measurement}'")]
    MissingMeasuredSpecies {
        measurement: String,
        role: SpeciesRole,
    },
    #[error("Measurement '{measurement}' has no {role} entry to take the initial concentration from")]
    MissingInitialConcentration {
        measurement: String,
        role: SpeciesRole,
    },
    #[error("Measured species must be substrate or product, got {0}")]
    UnsupportedMeasuredSpecies(SpeciesRole),
    #[error("Replicate in measurement '{measurement}' has {time} time points but {data} values")]
    LengthMismatch {
        measurement: String,
        time: usize,
        data: usize,
    },
    #[error("Samples have differing numbers of time points: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("Time window [{0}, {1}] leaves no data")]
    EmptyTimeWindow(f64, f64),
    #[error("Prepared data has no time points")]
    NoTimePoints,
    #[error("All samples were dropped because of non-finite values")]
    NoFiniteSamples,
    #[error("Unknown time unit '{0}'")]
    UnknownTimeUnit(String),
}
