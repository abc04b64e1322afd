//! Structural checks run before any data is stacked or fitted.
//!
//! All measurements of an experiment must share pH, temperature, time unit and the
//! substrate concentration unit, every replicate must carry as many values as time
//! points, and all replicates within a measurement must share one time grid.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::species::SpeciesRole;

use super::error::DataError;
use super::measurement::{Experiment, Measurement};

/// Runs every structural check on an experiment.
///
/// # Errors
///
/// Returns the first violation found, in the order: empty experiment, unsupported
/// measured species, unit consistency, replicate lengths, time grids, missing data.
pub fn check_experiment(experiment: &Experiment) -> Result<(), DataError> {
    let reference = experiment
        .measurements
        .first()
        .ok_or(DataError::EmptyExperiment)?;

    if !matches!(
        experiment.measured_species,
        SpeciesRole::Substrate | SpeciesRole::Product
    ) {
        return Err(DataError::UnsupportedMeasuredSpecies(
            experiment.measured_species,
        ));
    }

    for measurement in experiment.measurements.iter() {
        check_units(experiment, reference, measurement)?;
        check_replicate_lengths(measurement)?;
        check_time_grid(measurement)?;
        check_measured_species(measurement, experiment.measured_species)?;
    }

    Ok(())
}

/// Compares the scalar conditions of a measurement against the reference measurement
fn check_units(
    experiment: &Experiment,
    reference: &Measurement,
    measurement: &Measurement,
) -> Result<(), DataError> {
    let mismatch = |quantity: &str, expected: String, found: String| DataError::InconsistentUnits {
        quantity: quantity.to_string(),
        reference: reference.id.clone(),
        expected,
        measurement: measurement.id.clone(),
        found,
    };

    if measurement.time_unit != experiment.time_unit {
        return Err(DataError::InconsistentUnits {
            quantity: "time unit".to_string(),
            reference: experiment.name.clone(),
            expected: experiment.time_unit.to_string(),
            measurement: measurement.id.clone(),
            found: measurement.time_unit.to_string(),
        });
    }

    if measurement.ph != reference.ph {
        return Err(mismatch(
            "pH",
            reference.ph.to_string(),
            measurement.ph.to_string(),
        ));
    }

    if measurement.temperature != reference.temperature
        || measurement.temperature_unit != reference.temperature_unit
    {
        return Err(mismatch(
            "temperature",
            format!("{} {}", reference.temperature, reference.temperature_unit),
            format!("{} {}", measurement.temperature, measurement.temperature_unit),
        ));
    }

    let unit_of = |m: &Measurement| {
        m.species_by_role(SpeciesRole::Substrate)
            .map(|s| s.unit.clone())
    };

    if let (Some(expected), Some(found)) = (unit_of(reference), unit_of(measurement)) {
        if expected != found {
            return Err(mismatch("substrate unit", expected, found));
        }
    }

    Ok(())
}

fn check_replicate_lengths(measurement: &Measurement) -> Result<(), DataError> {
    for species in measurement.species.iter() {
        for replicate in species.replicates.iter() {
            if replicate.time.len() != replicate.data.len() {
                return Err(DataError::LengthMismatch {
                    measurement: measurement.id.clone(),
                    time: replicate.time.len(),
                    data: replicate.data.len(),
                });
            }
        }
    }

    Ok(())
}

/// Checks that all time vectors of a measurement are identical.
///
/// Each vector is hashed and the measurement passes if a single unique hash remains.
/// The measurement-wide time vector, when present, takes part in the comparison.
fn check_time_grid(measurement: &Measurement) -> Result<(), DataError> {
    let mut times: Vec<&Vec<f64>> = measurement
        .species
        .iter()
        .flat_map(|s| s.replicates.iter())
        .map(|r| &r.time)
        .collect();

    if let Some(global) = &measurement.time {
        times.push(global);
    }

    let unique_hashes: HashSet<_> = times
        .iter()
        .map(|time_vec| {
            let mut hasher = Sha256::new();
            for t in time_vec.iter() {
                hasher.update(t.to_le_bytes());
            }
            hasher.finalize()
        })
        .collect();

    if unique_hashes.len() > 1 {
        return Err(DataError::InconsistentTimeGrid(measurement.id.clone()));
    }

    Ok(())
}

fn check_measured_species(measurement: &Measurement, role: SpeciesRole) -> Result<(), DataError> {
    let has_data = measurement
        .species_by_role(role)
        .is_some_and(|s| s.replicates.iter().any(|r| !r.data.is_empty()));

    if !has_data {
        return Err(DataError::MissingMeasuredSpecies {
            measurement: measurement.id.clone(),
            role,
        });
    }

    Ok(())
}
