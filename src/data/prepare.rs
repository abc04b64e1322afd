//! Turns an [`Experiment`] into the dense arrays consumed by the fitter.
//!
//! Every replicate of the measured species becomes one sample row. Rows of all arrays
//! line up: `substrate[i]`, `product[i]`, `enzyme[i]`, `inhibitor[i]` and `time[i]`
//! describe the same replicate. When the measured species is the product, substrate
//! is derived as `initial_substrate - product` and vice versa.

use derive_builder::Builder;
use log::{debug, warn};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::initials::InitialGuesses;
use crate::species::{SpeciesRole, N_STATES};

use super::error::DataError;
use super::measurement::{Experiment, Measurement, TimeUnit};
use super::validation::check_experiment;

/// Options for [`prepare`]
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct PreparationConfig {
    /// Restricts the time axis to `[t_min, t_max]`
    #[builder(default, setter(strip_option))]
    pub time_window: Option<(f64, f64)>,

    /// Drops samples carrying NaN or infinite values instead of failing the fit
    #[builder(default = "true")]
    pub drop_non_finite: bool,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            time_window: None,
            drop_non_finite: true,
        }
    }
}

/// Stacked, aligned sample arrays indexed by (sample, time)
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedData {
    pub substrate: Array2<f64>,
    pub product: Array2<f64>,
    pub enzyme: Array2<f64>,
    pub inhibitor: Array2<f64>,
    pub time: Array2<f64>,
    /// Substrate concentration at the start of each sample's measurement
    pub initial_substrate: Array1<f64>,
    /// `<measurement id>#<replicate index>` of every kept sample
    pub sample_ids: Vec<String>,
    pub time_unit: TimeUnit,
    /// Samples removed because of non-finite values
    pub dropped: Vec<String>,
}

impl PreparedData {
    pub fn n_samples(&self) -> usize {
        self.substrate.nrows()
    }

    pub fn n_points(&self) -> usize {
        self.substrate.ncols()
    }

    /// First column of the substrate, enzyme and product series, one row per sample
    pub fn initial_conditions(&self) -> Result<Array2<f64>, DataError> {
        let mut initials = Array2::zeros((self.n_samples(), N_STATES));
        initials.column_mut(0).assign(&first_column(&self.substrate)?);
        initials.column_mut(1).assign(&first_column(&self.enzyme)?);
        initials.column_mut(2).assign(&first_column(&self.product)?);
        Ok(initials)
    }

    /// Inhibitor concentration of each sample
    pub fn inhibitor_levels(&self) -> Result<Array1<f64>, DataError> {
        first_column(&self.inhibitor)
    }

    /// Whether any sample carries inhibitor
    pub fn has_inhibitor(&self) -> bool {
        self.inhibitor.iter().any(|&i| i > 0.0)
    }

    /// Derives starting values and bounds for all kinetic parameters
    pub fn initial_guesses(&self) -> Result<InitialGuesses, DataError> {
        Ok(InitialGuesses::from_data(
            &self.substrate,
            &self.time,
            &first_column(&self.enzyme)?,
            &self.initial_substrate,
            self.time_unit,
        ))
    }
}

fn first_column(series: &Array2<f64>) -> Result<Array1<f64>, DataError> {
    if series.ncols() == 0 {
        return Err(DataError::NoTimePoints);
    }
    Ok(series.column(0).to_owned())
}

/// A single replicate before stacking
struct Sample {
    id: String,
    time: Vec<f64>,
    measured: Vec<f64>,
    initial_substrate: f64,
    enzyme: f64,
    inhibitor: f64,
}

/// Validates an experiment and stacks its replicates into [`PreparedData`].
///
/// # Errors
///
/// Returns the structural errors of [`check_experiment`], plus
/// [`DataError::MissingInitialConcentration`] when product is measured without a
/// substrate entry, [`DataError::EmptyTimeWindow`], [`DataError::ShapeMismatch`] when
/// samples end up with different numbers of time points, [`DataError::NoFiniteSamples`]
/// and [`DataError::NegativeConcentration`].
pub fn prepare(
    experiment: &Experiment,
    config: &PreparationConfig,
) -> Result<PreparedData, DataError> {
    check_experiment(experiment)?;

    let measured = experiment.measured_species;
    let mut samples = Vec::new();
    for measurement in experiment.measurements.iter() {
        samples.extend(collect_samples(measurement, measured)?);
    }

    if let Some((t_min, t_max)) = config.time_window {
        samples = samples
            .into_iter()
            .map(|s| apply_time_window(s, t_min, t_max))
            .collect::<Result<_, _>>()?;
    }

    let mut dropped = Vec::new();
    if config.drop_non_finite {
        let (kept, removed): (Vec<_>, Vec<_>) = samples.into_iter().partition(|s| {
            s.time.iter().chain(s.measured.iter()).all(|v| v.is_finite())
        });

        for sample in removed {
            warn!("Dropping sample '{}' because of non-finite values", sample.id);
            dropped.push(sample.id);
        }

        if kept.is_empty() {
            return Err(DataError::NoFiniteSamples);
        }
        samples = kept;
    }

    let prepared = stack(samples, measured, experiment.time_unit, dropped)?;
    check_non_negative(&prepared)?;

    debug!(
        "Prepared {} samples with {} time points each",
        prepared.n_samples(),
        prepared.n_points()
    );

    Ok(prepared)
}

fn collect_samples(
    measurement: &Measurement,
    measured: SpeciesRole,
) -> Result<Vec<Sample>, DataError> {
    if measurement.species_by_role(SpeciesRole::Substrate).is_none() {
        return Err(DataError::MissingInitialConcentration {
            measurement: measurement.id.clone(),
            role: SpeciesRole::Substrate,
        });
    }

    let species = measurement
        .species_by_role(measured)
        .ok_or_else(|| DataError::MissingMeasuredSpecies {
            measurement: measurement.id.clone(),
            role: measured,
        })?;

    let samples = species
        .replicates
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.data.is_empty())
        .map(|(i, replicate)| Sample {
            id: format!("{}#{}", measurement.id, i),
            time: replicate.time.clone(),
            measured: replicate.data.clone(),
            initial_substrate: measurement.initial(SpeciesRole::Substrate),
            enzyme: measurement.initial(SpeciesRole::Catalyst),
            inhibitor: measurement.initial(SpeciesRole::Inhibitor),
        })
        .collect();

    Ok(samples)
}

fn apply_time_window(sample: Sample, t_min: f64, t_max: f64) -> Result<Sample, DataError> {
    let (time, measured): (Vec<f64>, Vec<f64>) = sample
        .time
        .iter()
        .zip(sample.measured.iter())
        .filter(|(t, _)| (t_min..=t_max).contains(*t))
        .map(|(t, v)| (*t, *v))
        .unzip();

    if time.is_empty() {
        return Err(DataError::EmptyTimeWindow(t_min, t_max));
    }

    Ok(Sample {
        time,
        measured,
        ..sample
    })
}

fn stack(
    samples: Vec<Sample>,
    measured: SpeciesRole,
    time_unit: TimeUnit,
    dropped: Vec<String>,
) -> Result<PreparedData, DataError> {
    let n_points = samples.first().map(|s| s.time.len()).unwrap_or(0);
    if let Some(other) = samples.iter().find(|s| s.time.len() != n_points) {
        return Err(DataError::ShapeMismatch {
            expected: n_points,
            found: other.time.len(),
        });
    }

    let n_samples = samples.len();
    let mut measured_array = Array2::zeros((n_samples, n_points));
    let mut time = Array2::zeros((n_samples, n_points));
    let mut enzyme = Array2::zeros((n_samples, n_points));
    let mut inhibitor = Array2::zeros((n_samples, n_points));
    let mut initial_substrate = Array1::zeros(n_samples);

    for (i, sample) in samples.iter().enumerate() {
        measured_array
            .row_mut(i)
            .assign(&Array1::from_vec(sample.measured.clone()));
        time.row_mut(i).assign(&Array1::from_vec(sample.time.clone()));
        enzyme.row_mut(i).fill(sample.enzyme);
        inhibitor.row_mut(i).fill(sample.inhibitor);
        initial_substrate[i] = sample.initial_substrate;
    }

    let derived = match measured {
        SpeciesRole::Product => product_to_substrate(&measured_array, &initial_substrate),
        _ => substrate_to_product(&measured_array, &initial_substrate),
    };

    let (substrate, product) = match measured {
        SpeciesRole::Product => (derived, measured_array),
        _ => (measured_array, derived),
    };

    Ok(PreparedData {
        substrate,
        product,
        enzyme,
        inhibitor,
        time,
        initial_substrate,
        sample_ids: samples.into_iter().map(|s| s.id).collect(),
        time_unit,
        dropped,
    })
}

/// Derives substrate from product via `initial_substrate - product`, row by row
pub fn product_to_substrate(product: &Array2<f64>, initial_substrate: &Array1<f64>) -> Array2<f64> {
    let s0 = initial_substrate.view().insert_axis(Axis(1));
    &s0 - product
}

/// Derives product from substrate via `initial_substrate - substrate`, row by row
pub fn substrate_to_product(
    substrate: &Array2<f64>,
    initial_substrate: &Array1<f64>,
) -> Array2<f64> {
    let s0 = initial_substrate.view().insert_axis(Axis(1));
    &s0 - substrate
}

fn check_non_negative(prepared: &PreparedData) -> Result<(), DataError> {
    let series = [
        (SpeciesRole::Substrate, &prepared.substrate),
        (SpeciesRole::Product, &prepared.product),
    ];

    for (role, array) in series {
        for (row, values) in array.axis_iter(Axis(0)).enumerate() {
            if let Some(value) = values.iter().find(|v| **v < 0.0) {
                return Err(DataError::NegativeConcentration {
                    measurement: prepared.sample_ids[row].clone(),
                    role,
                    value: *value,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::measurement::{
        ExperimentBuilder, MeasurementBuilder, MeasurementSpeciesBuilder, Replicate,
    };
    use ndarray::array;

    fn measurement(id: &str, s0: f64, measured: SpeciesRole, data: Vec<Vec<f64>>) -> Measurement {
        let time = vec![0.0, 1.0, 2.0, 3.0];
        let mut builder = MeasurementBuilder::default();
        builder
            .id(id)
            .ph(7.0)
            .temperature(25.0)
            .temperature_unit("C");

        let mut substrate = MeasurementSpeciesBuilder::default();
        substrate
            .id("s0")
            .role(SpeciesRole::Substrate)
            .unit("mM")
            .initial(s0);

        let mut product = MeasurementSpeciesBuilder::default();
        product
            .id("p0")
            .role(SpeciesRole::Product)
            .unit("mM")
            .initial(0.0);

        let target = match measured {
            SpeciesRole::Product => &mut product,
            _ => &mut substrate,
        };
        for d in data {
            target.to_replicates(Replicate::new(time.clone(), d));
        }

        builder
            .to_species(substrate.build().unwrap())
            .to_species(product.build().unwrap())
            .to_species(
                MeasurementSpeciesBuilder::default()
                    .id("e0")
                    .role(SpeciesRole::Catalyst)
                    .unit("uM")
                    .initial(0.5)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn experiment(measured: SpeciesRole, measurements: Vec<Measurement>) -> Experiment {
        ExperimentBuilder::default()
            .name("prep")
            .measured_species(measured)
            .measurements(measurements)
            .build()
            .unwrap()
    }

    #[test]
    fn test_stacks_replicates_and_broadcasts_scalars() {
        let exp = experiment(
            SpeciesRole::Substrate,
            vec![
                measurement(
                    "m0",
                    4.0,
                    SpeciesRole::Substrate,
                    vec![vec![4.0, 3.0, 2.0, 1.0], vec![4.0, 3.5, 2.5, 1.5]],
                ),
                measurement("m1", 8.0, SpeciesRole::Substrate, vec![vec![8.0, 6.0, 4.0, 2.0]]),
            ],
        );

        let prepared = prepare(&exp, &PreparationConfig::default()).unwrap();

        assert_eq!(prepared.n_samples(), 3);
        assert_eq!(prepared.n_points(), 4);
        assert_eq!(prepared.sample_ids, vec!["m0#0", "m0#1", "m1#0"]);
        assert_eq!(prepared.initial_substrate, array![4.0, 4.0, 8.0]);
        assert_eq!(prepared.product.row(2), array![0.0, 2.0, 4.0, 6.0]);
        assert!(prepared.enzyme.iter().all(|&e| e == 0.5));
        assert!(!prepared.has_inhibitor());
        assert_eq!(
            prepared.initial_conditions().unwrap().row(0),
            array![4.0, 0.5, 0.0]
        );
    }

    #[test]
    fn test_product_measurement_is_converted() {
        let exp = experiment(
            SpeciesRole::Product,
            vec![measurement(
                "m0",
                4.0,
                SpeciesRole::Product,
                vec![vec![0.0, 1.0, 2.0, 3.0]],
            )],
        );

        let prepared = prepare(&exp, &PreparationConfig::default()).unwrap();
        assert_eq!(prepared.substrate.row(0), array![4.0, 3.0, 2.0, 1.0]);
        assert_eq!(prepared.product.row(0), array![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_non_finite_samples_are_dropped() {
        let exp = experiment(
            SpeciesRole::Substrate,
            vec![measurement(
                "m0",
                4.0,
                SpeciesRole::Substrate,
                vec![vec![4.0, f64::NAN, 2.0, 1.0], vec![4.0, 3.0, 2.0, 1.0]],
            )],
        );

        let prepared = prepare(&exp, &PreparationConfig::default()).unwrap();
        assert_eq!(prepared.n_samples(), 1);
        assert_eq!(prepared.dropped, vec!["m0#0"]);
    }

    #[test]
    fn test_only_non_finite_samples() {
        let exp = experiment(
            SpeciesRole::Substrate,
            vec![measurement(
                "m0",
                4.0,
                SpeciesRole::Substrate,
                vec![vec![4.0, f64::INFINITY, 2.0, 1.0]],
            )],
        );
        assert_eq!(
            prepare(&exp, &PreparationConfig::default()),
            Err(DataError::NoFiniteSamples)
        );
    }

    #[test]
    fn test_negative_concentration() {
        let exp = experiment(
            SpeciesRole::Product,
            vec![measurement(
                "m0",
                2.0,
                SpeciesRole::Product,
                vec![vec![0.0, 1.0, 2.0, 3.0]],
            )],
        );
        assert!(matches!(
            prepare(&exp, &PreparationConfig::default()),
            Err(DataError::NegativeConcentration {
                role: SpeciesRole::Substrate,
                ..
            })
        ));
    }

    #[test]
    fn test_time_window() {
        let exp = experiment(
            SpeciesRole::Substrate,
            vec![measurement(
                "m0",
                4.0,
                SpeciesRole::Substrate,
                vec![vec![4.0, 3.0, 2.0, 1.0]],
            )],
        );

        let config = PreparationConfigBuilder::default()
            .time_window((1.0, 2.0))
            .build()
            .unwrap();
        let prepared = prepare(&exp, &config).unwrap();
        assert_eq!(prepared.time.row(0), array![1.0, 2.0]);
        assert_eq!(prepared.substrate.row(0), array![3.0, 2.0]);

        let config = PreparationConfigBuilder::default()
            .time_window((10.0, 20.0))
            .build()
            .unwrap();
        assert_eq!(
            prepare(&exp, &config),
            Err(DataError::EmptyTimeWindow(10.0, 20.0))
        );
    }

    #[test]
    fn test_data_without_time_points() {
        let empty = Array2::zeros((2, 0));
        let prepared = PreparedData {
            substrate: empty.clone(),
            product: empty.clone(),
            enzyme: empty.clone(),
            inhibitor: empty.clone(),
            time: empty,
            initial_substrate: array![1.0, 2.0],
            sample_ids: vec!["m0#0".to_string(), "m1#0".to_string()],
            time_unit: TimeUnit::default(),
            dropped: vec![],
        };

        assert_eq!(prepared.n_points(), 0);
        assert_eq!(prepared.initial_conditions(), Err(DataError::NoTimePoints));
        assert_eq!(prepared.inhibitor_levels(), Err(DataError::NoTimePoints));
        assert!(matches!(
            prepared.initial_guesses(),
            Err(DataError::NoTimePoints)
        ));
    }

    #[test]
    fn test_conversion_round_trip() {
        let substrate = array![[4.0, 3.5, 2.25], [8.0, 6.125, 0.5]];
        let s0 = array![4.0, 8.0];

        let product = substrate_to_product(&substrate, &s0);
        let back = product_to_substrate(&product, &s0);

        assert_eq!(back, substrate);
    }
}
