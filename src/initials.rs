//! Starting values and search windows for the kinetic parameters.
//!
//! Guesses are derived from the prepared data alone:
//!
//! - `k_cat`: steepest observed substrate slope divided by the enzyme concentration
//! - `K_m`: half of the largest initial substrate concentration
//! - `K_ic`, `K_iu`: same as `K_m`
//! - `K_ie`: rate constant of a 60 minute half-life, expressed in the data's time unit
//!
//! Bounds are multiplicative windows around each guess.

use std::collections::BTreeMap;
use std::f64::consts::LN_2;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data::measurement::TimeUnit;
use crate::parameter::ParameterName;

/// Half-life prior of the enzyme inactivation, in minutes
pub const DEFAULT_HALF_LIFE_MINUTES: f64 = 60.0;

/// Used when the data show no substrate turnover at all
const FALLBACK_K_CAT: f64 = 1e-6;
/// Used when every initial substrate concentration is zero
const FALLBACK_K_M: f64 = 1.0;

/// A starting value with its admissible interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialGuess {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl InitialGuess {
    /// Builds the window `[value / below, value * above]`
    pub fn windowed(value: f64, below: f64, above: f64) -> Self {
        Self {
            value,
            lower: value / below,
            upper: value * above,
        }
    }
}

/// Multiplicative window `(below, above)` used for each parameter
pub fn bound_window(name: ParameterName) -> (f64, f64) {
    match name {
        ParameterName::KCat => (100.0, 10.0),
        ParameterName::Km => (1000.0, 10.0),
        ParameterName::Kic => (100.0, 5.0),
        ParameterName::Kiu => (100.0, 10.0),
        ParameterName::Kie => (50.0, 50.0),
    }
}

/// Initial guesses for every known kinetic parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialGuesses {
    guesses: BTreeMap<ParameterName, InitialGuess>,
}

impl InitialGuesses {
    /// Creates guesses from point values, applying the standard bound windows
    pub fn from_values(values: impl IntoIterator<Item = (ParameterName, f64)>) -> Self {
        let guesses = values
            .into_iter()
            .map(|(name, value)| {
                let (below, above) = bound_window(name);
                (name, InitialGuess::windowed(value, below, above))
            })
            .collect();

        Self { guesses }
    }

    /// Derives guesses from stacked substrate data.
    ///
    /// # Arguments
    ///
    /// * `substrate` - Substrate concentrations, one row per sample
    /// * `time` - Time points matching `substrate`
    /// * `enzyme` - Initial enzyme concentration of each sample
    /// * `initial_substrate` - Initial substrate concentration of each sample
    /// * `time_unit` - Unit of `time`
    pub fn from_data(
        substrate: &Array2<f64>,
        time: &Array2<f64>,
        enzyme: &Array1<f64>,
        initial_substrate: &Array1<f64>,
        time_unit: TimeUnit,
    ) -> Self {
        let k_cat = estimate_k_cat(substrate, time, enzyme);
        let k_m = estimate_k_m(initial_substrate);
        let k_ie = LN_2 / (DEFAULT_HALF_LIFE_MINUTES * time_unit.per_minute());

        Self::from_values([
            (ParameterName::KCat, k_cat),
            (ParameterName::Km, k_m),
            (ParameterName::Kic, k_m),
            (ParameterName::Kiu, k_m),
            (ParameterName::Kie, k_ie),
        ])
    }

    pub fn get(&self, name: ParameterName) -> Option<&InitialGuess> {
        self.guesses.get(&name)
    }

    /// Replaces the guess of a single parameter
    pub fn set(&mut self, name: ParameterName, guess: InitialGuess) {
        self.guesses.insert(name, guess);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterName, &InitialGuess)> {
        self.guesses.iter()
    }
}

impl Default for InitialGuesses {
    /// Unit guesses, useful when only simulating
    fn default() -> Self {
        Self::from_values(ParameterName::ALL.map(|name| (name, 1.0)))
    }
}

/// Largest absolute finite slope per unit enzyme over all samples and intervals
fn estimate_k_cat(substrate: &Array2<f64>, time: &Array2<f64>, enzyme: &Array1<f64>) -> f64 {
    let mut best = 0.0_f64;

    for ((s_row, t_row), e0) in substrate
        .outer_iter()
        .zip(time.outer_iter())
        .zip(enzyme.iter())
    {
        for i in 1..s_row.len() {
            let rate = ((s_row[i] - s_row[i - 1]) / (t_row[i] - t_row[i - 1])).abs() / e0;
            if rate.is_finite() && rate > best {
                best = rate;
            }
        }
    }

    if best > 0.0 {
        best
    } else {
        FALLBACK_K_CAT
    }
}

fn estimate_k_m(initial_substrate: &Array1<f64>) -> f64 {
    let max = initial_substrate
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(0.0_f64, f64::max);

    if max > 0.0 {
        max / 2.0
    } else {
        FALLBACK_K_M
    }
}
