//! Per-system fit results.
//!
//! A [`FitResult`] is produced once per fit attempt and replaces the previous result of
//! its reaction system. Unsuccessful fits keep their raw report but carry no
//! information criteria, RMSD or standard errors.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::optim::metrics::root_mean_squared_deviation;
use crate::optim::report::FitReport;
use crate::optim::runner::FitOutcome;
use crate::parameter::{FittedParameter, ParameterName};

/// Relative distance to a bound below which a value counts as sitting on it
pub const AT_BOUND_RTOL: f64 = 1e-9;

/// Outcome for a single parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterResult {
    pub name: ParameterName,
    /// Final value; the frozen value for fixed parameters
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<f64>,
    pub vary: bool,
    /// Whether the value ended up on one of its bounds
    pub at_bound: bool,
    /// Correlation to every other varied parameter
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub correlations: BTreeMap<ParameterName, f64>,
}

/// Result of fitting one reaction system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub system: String,
    pub success: bool,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
    pub rmsd: Option<f64>,
    pub parameters: BTreeMap<ParameterName, ParameterResult>,
    /// A correlation coefficient fell outside `[-1, 1]`
    pub degenerate: bool,
    pub report: FitReport,
}

impl FitResult {
    /// Assembles the result of a finished least-squares run
    pub fn from_outcome(system: impl Into<String>, outcome: &FitOutcome) -> Self {
        let system = system.into();
        let success = outcome.report.success;

        let varying: Vec<ParameterName> = outcome.bounds.iter().map(|b| b.param).collect();
        let covariance = outcome.covariance.as_ref().filter(|_| success);
        let degenerate = covariance.is_some_and(|c| c.is_degenerate());

        if degenerate {
            warn!("Fit of '{}' has correlations outside [-1, 1]", system);
        }

        let parameters = outcome
            .names
            .iter()
            .zip(outcome.values.iter())
            .map(|(&name, &value)| {
                let index = varying.iter().position(|p| *p == name);
                let bound = index.map(|i| outcome.bounds[i]);

                let stderr = match (covariance, index) {
                    (Some(c), Some(i)) => c.stderr[i],
                    _ => None,
                };

                let correlations = match (covariance, index) {
                    (Some(c), Some(i)) => varying
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(j, other)| (*other, c.correlation[[i, j]]))
                        .collect(),
                    _ => BTreeMap::new(),
                };

                let result = ParameterResult {
                    name,
                    value,
                    stderr,
                    vary: index.is_some(),
                    at_bound: bound.is_some_and(|b| b.is_at_bound(value, AT_BOUND_RTOL)),
                    correlations,
                };
                (name, result)
            })
            .collect();

        let (aic, bic, rmsd) = if success {
            (
                Some(outcome.report.aic),
                Some(outcome.report.bic),
                outcome.residuals.as_ref().map(root_mean_squared_deviation),
            )
        } else {
            (None, None, None)
        };

        Self {
            system,
            success,
            aic,
            bic,
            rmsd,
            parameters,
            degenerate,
            report: outcome.report.clone(),
        }
    }

    pub fn parameter(&self, name: ParameterName) -> Option<&ParameterResult> {
        self.parameters.get(&name)
    }

    /// Value of a parameter, if the system has it
    pub fn value(&self, name: ParameterName) -> Option<f64> {
        self.parameter(name).map(|p| p.value)
    }

    /// Names of the parameters that were varied
    pub fn varied(&self) -> Vec<ParameterName> {
        self.parameters
            .values()
            .filter(|p| p.vary)
            .map(|p| p.name)
            .collect()
    }

    /// Values to write back into a parameter registry after a successful fit
    pub(crate) fn fitted_parameters(&self) -> BTreeMap<ParameterName, FittedParameter> {
        self.parameters
            .iter()
            .map(|(name, p)| {
                (
                    *name,
                    FittedParameter {
                        value: p.value,
                        stderr: p.stderr,
                        correlations: p.correlations.clone(),
                    },
                )
            })
            .collect()
    }

    /// Serializes the result as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::bound::Bound;
    use crate::optim::covariance::Covariance;
    use crate::optim::report::Termination;
    use ndarray::array;

    fn outcome(success: bool) -> FitOutcome {
        FitOutcome {
            report: FitReport {
                termination: if success {
                    Termination::Converged
                } else {
                    Termination::BudgetExhausted
                },
                success,
                nfev: 12,
                chisqr: 4.0,
                redchi: 2.0,
                ndata: 4,
                nvarys: 2,
                aic: -1.0,
                bic: -0.5,
                message: String::new(),
            },
            names: vec![ParameterName::KCat, ParameterName::Km, ParameterName::Kic],
            values: vec![10.0, 5.0, 1.0],
            bounds: vec![
                Bound::new(ParameterName::KCat, 1.0, 100.0),
                Bound::new(ParameterName::Kic, 1.0, 10.0),
            ],
            residuals: Some(array![1.0, -1.0, 1.0, -1.0]),
            covariance: Some(Covariance {
                matrix: array![[0.04, 0.01], [0.01, 0.01]],
                stderr: vec![Some(0.2), Some(0.1)],
                correlation: array![[1.0, 0.5], [0.5, 1.0]],
            }),
        }
    }

    #[test]
    fn test_successful_result() {
        let result = FitResult::from_outcome("mm", &outcome(true));

        assert!(result.success);
        assert_eq!(result.aic, Some(-1.0));
        assert_eq!(result.rmsd, Some(1.0));
        assert!(!result.degenerate);

        let k_cat = result.parameter(ParameterName::KCat).unwrap();
        assert_eq!(k_cat.stderr, Some(0.2));
        assert_eq!(k_cat.correlations.get(&ParameterName::Kic), Some(&0.5));
        assert!(!k_cat.at_bound);

        let k_m = result.parameter(ParameterName::Km).unwrap();
        assert!(!k_m.vary);
        assert_eq!(k_m.stderr, None);

        assert!(result.parameter(ParameterName::Kic).unwrap().at_bound);
        assert_eq!(result.varied(), vec![ParameterName::KCat, ParameterName::Kic]);
    }

    #[test]
    fn test_failed_result_has_no_statistics() {
        let result = FitResult::from_outcome("mm", &outcome(false));

        assert!(!result.success);
        assert_eq!(result.aic, None);
        assert_eq!(result.bic, None);
        assert_eq!(result.rmsd, None);
        assert!(result.parameters.values().all(|p| p.stderr.is_none()));
    }

    #[test]
    fn test_json_export() {
        let json = FitResult::from_outcome("mm", &outcome(true)).to_json().unwrap();
        assert!(json.contains("\"k_cat\""));
        assert!(json.contains("\"aic\": -1.0"));
    }
}
