//! Parameter uncertainties from the Jacobian at the optimum.
//!
//! The covariance is estimated as `inv(JᵀJ) · χ² / (n - k)` in internal coordinates and
//! mapped to external values with the derivative of the bound transform.

use ndarray::Array2;

use super::error::OptimizeError;
use super::problem::to_dmatrix;

/// Tolerance above 1 beyond which a correlation coefficient marks a degenerate fit
pub const CORRELATION_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub struct Covariance {
    /// Covariance matrix of the varying parameters in external coordinates
    pub matrix: Array2<f64>,
    /// Standard error per varying parameter, `None` where the variance is not finite or negative
    pub stderr: Vec<Option<f64>>,
    /// Correlation coefficients between varying parameters
    pub correlation: Array2<f64>,
}

impl Covariance {
    /// Whether any correlation lies outside `[-1, 1]` or is not finite
    pub fn is_degenerate(&self) -> bool {
        self.correlation
            .iter()
            .any(|r| !r.is_finite() || r.abs() > 1.0 + CORRELATION_TOLERANCE)
    }
}

/// Estimates the covariance of the varying parameters.
///
/// # Arguments
///
/// * `jacobian` - `(n_data, n_varys)` Jacobian in internal coordinates
/// * `chisqr` - Sum of squared residuals at the optimum
/// * `gradients` - `d external / d internal` per varying parameter
pub fn estimate(
    jacobian: &Array2<f64>,
    chisqr: f64,
    gradients: &[f64],
) -> Result<Covariance, OptimizeError> {
    let (n_data, n_varys) = jacobian.dim();
    if n_data <= n_varys {
        return Err(OptimizeError::NoDegreesOfFreedom { n_data, n_varys });
    }

    let j = to_dmatrix(jacobian);
    let inverse = (j.transpose() * &j)
        .try_inverse()
        .ok_or(OptimizeError::SingularJacobian)?;

    let redchi = chisqr / (n_data - n_varys) as f64;
    let matrix = Array2::from_shape_fn((n_varys, n_varys), |(a, b)| {
        inverse[(a, b)] * redchi * gradients[a] * gradients[b]
    });

    let stderr: Vec<Option<f64>> = (0..n_varys)
        .map(|i| {
            let variance = matrix[[i, i]];
            (variance.is_finite() && variance >= 0.0).then(|| variance.sqrt())
        })
        .collect();

    let correlation = Array2::from_shape_fn((n_varys, n_varys), |(a, b)| {
        if a == b {
            return 1.0;
        }
        match (stderr[a], stderr[b]) {
            (Some(sa), Some(sb)) => matrix[[a, b]] / (sa * sb),
            _ => f64::NAN,
        }
    });

    Ok(Covariance {
        matrix,
        stderr,
        correlation,
    })
}
