//! Goodness-of-fit statistics computed from a flattened residual vector.

use ndarray::Array1;

/// Lower clamp applied to χ² before taking logarithms, so that an exact fit does not
/// produce an infinite information criterion
const MIN_CHISQR: f64 = 1e-250;

/// Calculates the sum of squared errors (χ²).
///
/// SSE = Σ r²
pub fn sum_of_squared_errors(residuals: &Array1<f64>) -> f64 {
    residuals.mapv(|x| x * x).sum()
}

/// Calculates the Root Mean Squared Deviation, in the units of the data.
///
/// RMSD = √((1/n) · Σ r²)
///
/// Returns `NaN` for an empty residual vector.
pub fn root_mean_squared_deviation(residuals: &Array1<f64>) -> f64 {
    (sum_of_squared_errors(residuals) / residuals.len() as f64).sqrt()
}

/// Calculates the Akaike Information Criterion. Lower values indicate better models.
///
/// AIC = n · ln(χ²/n) + 2k
/// where:
/// - n is the number of data points
/// - χ² is the sum of squared errors
/// - k is the number of varying parameters
pub fn akaike_information_criterion(chisqr: f64, n_data: usize, n_varys: usize) -> f64 {
    neg_log_likelihood(chisqr, n_data) + 2.0 * n_varys as f64
}

/// Calculates the Bayesian Information Criterion. Like AIC, but its complexity
/// penalty grows with the number of data points.
///
/// BIC = n · ln(χ²/n) + k · ln(n)
pub fn bayesian_information_criterion(chisqr: f64, n_data: usize, n_varys: usize) -> f64 {
    let n = n_data as f64;
    neg_log_likelihood(chisqr, n_data) + n_varys as f64 * n.ln()
}

/// Reduced χ², `NaN` when there are no degrees of freedom left
pub fn reduced_chi_square(chisqr: f64, n_data: usize, n_varys: usize) -> f64 {
    if n_data > n_varys {
        chisqr / (n_data - n_varys) as f64
    } else {
        f64::NAN
    }
}

fn neg_log_likelihood(chisqr: f64, n_data: usize) -> f64 {
    let n = n_data as f64;
    n * (chisqr.max(MIN_CHISQR) / n).ln()
}
