use serde::{Deserialize, Serialize};

use crate::parameter::ParameterName;

/// A finite box constraint on a varying parameter.
///
/// The optimizer works on an unbounded internal value mapped onto the interval with
///
/// ```text
/// external = lower + (sin(internal) + 1) · (upper - lower) / 2
/// ```
///
/// so every value it proposes lies within `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    /// Name of the parameter being bounded
    pub param: ParameterName,
    /// Lower bound/minimum allowed value for the parameter
    pub lower: f64,
    /// Upper bound/maximum allowed value for the parameter
    pub upper: f64,
}

impl Bound {
    pub fn new(param: ParameterName, lower: f64, upper: f64) -> Self {
        Self {
            param,
            lower,
            upper,
        }
    }

    /// Maps an internal optimizer value onto the bounded interval
    pub fn to_external(&self, internal: f64) -> f64 {
        self.lower + (internal.sin() + 1.0) * (self.upper - self.lower) / 2.0
    }

    /// Maps a bounded value onto the internal scale; values outside the bounds are
    /// clamped first
    pub fn to_internal(&self, external: f64) -> f64 {
        let scaled = 2.0 * (external - self.lower) / (self.upper - self.lower) - 1.0;
        scaled.clamp(-1.0, 1.0).asin()
    }

    /// Derivative of the external value with respect to the internal one
    pub fn gradient(&self, internal: f64) -> f64 {
        (self.upper - self.lower) / 2.0 * internal.cos()
    }

    /// Whether `value` lies within a relative distance of `rtol` of either bound
    pub fn is_at_bound(&self, value: f64, rtol: f64) -> bool {
        let width = self.upper - self.lower;
        (value - self.lower).abs() <= rtol * width || (self.upper - value).abs() <= rtol * width
    }
}
