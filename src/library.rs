//! Built-in candidate rate laws.
//!
//! Substrate laws return a negative rate while substrate is consumed. Product and
//! external-inhibitor variants differ only in which species enters the inhibition
//! terms.

use serde::{Deserialize, Serialize};

use crate::ratelaw::{RateLaw, RateLawError};
use crate::species::SpeciesRole;

pub const IRREVERSIBLE_MICHAELIS_MENTEN: &str = "irreversible Michaelis-Menten";
pub const COMPETITIVE_PRODUCT_INHIBITION: &str = "competitive product inhibition";
pub const UNCOMPETITIVE_PRODUCT_INHIBITION: &str = "uncompetitive product inhibition";
pub const NONCOMPETITIVE_PRODUCT_INHIBITION: &str = "non-competitive product inhibition";
pub const SUBSTRATE_INHIBITION: &str = "substrate inhibition";
pub const COMPETITIVE_INHIBITION: &str = "competitive inhibition";
pub const UNCOMPETITIVE_INHIBITION: &str = "uncompetitive inhibition";
pub const NONCOMPETITIVE_INHIBITION: &str = "non-competitive inhibition";
pub const PARTIALLY_COMPETITIVE_INHIBITION: &str = "partially competitive inhibition";
pub const COMPETITIVE_SUBSTRATE_INHIBITION: &str =
    "competitive product inhibition with substrate inhibition";
pub const CATALYST_DECAY: &str = "first-order catalyst inactivation";

/// A rate-law string under its model name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRateLaw {
    pub name: String,
    pub equation: String,
}

impl NamedRateLaw {
    pub fn new(name: impl Into<String>, equation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            equation: equation.into(),
        }
    }

    pub fn compile(&self) -> Result<RateLaw, RateLawError> {
        RateLaw::compile(&self.equation)
    }
}

/// Candidate substrate and catalyst rate laws, in enumeration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLawLibrary {
    pub substrate: Vec<NamedRateLaw>,
    pub catalyst: Vec<NamedRateLaw>,
}

impl RateLawLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in law
    pub fn builtin() -> Self {
        Self {
            substrate: builtin_substrate_laws(true),
            catalyst: builtin_catalyst_laws(),
        }
    }

    /// Built-in laws applicable to an experiment. Laws depending on an external
    /// inhibitor are left out when no measurement contains one.
    pub fn for_experiment(has_inhibitor: bool) -> Self {
        Self {
            substrate: builtin_substrate_laws(has_inhibitor),
            catalyst: builtin_catalyst_laws(),
        }
    }

    /// Adds a law, placing it by its left-hand side.
    ///
    /// # Errors
    ///
    /// Fails when the equation does not compile.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        equation: impl Into<String>,
    ) -> Result<&mut Self, RateLawError> {
        let law = NamedRateLaw::new(name, equation);
        match law.compile()?.lhs() {
            SpeciesRole::Catalyst => self.catalyst.push(law),
            _ => self.substrate.push(law),
        }
        Ok(self)
    }

    pub fn with_substrate(mut self, name: impl Into<String>, equation: impl Into<String>) -> Self {
        self.substrate.push(NamedRateLaw::new(name, equation));
        self
    }

    pub fn with_catalyst(mut self, name: impl Into<String>, equation: impl Into<String>) -> Self {
        self.catalyst.push(NamedRateLaw::new(name, equation));
        self
    }

    /// Restricts the substrate laws to the given names, keeping library order
    pub fn select(mut self, names: &[&str]) -> Self {
        self.substrate.retain(|law| names.contains(&law.name.as_str()));
        self
    }
}

fn builtin_substrate_laws(has_inhibitor: bool) -> Vec<NamedRateLaw> {
    let mut laws = vec![
        NamedRateLaw::new(
            IRREVERSIBLE_MICHAELIS_MENTEN,
            "substrate = -k_cat * catalyst * substrate / (K_m + substrate)",
        ),
        NamedRateLaw::new(
            COMPETITIVE_PRODUCT_INHIBITION,
            "substrate = -k_cat * catalyst * substrate / (K_m * (1 + product / K_ic) + substrate)",
        ),
        NamedRateLaw::new(
            UNCOMPETITIVE_PRODUCT_INHIBITION,
            "substrate = -k_cat * catalyst * substrate / (K_m + (1 + product / K_iu) * substrate)",
        ),
        NamedRateLaw::new(
            NONCOMPETITIVE_PRODUCT_INHIBITION,
            "substrate = -k_cat * catalyst * substrate / (K_m * (1 + product / K_ic) + (1 + product / K_iu) * substrate)",
        ),
        NamedRateLaw::new(
            SUBSTRATE_INHIBITION,
            "substrate = -k_cat * catalyst * substrate / (K_m + (1 + substrate / K_iu) * substrate)",
        ),
        NamedRateLaw::new(
            COMPETITIVE_SUBSTRATE_INHIBITION,
            "substrate = -k_cat * catalyst * substrate / (K_m * (1 + product / K_ic) + substrate * (1 + substrate / K_iu))",
        ),
    ];

    if has_inhibitor {
        laws.extend([
            NamedRateLaw::new(
                COMPETITIVE_INHIBITION,
                "substrate = -k_cat * catalyst * substrate / (K_m * (1 + inhibitor / K_ic) + substrate)",
            ),
            NamedRateLaw::new(
                UNCOMPETITIVE_INHIBITION,
                "substrate = -k_cat * catalyst * substrate / (K_m + (1 + inhibitor / K_iu) * substrate)",
            ),
            NamedRateLaw::new(
                NONCOMPETITIVE_INHIBITION,
                "substrate = -k_cat * catalyst * substrate / (K_m * (1 + inhibitor / K_ic) + (1 + inhibitor / K_iu) * substrate)",
            ),
            NamedRateLaw::new(
                PARTIALLY_COMPETITIVE_INHIBITION,
                "substrate = -k_cat * catalyst * substrate / (K_m * (1 + inhibitor / K_ic) / (1 + inhibitor / K_iu) + substrate)",
            ),
        ]);
    }

    laws
}

fn builtin_catalyst_laws() -> Vec<NamedRateLaw> {
    vec![NamedRateLaw::new(CATALYST_DECAY, "catalyst = -K_ie * catalyst")]
}
