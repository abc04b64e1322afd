//! Species roles and species entities.
//!
//! Every concentration handled by the fitter carries a [`SpeciesRole`]. The ODE state
//! vector is fixed to three components in the order given by [`STATE_ORDER`]; the
//! inhibitor is a per-measurement constant and never part of the state.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Number of dynamic state variables (substrate, catalyst, product)
pub const N_STATES: usize = 3;

/// Order of the species in every state vector, simulation output and initial condition row
pub const STATE_ORDER: [SpeciesRole; N_STATES] = [
    SpeciesRole::Substrate,
    SpeciesRole::Catalyst,
    SpeciesRole::Product,
];

/// The meaning of a concentration within a reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeciesRole {
    Substrate,
    Product,
    Catalyst,
    Inhibitor,
}

impl SpeciesRole {
    /// All roles, in declaration order
    pub const ALL: [SpeciesRole; 4] = [
        SpeciesRole::Substrate,
        SpeciesRole::Product,
        SpeciesRole::Catalyst,
        SpeciesRole::Inhibitor,
    ];

    /// Symbol used for this role inside rate-law expressions
    pub fn symbol(&self) -> &'static str {
        match self {
            SpeciesRole::Substrate => "substrate",
            SpeciesRole::Product => "product",
            SpeciesRole::Catalyst => "catalyst",
            SpeciesRole::Inhibitor => "inhibitor",
        }
    }

    /// Resolves a rate-law symbol to a species role
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.symbol() == symbol)
    }

    /// Position of this role in the state vector, `None` for the inhibitor
    pub fn state_index(&self) -> Option<usize> {
        STATE_ORDER.iter().position(|role| role == self)
    }
}

impl Display for SpeciesRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A species taking part in a reaction.
///
/// Species share no behaviour beyond their role tag, so a single struct carries
/// substrates, products, catalysts and inhibitors alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// Identifier as used in the experiment record
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Role within the reaction
    pub role: SpeciesRole,
}

impl Species {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: SpeciesRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }

    /// Derives the inactive form of a catalyst, introduced by catalyst-inactivation models
    pub fn inactivated(&self) -> Self {
        Self {
            id: format!("{}_inactive", self.id),
            name: format!("inactive {}", self.name),
            role: SpeciesRole::Catalyst,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_indices() {
        assert_eq!(SpeciesRole::Substrate.state_index(), Some(0));
        assert_eq!(SpeciesRole::Catalyst.state_index(), Some(1));
        assert_eq!(SpeciesRole::Product.state_index(), Some(2));
        assert_eq!(SpeciesRole::Inhibitor.state_index(), None);
    }

    #[test]
    fn test_symbol_round_trip() {
        for role in SpeciesRole::ALL {
            assert_eq!(SpeciesRole::from_symbol(role.symbol()), Some(role));
        }
        assert_eq!(SpeciesRole::from_symbol("enzyme"), None);
    }

    #[test]
    fn test_inactivated_catalyst() {
        let enzyme = Species::new("p0", "lipase", SpeciesRole::Catalyst);
        let inactive = enzyme.inactivated();
        assert_eq!(inactive.id, "p0_inactive");
        assert_eq!(inactive.role, SpeciesRole::Catalyst);
    }
}
