//! Rate-law compilation.
//!
//! A rate law is written as `<species> = <expression>`, e.g.
//! `substrate = -k_cat * catalyst * substrate / (K_m + substrate)`. The right-hand side
//! is parsed with `meval`; its free symbols are classified into species and kinetic
//! parameters. The compiled law takes its arguments as a slice ordered alphabetically
//! by symbol name, see [`RateLaw::arguments`].
//!
//! `product` is an ordinary variable here. `meval` has no builtin of that name, and
//! any call syntax such as `product(x)` is rejected as an unknown function.

use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::str::FromStr;

use meval::{tokenizer::Token, ContextProvider, Expr, FuncEvalError};
use thiserror::Error;

use crate::parameter::ParameterName;
use crate::species::SpeciesRole;

/// Functions that may appear in a rate-law expression
const FUNCTIONS: [&str; 8] = ["exp", "ln", "log", "log10", "sqrt", "abs", "min", "max"];

/// Species allowed on the left-hand side
const LHS_SPECIES: [SpeciesRole; 2] = [SpeciesRole::Substrate, SpeciesRole::Catalyst];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLawError {
    #[error("Rate law '{0}' is not an equality of the form '<species> = <expression>'")]
    MissingEquality(String),
    #[error("Left-hand side '{0}' is not one of 'substrate' or 'catalyst'")]
    InvalidLhs(String),
    #[error("Could not parse rate law expression '{expression}': {message}")]
    Parse { expression: String, message: String },
    #[error("Rate law contains unknown symbols: {0:?}")]
    UnknownSymbols(Vec<String>),
    #[error("Rate law calls unknown function '{0}'")]
    UnknownFunction(String),
    #[error("Expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },
    #[error("Could not evaluate rate law: {0}")]
    Evaluation(String),
}

/// A free symbol of a rate law
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Species(SpeciesRole),
    Parameter(ParameterName),
}

impl Symbol {
    pub fn name(&self) -> &'static str {
        match self {
            Symbol::Species(role) => role.symbol(),
            Symbol::Parameter(param) => param.symbol(),
        }
    }

    fn classify(name: &str) -> Option<Self> {
        SpeciesRole::from_symbol(name)
            .map(Symbol::Species)
            .or_else(|| ParameterName::from_symbol(name).map(Symbol::Parameter))
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A compiled rate law.
///
/// Compilation happens once; the result is immutable and evaluation is a pure
/// function of the argument slice, so a `RateLaw` can be shared freely between
/// reaction systems and threads.
#[derive(Debug, Clone)]
pub struct RateLaw {
    equation: String,
    lhs: SpeciesRole,
    rhs: Expr,
    arguments: Vec<Symbol>,
    species: BTreeSet<SpeciesRole>,
    parameters: BTreeSet<ParameterName>,
}

impl RateLaw {
    /// Parses and validates a rate-law string.
    ///
    /// # Errors
    ///
    /// Fails when the string is not a single equality, when the left-hand side is not
    /// `substrate` or `catalyst`, when the right-hand side cannot be parsed, or when it
    /// references symbols or functions outside the allowed set.
    pub fn compile(equation: &str) -> Result<Self, RateLawError> {
        let (lhs, rhs) = split_equality(equation)?;

        let lhs = SpeciesRole::from_symbol(lhs)
            .filter(|role| LHS_SPECIES.contains(role))
            .ok_or_else(|| RateLawError::InvalidLhs(lhs.to_string()))?;

        let expr: Expr = rhs.parse().map_err(|e: meval::Error| RateLawError::Parse {
            expression: rhs.to_string(),
            message: e.to_string(),
        })?;

        let arguments = classify_symbols(&expr)?;
        let species = arguments
            .iter()
            .filter_map(|s| match s {
                Symbol::Species(role) => Some(*role),
                Symbol::Parameter(_) => None,
            })
            .collect();
        let parameters = arguments
            .iter()
            .filter_map(|s| match s {
                Symbol::Parameter(name) => Some(*name),
                Symbol::Species(_) => None,
            })
            .collect();

        Ok(Self {
            equation: equation.trim().to_string(),
            lhs,
            rhs: expr,
            arguments,
            species,
            parameters,
        })
    }

    /// Species whose rate of change this law describes
    pub fn lhs(&self) -> SpeciesRole {
        self.lhs
    }

    /// Formal arguments, ordered alphabetically by symbol name
    pub fn arguments(&self) -> &[Symbol] {
        &self.arguments
    }

    pub fn argument_names(&self) -> Vec<&'static str> {
        self.arguments.iter().map(Symbol::name).collect()
    }

    pub fn species(&self) -> &BTreeSet<SpeciesRole> {
        &self.species
    }

    pub fn parameters(&self) -> &BTreeSet<ParameterName> {
        &self.parameters
    }

    pub fn equation(&self) -> &str {
        &self.equation
    }

    /// Evaluates the right-hand side.
    ///
    /// `args` must follow the order of [`RateLaw::arguments`].
    pub fn call(&self, args: &[f64]) -> Result<f64, RateLawError> {
        if args.len() != self.arguments.len() {
            return Err(RateLawError::ArgumentCount {
                expected: self.arguments.len(),
                found: args.len(),
            });
        }

        let frame = ArgumentFrame {
            symbols: &self.arguments,
            values: args,
        };

        self.rhs
            .eval_with_context(&frame)
            .map_err(|e| RateLawError::Evaluation(e.to_string()))
    }
}

impl FromStr for RateLaw {
    type Err = RateLawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl Display for RateLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.equation)
    }
}

fn split_equality(equation: &str) -> Result<(&str, &str), RateLawError> {
    let mut parts = equation.split('=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lhs), Some(rhs), None) if !lhs.trim().is_empty() && !rhs.trim().is_empty() => {
            Ok((lhs.trim(), rhs.trim()))
        }
        _ => Err(RateLawError::MissingEquality(equation.to_string())),
    }
}

/// Extracts the free symbols of an expression and sorts them by name.
fn classify_symbols(expr: &Expr) -> Result<Vec<Symbol>, RateLawError> {
    let mut names: BTreeSet<String> = BTreeSet::new();

    for token in expr.iter() {
        match token {
            Token::Var(name) => {
                names.insert(name.clone());
            }
            Token::Func(name, _) if !FUNCTIONS.contains(&name.as_str()) => {
                return Err(RateLawError::UnknownFunction(name.clone()));
            }
            _ => {}
        }
    }

    let unknown: Vec<String> = names
        .iter()
        .filter(|name| Symbol::classify(name).is_none())
        .cloned()
        .collect();

    if !unknown.is_empty() {
        return Err(RateLawError::UnknownSymbols(unknown));
    }

    // BTreeSet iteration is already alphabetical
    Ok(names.iter().filter_map(|n| Symbol::classify(n)).collect())
}

/// Projects an argument slice onto symbol names during evaluation
struct ArgumentFrame<'a> {
    symbols: &'a [Symbol],
    values: &'a [f64],
}

impl ContextProvider for ArgumentFrame<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        self.symbols
            .binary_search_by(|s| s.name().cmp(name))
            .ok()
            .map(|i| self.values[i])
    }

    fn eval_func(&self, name: &str, args: &[f64]) -> Result<f64, FuncEvalError> {
        match (name, args) {
            ("exp", [x]) => Ok(x.exp()),
            ("ln" | "log", [x]) => Ok(x.ln()),
            ("log10", [x]) => Ok(x.log10()),
            ("sqrt", [x]) => Ok(x.sqrt()),
            ("abs", [x]) => Ok(x.abs()),
            ("min", [a, b]) => Ok(a.min(*b)),
            ("max", [a, b]) => Ok(a.max(*b)),
            ("min" | "max", _) => Err(FuncEvalError::NumberArgs(2)),
            (name, _) if FUNCTIONS.contains(&name) => Err(FuncEvalError::NumberArgs(1)),
            _ => Err(FuncEvalError::UnknownFunction),
        }
    }
}
