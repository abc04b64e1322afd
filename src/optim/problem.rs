//! Bounded least-squares problem handed to the Levenberg-Marquardt minimizer.
//!
//! The problem owns the internal (unbounded) coordinates of the varying parameters.
//! Fixed parameters keep their snapshot value and are spliced back in whenever the
//! residual function is called with the full external parameter vector.

use std::cell::{Cell, RefCell};

use finitediff::FiniteDiff;
use levenberg_marquardt::LeastSquaresProblem;
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2};

use crate::parameter::{ParameterName, ParameterSnapshot};

use super::bound::Bound;
use super::error::OptimizeError;

/// Perturbation of an internal coordinate in forward differences
const FORWARD_STEP: f64 = 1.490_116_119_384_765_6e-8;

/// Residual function over the full external parameter vector
pub type Objective<'a> = Box<dyn Fn(&[f64]) -> Result<Array1<f64>, OptimizeError> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Fixed(f64),
    Vary(usize),
}

pub struct BoundedProblem<'a> {
    objective: Objective<'a>,
    names: Vec<ParameterName>,
    slots: Vec<Slot>,
    bounds: Vec<Bound>,
    internal: DVector<f64>,
    n_residuals: usize,
    nfev: Cell<usize>,
    max_nfev: usize,
    /// Residuals of the last counted evaluation and the coordinates they belong to
    last: RefCell<Option<(Vec<f64>, Array1<f64>)>>,
}

impl<'a> BoundedProblem<'a> {
    /// Sets up the problem from an ordered parameter snapshot.
    ///
    /// Every call of `objective` counts against `max_nfev`, including the calls made
    /// while approximating the Jacobian.
    pub fn new(
        snapshot: &[ParameterSnapshot],
        n_residuals: usize,
        max_nfev: usize,
        objective: Objective<'a>,
    ) -> Self {
        let mut slots = Vec::with_capacity(snapshot.len());
        let mut bounds = Vec::new();
        let mut internal = Vec::new();

        for param in snapshot {
            if param.vary {
                let bound = Bound::new(param.name, param.lower, param.upper);
                slots.push(Slot::Vary(bounds.len()));
                internal.push(bound.to_internal(param.value));
                bounds.push(bound);
            } else {
                slots.push(Slot::Fixed(param.value));
            }
        }

        Self {
            objective,
            names: snapshot.iter().map(|p| p.name).collect(),
            slots,
            bounds,
            internal: DVector::from_vec(internal),
            n_residuals,
            nfev: Cell::new(0),
            max_nfev,
            last: RefCell::new(None),
        }
    }

    /// Names of all parameters, in snapshot order
    pub fn names(&self) -> &[ParameterName] {
        &self.names
    }

    pub fn bounds(&self) -> &[Bound] {
        &self.bounds
    }

    pub fn n_varys(&self) -> usize {
        self.bounds.len()
    }

    pub fn n_residuals(&self) -> usize {
        self.n_residuals
    }

    /// Residual evaluations so far
    pub fn nfev(&self) -> usize {
        self.nfev.get()
    }

    pub fn budget_exhausted(&self) -> bool {
        self.nfev.get() >= self.max_nfev
    }

    /// Current internal coordinates of the varying parameters
    pub fn internal(&self) -> &[f64] {
        self.internal.as_slice()
    }

    /// Full external parameter vector for the given internal coordinates
    pub fn external(&self, internal: &[f64]) -> Vec<f64> {
        self.slots
            .iter()
            .map(|slot| match *slot {
                Slot::Fixed(value) => value,
                Slot::Vary(i) => self.bounds[i].to_external(internal[i]),
            })
            .collect()
    }

    /// Derivatives of the external values of the varying parameters with respect to
    /// their internal coordinates
    pub fn gradients(&self) -> Vec<f64> {
        self.bounds
            .iter()
            .zip(self.internal.iter())
            .map(|(bound, &x)| bound.gradient(x))
            .collect()
    }

    /// Evaluates the residuals at the given internal coordinates.
    ///
    /// Returns `None` once the evaluation budget is spent, when the simulation fails or
    /// when any residual is non-finite.
    pub fn evaluate(&self, internal: &[f64]) -> Option<Array1<f64>> {
        if self.budget_exhausted() {
            debug!("Evaluation budget of {} exhausted", self.max_nfev);
            return None;
        }
        self.nfev.set(self.nfev.get() + 1);

        let residuals = self.compute(internal)?;
        *self.last.borrow_mut() = Some((internal.to_vec(), residuals.clone()));
        Some(residuals)
    }

    /// Residuals at the current coordinates, not counted against the budget
    pub fn final_residuals(&self) -> Option<Array1<f64>> {
        self.compute(self.internal.as_slice())
    }

    /// Forward-difference Jacobian in internal coordinates, shape `(n_residuals, n_varys)`.
    ///
    /// Residuals already evaluated at the current coordinates are reused, so the
    /// Jacobian costs one counted evaluation per varying parameter.
    pub fn jacobian_internal(&self) -> Option<Array2<f64>> {
        let x = self.internal.as_slice();
        let cached = self
            .last
            .borrow()
            .as_ref()
            .filter(|(at, _)| at.as_slice() == x)
            .map(|(_, residuals)| residuals.clone());
        let base = match cached {
            Some(residuals) => residuals,
            None => self.evaluate(x)?,
        };

        let mut jacobian = Array2::zeros((self.n_residuals, self.n_varys()));
        let mut shifted = x.to_vec();
        for (j, mut column) in jacobian.columns_mut().into_iter().enumerate() {
            shifted[j] = x[j] + FORWARD_STEP;
            let residuals = self.evaluate(&shifted)?;
            shifted[j] = x[j];
            column.assign(&((residuals - &base) / FORWARD_STEP));
        }

        Some(jacobian)
    }

    /// Central-difference Jacobian at the current coordinates, shape
    /// `(n_residuals, n_varys)`, not counted against the budget
    pub fn final_jacobian(&self) -> Option<Array2<f64>> {
        let failed = Cell::new(false);
        let x = Array1::from_vec(self.internal.as_slice().to_vec());

        let jacobian = x.central_jacobian(&|x: &Array1<f64>| match self.compute(&x.to_vec()) {
            Some(residuals) => residuals,
            None => {
                failed.set(true);
                Array1::from_elem(self.n_residuals, f64::NAN)
            }
        });

        if failed.get() || jacobian.iter().any(|v| !v.is_finite()) {
            return None;
        }

        // finitediff lays out one row per parameter
        debug_assert_eq!(jacobian.dim(), (self.n_varys(), self.n_residuals));
        Some(jacobian.reversed_axes())
    }

    fn compute(&self, internal: &[f64]) -> Option<Array1<f64>> {
        match (self.objective)(&self.external(internal)) {
            Ok(residuals) if residuals.len() != self.n_residuals => {
                debug!(
                    "Expected {} residuals, got {}",
                    self.n_residuals,
                    residuals.len()
                );
                None
            }
            Ok(residuals) if residuals.iter().all(|r| r.is_finite()) => Some(residuals),
            Ok(_) => {
                debug!("Non-finite residuals at {:?}", self.external(internal));
                None
            }
            Err(e) => {
                debug!("Residual evaluation failed: {}", e);
                None
            }
        }
    }
}

pub(crate) fn to_dmatrix(array: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = array.dim();
    DMatrix::from_fn(rows, cols, |i, j| array[[i, j]])
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for BoundedProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.internal.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.internal.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.evaluate(self.internal.as_slice())
            .map(|r| DVector::from_iterator(r.len(), r.into_iter()))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.jacobian_internal().map(|j| to_dmatrix(&j))
    }
}
