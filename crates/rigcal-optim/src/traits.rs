use nalgebra::{DMatrix, DVector};
use rigcal_core::Real;
use serde::{Deserialize, Serialize};

use crate::jacobian::finite_difference_jacobian;

/// Non-linear least squares problem with dense parameter and residual vectors.
///
/// Only [`NllsProblem::residuals`] is required. The default Jacobian uses
/// central differences over the whole parameter vector; problems with block
/// structure override it.
pub trait NllsProblem {
    /// Number of parameters in the optimization vector.
    fn num_params(&self) -> usize;
    /// Number of residual rows in the problem.
    fn num_residuals(&self) -> usize;

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        finite_difference_jacobian(x, |p| self.residuals(p))
    }
}

/// Termination settings shared by all problems.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Iteration budget; the LM backend caps function evaluations at
    /// `max_iters * (n + 1)`.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: Real,
    /// Orthogonality tolerance between residuals and Jacobian columns.
    pub gtol: Real,
    /// Relative tolerance on parameter updates.
    pub xtol: Real,
    /// Log each solve's termination at `debug` level.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub evaluations: usize,
    /// `0.5 * |r|^2` at the returned parameters.
    pub final_cost: Real,
    pub converged: bool,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
