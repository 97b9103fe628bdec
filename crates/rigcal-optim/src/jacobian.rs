//! Central-difference Jacobians.
//!
//! Calibration problems are block structured: each view's residuals depend on
//! the shared camera block and on that view's pose only. [`fill_columns`]
//! differentiates a residual *block* with respect to a column range so
//! callers can assemble the sparse pattern without re-evaluating every
//! residual for every pose parameter.

use std::ops::Range;

use nalgebra::{DMatrix, DVector};
use rigcal_core::Real;

fn step(x: Real) -> Real {
    1e-6 * x.abs().max(1.0)
}

/// Dense Jacobian of `f` at `x`.
pub fn finite_difference_jacobian<F>(x: &DVector<Real>, f: F) -> DMatrix<Real>
where
    F: Fn(&DVector<Real>) -> DVector<Real>,
{
    let m = f(x).len();
    let mut jac = DMatrix::zeros(m, x.len());
    fill_columns(&mut jac, 0, 0..x.len(), x, f);
    jac
}

/// Write `d f / d x[cols]` into `jac` starting at row `row_offset`.
///
/// `f` returns the residual block whose first row lands at `row_offset`.
pub fn fill_columns<F>(
    jac: &mut DMatrix<Real>,
    row_offset: usize,
    cols: Range<usize>,
    x: &DVector<Real>,
    f: F,
) where
    F: Fn(&DVector<Real>) -> DVector<Real>,
{
    let mut shifted = x.clone();
    for c in cols {
        let h = step(x[c]);
        shifted[c] = x[c] + h;
        let plus = f(&shifted);
        shifted[c] = x[c] - h;
        let minus = f(&shifted);
        shifted[c] = x[c];

        let d = (plus - minus) / (2.0 * h);
        jac.view_mut((row_offset, c), (d.len(), 1)).copy_from(&d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_analytic_jacobian() {
        let f = |p: &DVector<Real>| {
            DVector::from_vec(vec![p[0] * p[1], p[0].sin() + p[1] * p[1], 3.0 * p[1]])
        };
        let x = DVector::from_vec(vec![0.7, -1.2]);
        let j = finite_difference_jacobian(&x, f);

        let expected = DMatrix::from_row_slice(3, 2, &[-1.2, 0.7, 0.7_f64.cos(), -2.4, 0.0, 3.0]);
        assert!((j - expected).abs().max() < 1e-8);
    }

    #[test]
    fn fills_only_the_requested_block() {
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut jac = DMatrix::zeros(4, 3);
        fill_columns(&mut jac, 2, 1..3, &x, |p| DVector::from_vec(vec![p[1], p[2] * p[2]]));

        assert_eq!(jac.view((0, 0), (2, 3)).abs().max(), 0.0);
        assert_eq!(jac.column(0).abs().max(), 0.0);
        assert!((jac[(2, 1)] - 1.0).abs() < 1e-9);
        assert!((jac[(3, 2)] - 6.0).abs() < 1e-6);
    }
}
