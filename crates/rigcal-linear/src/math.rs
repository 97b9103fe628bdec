//! Shared numerics for the linear solvers.

use nalgebra::{DMatrix, DVector};
use rigcal_core::{Mat3, Pt2, Real};

/// Hartley normalization for 2D points.
///
/// Centers points at the origin and scales them so the mean distance from
/// the origin is `sqrt(2)`. Returns the normalized points and the transform
/// `T` with `p_norm = T * p_h`, or `None` when all points coincide.
pub fn normalize_points_2d(points: &[Pt2]) -> Option<(Vec<Pt2>, Mat3)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as Real;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<Real>()
        / n;
    if mean_dist <= Real::EPSILON {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Mat3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| Pt2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    Some((normalized, t))
}

/// Unit vector minimising `|A x|`.
///
/// Right singular vector of the smallest singular value. Wide systems
/// (minimal samples) are padded with zero rows so `V^T` is square.
pub fn smallest_right_singular_vector(a: &DMatrix<Real>) -> Option<DVector<Real>> {
    let (rows, cols) = a.shape();
    if cols == 0 {
        return None;
    }
    let work = if rows < cols {
        let mut padded = DMatrix::<Real>::zeros(cols, cols);
        padded.view_mut((0, 0), (rows, cols)).copy_from(a);
        padded
    } else {
        a.clone()
    };

    let svd = work.svd(false, true);
    let v_t = svd.v_t?;
    let (idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let v = v_t.row(idx).transpose();
    let norm = v.norm();
    if !norm.is_finite() || norm <= Real::EPSILON {
        return None;
    }
    Some(v / norm)
}
