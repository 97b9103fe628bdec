//! Zhang's closed-form intrinsics from plane homographies.

use nalgebra::{DMatrix, SVector};
use rigcal_core::{FxFyCxCySkew, Mat3, Real};
use thiserror::Error;

use crate::math::smallest_right_singular_vector;

#[derive(Debug, Error, PartialEq)]
pub enum ZhangError {
    #[error("need at least 3 homographies, got {0}")]
    NotEnoughViews(usize),
    #[error("degenerate view configuration")]
    Degenerate,
}

fn v_ij(h: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate K from board-to-image homographies, ignoring distortion.
///
/// With `zero_skew` an extra constraint row forces `B12 = 0`.
pub fn estimate_intrinsics_from_homographies(
    homographies: &[Mat3],
    zero_skew: bool,
) -> Result<FxFyCxCySkew<Real>, ZhangError> {
    let m = homographies.len();
    if m < 3 {
        return Err(ZhangError::NotEnoughViews(m));
    }

    // Work in pixel units scaled by `s` so that B has entries of similar size.
    let s = pixel_scale(homographies);
    let cond = Mat3::new(1.0 / s, 0.0, 0.0, 0.0, 1.0 / s, 0.0, 0.0, 0.0, 1.0);

    let rows = 2 * m + usize::from(zero_skew);
    let mut v = DMatrix::<Real>::zeros(rows, 6);
    for (k, h) in homographies.iter().enumerate() {
        let h = cond * h;
        let h = h / h.norm();
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);
        v.row_mut(2 * k).copy_from(&v12.transpose());
        v.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }
    if zero_skew {
        v[(2 * m, 1)] = 1.0;
    }

    let b = smallest_right_singular_vector(&v).ok_or(ZhangError::Degenerate)?;
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    if denom.abs() <= 1e-12 * (b11 * b11 + b22 * b22) || b11.abs() <= Real::EPSILON {
        return Err(ZhangError::Degenerate);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda / b11 <= 0.0 || lambda * b11 / denom <= 0.0 {
        return Err(ZhangError::Degenerate);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Ok(FxFyCxCySkew {
        fx: alpha * s,
        fy: beta * s,
        cx: u0 * s,
        cy: v0 * s,
        skew: if zero_skew { 0.0 } else { gamma * s },
    })
}

/// Typical pixel magnitude of the board origin across views.
fn pixel_scale(homographies: &[Mat3]) -> Real {
    let scales: Vec<Real> = homographies
        .iter()
        .filter(|h| h[(2, 2)].abs() > Real::EPSILON)
        .map(|h| (h[(0, 2)].abs() + h[(1, 2)].abs()) / h[(2, 2)].abs())
        .filter(|s| s.is_finite() && *s > Real::EPSILON)
        .collect();
    if scales.is_empty() {
        1.0
    } else {
        scales.iter().sum::<Real>() / scales.len() as Real
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn synthetic_homography(k: &Mat3, rot: Rotation3<Real>, t: Vector3<Real>) -> Mat3 {
        let r = rot.matrix();
        let mut h = Mat3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));
        h
    }

    #[test]
    fn recovers_intrinsics_from_three_views() {
        let intr = FxFyCxCySkew {
            fx: 900.0,
            fy: 880.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        };
        let k = intr.k_matrix();
        let hs = vec![
            synthetic_homography(
                &k,
                Rotation3::from_euler_angles(0.2, -0.1, 0.05),
                Vector3::new(-0.1, 0.05, 1.0),
            ),
            synthetic_homography(
                &k,
                Rotation3::from_euler_angles(-0.25, 0.15, -0.1),
                Vector3::new(0.05, -0.1, 1.2),
            ),
            synthetic_homography(
                &k,
                Rotation3::from_euler_angles(0.1, 0.3, 0.2),
                Vector3::new(0.0, 0.1, 0.9),
            ),
        ];

        let est = estimate_intrinsics_from_homographies(&hs, true).unwrap();
        assert!((est.fx - intr.fx).abs() < 1e-3, "fx = {}", est.fx);
        assert!((est.fy - intr.fy).abs() < 1e-3, "fy = {}", est.fy);
        assert!((est.cx - intr.cx).abs() < 1e-3, "cx = {}", est.cx);
        assert!((est.cy - intr.cy).abs() < 1e-3, "cy = {}", est.cy);
    }

    #[test]
    fn too_few_views() {
        assert_eq!(
            estimate_intrinsics_from_homographies(&[Mat3::identity(); 2], true),
            Err(ZhangError::NotEnoughViews(2))
        );
    }
}
