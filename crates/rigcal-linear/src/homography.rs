use nalgebra::DMatrix;
use rigcal_core::{Mat3, Pt2, Real};
use thiserror::Error;

use crate::math::{normalize_points_2d, smallest_right_singular_vector};

#[derive(Debug, Error, PartialEq)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point sets differ in length: {0} vs {1}")]
    LengthMismatch(usize, usize),
    #[error("degenerate point configuration")]
    Degenerate,
}

/// Estimate `H` such that `image ~ H * world` with the normalized DLT.
///
/// The result is scaled so that `H[(2, 2)] == 1` when that entry is non-zero.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::LengthMismatch(n, image.len()));
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let (wn, tw) = normalize_points_2d(world).ok_or(HomographyError::Degenerate)?;
    let (im, ti) = normalize_points_2d(image).ok_or(HomographyError::Degenerate)?;

    let mut a = DMatrix::<Real>::zeros(2 * n, 9);
    for (i, (pw, pi)) in wn.iter().zip(im.iter()).enumerate() {
        let (x, y, u, v) = (pw.x, pw.y, pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let h = smallest_right_singular_vector(&a).ok_or(HomographyError::Degenerate)?;
    let hn = Mat3::from_row_slice(h.as_slice());

    // Undo the conditioning: H = Ti^-1 * Hn * Tw.
    let ti_inv = ti.try_inverse().ok_or(HomographyError::Degenerate)?;
    let mut h_mat = ti_inv * hn * tw;

    let scale = h_mat[(2, 2)];
    if scale.abs() > Real::EPSILON {
        h_mat /= scale;
    }
    if h_mat.iter().any(|v| !v.is_finite()) {
        return Err(HomographyError::Degenerate);
    }
    Ok(h_mat)
}

/// Apply a homography to a 2D point.
pub fn apply_homography(h: &Mat3, p: &Pt2) -> Pt2 {
    let v = h * nalgebra::Vector3::new(p.x, p.y, 1.0);
    Pt2::new(v.x / v.z, v.y / v.z)
}
