//! Stereo quality metrics.

use rigcal_core::{Camera, Real, Vec3};
use rigcal_linear::StereoRectification;
use serde::{Deserialize, Serialize};

use crate::config::IntrinsicsMode;
use crate::correspondence::CommonCorrespondences;

/// Stereo residual normalised by focal length.
///
/// In per-camera mode the raw RMS is divided by
/// `sqrt(mean(fx_l * fx_r, fy_l * fy_r))`, which makes scores comparable
/// across lenses. Shared mode reports the raw value.
pub fn epipolar_score(raw: Real, left: &Camera, right: &Camera, mode: IntrinsicsMode) -> Real {
    match mode {
        IntrinsicsMode::Shared => raw,
        IntrinsicsMode::PerCamera => {
            let (l, r) = (&left.intrinsics, &right.intrinsics);
            let scale = (0.5 * (l.fx * r.fx + l.fy * r.fy)).sqrt();
            if scale > 0.0 {
                raw / scale
            } else {
                raw
            }
        }
    }
}

/// Row (or column) disagreement of corresponding points after rectification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectifiedError {
    /// Mean `|v_l - v_r|` for horizontal rigs, `|u_l - u_r|` for vertical.
    pub mean: Real,
    pub count: usize,
    /// Correspondences off by a pixel or more.
    pub above_one_px: usize,
    pub horizontal: bool,
}

/// Rectify every common correspondence and measure the epipolar error.
///
/// The baseline counts as horizontal when `|t.x| > |t.y|`.
pub fn rectified_error(
    rect: &StereoRectification,
    left: &Camera,
    right: &Camera,
    t: &Vec3,
    common: &CommonCorrespondences,
) -> RectifiedError {
    let horizontal = t.x.abs() > t.y.abs();
    let errors: Vec<Real> = common
        .left
        .iter()
        .zip(&common.right)
        .flat_map(|(l, r)| l.points_2d.iter().zip(&r.points_2d))
        .filter_map(|(pl, pr)| {
            let a = rect.rectify_left(left, pl)?;
            let b = rect.rectify_right(right, pr)?;
            Some(if horizontal { (a.y - b.y).abs() } else { (a.x - b.x).abs() })
        })
        .collect();

    let count = errors.len();
    let mean = if count == 0 {
        0.0
    } else {
        errors.iter().sum::<Real>() / count as Real
    };
    RectifiedError {
        mean,
        count,
        above_one_px: errors.iter().filter(|e| **e >= 1.0).count(),
        horizontal,
    }
}
