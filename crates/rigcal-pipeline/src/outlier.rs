//! Reprojection-based outlier rejection.

use rigcal_core::{median, Camera, CameraObservation, CharucoBoard, Iso3, Real};
use serde::{Deserialize, Serialize};

/// Floor of the automatic threshold, in pixels.
pub const AUTO_THRESHOLD_FLOOR: Real = 150.0;

/// Result of [`filter_outliers`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// Same image count and order as the input.
    pub observations: Vec<CameraObservation>,
    /// Pixel residuals of the corners that survived.
    pub kept_residuals: Vec<Real>,
    /// Pixel residuals of the dropped corners.
    pub removed_residuals: Vec<Real>,
    /// Threshold actually applied, explicit or automatic.
    pub threshold: Real,
}

impl FilterOutcome {
    /// Corners kept over all images with a pose.
    pub fn kept(&self) -> usize {
        self.kept_residuals.len()
    }

    /// Corners dropped over all images with a pose.
    pub fn removed(&self) -> usize {
        self.removed_residuals.len()
    }

    /// Counts without the residual vectors.
    pub fn stats(&self) -> FilterStats {
        FilterStats {
            threshold: self.threshold,
            kept: self.kept(),
            removed: self.removed(),
        }
    }
}

/// Summary of one filter pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    pub threshold: Real,
    pub kept: usize,
    pub removed: usize,
}

/// Pixel residual of every corner in `obs` under `pose`.
///
/// Corners with unknown ids or behind the camera get `INFINITY`.
pub fn observation_residuals(
    obs: &CameraObservation,
    pose: &Iso3,
    camera: &Camera,
    board: &CharucoBoard,
) -> Vec<Real> {
    obs.ids
        .iter()
        .zip(&obs.corners)
        .map(|(&id, px)| {
            board
                .corner(id)
                .and_then(|p| camera.project_point(pose, &p))
                .map_or(Real::INFINITY, |proj| (proj - px).norm())
        })
        .collect()
}

/// Drop corners whose reprojection error exceeds the threshold.
///
/// `poses[i]` is the board pose of image `i`; images without a pose pass
/// through untouched. Without an explicit threshold, `max(2 * median, 150)`
/// over all residuals is used. Residuals strictly above the threshold are
/// removed.
pub fn filter_outliers(
    observations: &[CameraObservation],
    poses: &[Option<Iso3>],
    camera: &Camera,
    board: &CharucoBoard,
    threshold: Option<Real>,
) -> FilterOutcome {
    let residuals: Vec<Option<Vec<Real>>> = observations
        .iter()
        .enumerate()
        .map(|(i, obs)| {
            poses
                .get(i)
                .copied()
                .flatten()
                .map(|pose| observation_residuals(obs, &pose, camera, board))
        })
        .collect();

    let threshold = threshold.unwrap_or_else(|| {
        let finite: Vec<Real> = residuals
            .iter()
            .flatten()
            .flatten()
            .copied()
            .filter(|r| r.is_finite())
            .collect();
        median(&finite).map_or(AUTO_THRESHOLD_FLOOR, |m| (2.0 * m).max(AUTO_THRESHOLD_FLOOR))
    });

    let mut kept_residuals = Vec::new();
    let mut removed_residuals = Vec::new();
    let observations = observations
        .iter()
        .zip(&residuals)
        .map(|(obs, res)| {
            let Some(res) = res else {
                return obs.clone();
            };
            let keep: Vec<bool> = res
                .iter()
                .map(|&r| {
                    let ok = r <= threshold;
                    if ok {
                        kept_residuals.push(r);
                    } else {
                        removed_residuals.push(r);
                    }
                    ok
                })
                .collect();
            obs.select(&keep)
        })
        .collect();

    FilterOutcome {
        observations,
        kept_residuals,
        removed_residuals,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::synthetic::{board_poses, observe, with_outlier};
    use rigcal_core::{CameraModel, Distortion, FxFyCxCySkew, Pt2, Resolution};

    struct Scene {
        camera: Camera,
        board: CharucoBoard,
        poses: Vec<Iso3>,
        observations: Vec<CameraObservation>,
    }

    fn scene() -> Scene {
        let res = Resolution::new(1280, 800);
        let camera = Camera::new(
            FxFyCxCySkew::from_hfov(res.width, res.height, 70.0),
            Distortion::from_coefficients(CameraModel::Perspective, &[-0.1, 0.02, 0.0, 0.0, 0.0]),
        );
        let board = CharucoBoard::new(8, 6, 30.0, 22.0).unwrap();
        let poses = board_poses(&board, 4, 600.0);
        let observations = poses
            .iter()
            .map(|p| observe(&camera, &board, p, res))
            .collect();
        Scene {
            camera,
            board,
            poses,
            observations,
        }
    }

    #[test]
    fn clean_data_is_kept_entirely() {
        let s = scene();
        let poses: Vec<_> = s.poses.iter().copied().map(Some).collect();
        let out = filter_outliers(&s.observations, &poses, &s.camera, &s.board, Some(2.0));
        assert_eq!(out.removed(), 0);
        assert_eq!(out.kept(), 4 * s.board.num_corners());
        assert_eq!(out.observations, s.observations);
        assert!(out.kept_residuals.iter().all(|r| *r < 1e-6));
    }

    #[test]
    fn single_far_outlier_is_removed_alone() {
        let s = scene();
        let mut observations = s.observations.clone();
        observations[2] = with_outlier(&observations[2], 5, Pt2::new(400.0, -300.0));
        let poses: Vec<_> = s.poses.iter().copied().map(Some).collect();

        let out = filter_outliers(&observations, &poses, &s.camera, &s.board, None);
        assert_eq!(out.threshold, AUTO_THRESHOLD_FLOOR);
        assert_eq!(out.removed(), 1);
        assert!((out.removed_residuals[0] - 500.0).abs() < 1e-6);
        assert_eq!(out.observations.len(), 4);
        assert_eq!(out.observations[2].len(), s.board.num_corners() - 1);
        assert!(out.observations[2].index_of(s.observations[2].ids[5]).is_none());
    }

    #[test]
    fn images_without_pose_pass_through() {
        let s = scene();
        let mut observations = s.observations.clone();
        observations[1] = with_outlier(&observations[1], 0, Pt2::new(50.0, 0.0));
        let mut poses: Vec<_> = s.poses.iter().copied().map(Some).collect();
        poses[1] = None;

        let out = filter_outliers(&observations, &poses, &s.camera, &s.board, Some(1.0));
        assert_eq!(out.observations[1], observations[1]);
        assert_eq!(out.kept(), 3 * s.board.num_corners());
    }
}
