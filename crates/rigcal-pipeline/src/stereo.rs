//! Relative pose and rectification of one camera pair.

use log::{debug, info};
use rigcal_core::{CameraModel, CameraParameters, Mat3, Real, Resolution, Vec3};
use rigcal_linear::StereoRectification;
use serde::{Deserialize, Serialize};

use crate::collaborators::{Rectify, SolveStereoExtrinsics};
use crate::config::StereoConfig;
use crate::correspondence::CommonCorrespondences;
use crate::epipolar::{epipolar_score, rectified_error, RectifiedError};
use crate::error::{CalibrationError, PairId};

/// Calibrated extrinsics of a pair. `X_right = r * X_left + t`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoPair {
    /// Camera whose frame `r` and `t` map from.
    pub left: String,
    /// Camera whose frame `r` and `t` map into.
    pub right: String,
    /// Right-from-left rotation.
    pub r: Mat3,
    /// Right-from-left translation, in board units.
    pub t: Vec3,
    /// Raw stereo reprojection RMS in pixels.
    pub rms: Real,
    /// Rectifying rotations and projections of both cameras.
    pub rectification: StereoRectification,
    /// Resolution the rectification refers to.
    pub resolution: Resolution,
    /// Stereo RMS normalized by focal length (per-camera mode) or raw.
    pub epipolar_score: Real,
    /// Row (or column) disagreement of the common points after rectification.
    pub rectified_error: RectifiedError,
    /// Baseline mostly along x.
    pub horizontal: bool,
    /// Image pairs that entered the solve.
    pub image_pairs: usize,
    /// Common points over those image pairs.
    pub points: usize,
}

/// Solve `pair` from its common correspondences.
///
/// Fisheye pairs first cut every image pair to the smallest per-image count.
#[allow(clippy::too_many_arguments)]
pub fn solve_pair<S: SolveStereoExtrinsics + Rectify>(
    pair: &PairId,
    left: &CameraParameters,
    right: &CameraParameters,
    common: &CommonCorrespondences,
    r_guess: &Mat3,
    t_guess: &Vec3,
    resolution: Resolution,
    config: &StereoConfig,
    solvers: &S,
) -> Result<StereoPair, CalibrationError> {
    let fisheye = left.model() == CameraModel::Fisheye || right.model() == CameraModel::Fisheye;
    let common = if fisheye {
        let n = common.min_points();
        debug!("pair {pair}: fisheye, truncating image pairs to {n} points");
        common.truncated(n)
    } else {
        common.clone()
    };

    let stereo_failed = |reason: String| CalibrationError::StereoSolveFailed { reason };
    let fit = solvers
        .solve_extrinsics(&common, &left.camera, &right.camera, r_guess, t_guess)
        .map_err(|e| stereo_failed(e.to_string()))?;
    let rectification = solvers
        .rectify(
            &left.camera,
            &right.camera,
            &fit.r,
            &fit.t,
            resolution,
            config.zero_disparity,
        )
        .map_err(|e| stereo_failed(format!("rectification: {e}")))?;

    let score = epipolar_score(fit.rms, &left.camera, &right.camera, config.intrinsics_mode);
    let rectified = rectified_error(&rectification, &left.camera, &right.camera, &fit.t, &common);
    info!(
        "pair {pair}: |T| {:.3}, rms {:.4}px, epipolar score {score:.3e}, rectified error {:.3}px",
        fit.t.norm(),
        fit.rms,
        rectified.mean
    );

    Ok(StereoPair {
        left: pair.left.clone(),
        right: pair.right.clone(),
        r: fit.r,
        t: fit.t,
        rms: fit.rms,
        rectification,
        resolution,
        epipolar_score: score,
        horizontal: rectified.horizontal,
        rectified_error: rectified,
        image_pairs: common.len(),
        points: common.total_points(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::collaborators::{ExtrinsicsFit, NativeSolvers, SolveFailed};
    use crate::config::IntrinsicsMode;
    use crate::correspondence::intersect;
    use rigcal_core::synthetic::{board_poses, observe};
    use rigcal_core::{
        isometry_from_rt, rotation_angle_deg, rotation_from_rpy_deg, CalibFlags, Camera,
        CharucoBoard, Distortion, FxFyCxCySkew,
    };

    /// Native solvers that remember the per-image point counts of the last
    /// stereo solve.
    #[derive(Default)]
    struct Recording {
        inner: NativeSolvers,
        counts: Mutex<Vec<usize>>,
    }

    impl SolveStereoExtrinsics for Recording {
        fn solve_extrinsics(
            &self,
            common: &CommonCorrespondences,
            left: &Camera,
            right: &Camera,
            r_guess: &Mat3,
            t_guess: &Vec3,
        ) -> Result<ExtrinsicsFit, SolveFailed> {
            *self.counts.lock().unwrap() = common.left.iter().map(|v| v.len()).collect();
            self.inner.solve_extrinsics(common, left, right, r_guess, t_guess)
        }
    }

    impl Rectify for Recording {
        fn rectify(
            &self,
            left: &Camera,
            right: &Camera,
            r: &Mat3,
            t: &Vec3,
            resolution: Resolution,
            zero_disparity: bool,
        ) -> Result<StereoRectification, SolveFailed> {
            self.inner.rectify(left, right, r, t, resolution, zero_disparity)
        }
    }

    fn camera(model: CameraModel) -> Camera {
        let distortion = match model {
            CameraModel::Fisheye => Distortion::from_coefficients(model, &[0.05, -0.01, 0.002, 0.0]),
            CameraModel::Perspective => Distortion::from_coefficients(model, &[-0.05, 0.01]),
        };
        Camera::new(
            FxFyCxCySkew {
                fx: 600.0,
                fy: 600.0,
                cx: 640.0,
                cy: 400.0,
                skew: 0.0,
            },
            distortion,
        )
    }

    /// Solve a synthetic pair whose image 1 has only 20 corners on the left.
    fn solve_uneven(model: CameraModel) -> (StereoPair, CommonCorrespondences, Vec<usize>, Mat3, Vec3) {
        let board = CharucoBoard::new(8, 6, 30.0, 22.0).unwrap();
        let res = Resolution::new(1280, 800);
        let cam = camera(model);
        let r = rotation_from_rpy_deg(0.3, -0.5, 0.2);
        let t = Vec3::new(-60.0, 0.5, 0.0);
        let rel = isometry_from_rt(&r, &t);

        let mut left = Vec::new();
        let mut right = Vec::new();
        for (i, pose) in board_poses(&board, 6, 450.0).iter().enumerate() {
            let mut obs = observe(&cam, &board, pose, res);
            if i == 1 {
                let keep: Vec<bool> = (0..obs.len()).map(|k| k < 20).collect();
                obs = obs.select(&keep);
            }
            left.push(obs);
            right.push(observe(&cam, &board, &(rel * pose), res));
        }
        let common = intersect(&left, &right, &board, IntrinsicsMode::PerCamera).unwrap();
        let params = CameraParameters::new(cam, res, CalibFlags::default());
        let solvers = Recording::default();
        let pair = solve_pair(
            &PairId::new("a", "b"),
            &params,
            &params,
            &common,
            &Mat3::identity(),
            &Vec3::new(-60.0, 0.0, 0.0),
            res,
            &StereoConfig::default(),
            &solvers,
        )
        .unwrap();
        let counts = solvers.counts.lock().unwrap().clone();
        (pair, common, counts, r, t)
    }

    #[test]
    fn fisheye_pairs_are_cut_to_the_smallest_image() {
        let (pair, common, counts, r, t) = solve_uneven(CameraModel::Fisheye);
        let n = common.min_points();
        assert!(n <= 20);
        assert!(common.left.iter().any(|v| v.len() > n));
        assert_eq!(counts, vec![n; common.len()]);
        assert_eq!(pair.points, n * common.len());
        assert!(rotation_angle_deg(&pair.r, &r) < 0.05);
        assert!((pair.t - t).norm() < 0.5, "t = {}", pair.t);
    }

    #[test]
    fn perspective_pairs_keep_every_point() {
        let (pair, common, counts, _, _) = solve_uneven(CameraModel::Perspective);
        let full: Vec<usize> = common.left.iter().map(|v| v.len()).collect();
        assert_eq!(counts, full);
        assert_eq!(pair.points, common.total_points());
    }
}
