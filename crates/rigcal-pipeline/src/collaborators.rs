//! Solver seams used by the pipeline.
//!
//! The pipeline only talks to these traits, so tests can count or fail
//! individual solves. [`NativeSolvers`] implements all of them on top of
//! `rigcal-linear` and `rigcal-optim`.

use std::fmt::Display;

use log::debug;
use rigcal_core::{
    CalibFlags, Camera, CorrespondenceView, Iso3, Mat3, RansacOptions, Real, Resolution, Vec3,
};
use rigcal_linear::{
    solve_pose_escalating, stereo_rectify, PlanarPnp, RobustPose, StereoRectification,
    ThresholdLadder,
};
use rigcal_optim::{
    best_stereo_start, calibrate_intrinsics, calibrate_stereo, refine_pose, SolveOptions, StereoStart,
    MIN_VIEW_POINTS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correspondence::CommonCorrespondences;

/// Opaque failure reported by a collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct SolveFailed(pub String);

impl SolveFailed {
    pub fn from_error(err: impl Display) -> Self {
        Self(err.to_string())
    }
}

/// Output of [`SolveIntrinsics`].
#[derive(Debug, Clone)]
pub struct IntrinsicsFit {
    pub camera: Camera,
    /// Board pose per input view.
    pub poses: Vec<Iso3>,
    pub rms: Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtrinsicsFit {
    /// Right-from-left rotation.
    pub r: Mat3,
    pub t: Vec3,
    /// Reprojection RMS over both cameras.
    pub rms: Real,
}

/// Joint intrinsics and board poses from all views of one camera.
pub trait SolveIntrinsics {
    fn solve_intrinsics(
        &self,
        views: &[CorrespondenceView],
        resolution: Resolution,
        initial: &Camera,
        flags: CalibFlags,
    ) -> Result<IntrinsicsFit, SolveFailed>;
}

pub trait SolvePoseRobust {
    /// Pose with outlier rejection over the threshold ladder.
    fn solve_pose_robust(
        &self,
        view: &CorrespondenceView,
        camera: &Camera,
        ladder: &ThresholdLadder,
    ) -> Result<RobustPose, SolveFailed>;

    /// Pose from all points, for fixed-focus sensors.
    fn solve_pose_direct(&self, view: &CorrespondenceView, camera: &Camera) -> Result<Iso3, SolveFailed>;
}

/// Relative pose of a calibrated pair.
pub trait SolveStereoExtrinsics {
    /// Intrinsics of both cameras are held fixed.
    fn solve_extrinsics(
        &self,
        common: &CommonCorrespondences,
        left: &Camera,
        right: &Camera,
        r_guess: &Mat3,
        t_guess: &Vec3,
    ) -> Result<ExtrinsicsFit, SolveFailed>;
}

/// Rectifying rotations and projections for a solved pair.
pub trait Rectify {
    fn rectify(
        &self,
        left: &Camera,
        right: &Camera,
        r: &Mat3,
        t: &Vec3,
        resolution: Resolution,
        zero_disparity: bool,
    ) -> Result<StereoRectification, SolveFailed>;
}

/// Everything the orchestrator needs.
pub trait RigSolvers: SolveIntrinsics + SolvePoseRobust + SolveStereoExtrinsics + Rectify {}

impl<T> RigSolvers for T where T: SolveIntrinsics + SolvePoseRobust + SolveStereoExtrinsics + Rectify {}

/// Default implementations backed by the workspace solvers.
#[derive(Debug, Clone, Default)]
pub struct NativeSolvers {
    pub ransac: RansacOptions,
    pub solve: SolveOptions,
    /// Where the stereo solve starts; see [`StereoStart`].
    pub stereo_start: StereoStart,
}

impl NativeSolvers {
    pub fn new(ransac: RansacOptions, solve: SolveOptions) -> Self {
        Self {
            ransac,
            solve,
            stereo_start: StereoStart::Guess,
        }
    }

    pub fn with_stereo_start(self, stereo_start: StereoStart) -> Self {
        Self { stereo_start, ..self }
    }
}

impl SolveIntrinsics for NativeSolvers {
    fn solve_intrinsics(
        &self,
        views: &[CorrespondenceView],
        _resolution: Resolution,
        initial: &Camera,
        flags: CalibFlags,
    ) -> Result<IntrinsicsFit, SolveFailed> {
        let sol = calibrate_intrinsics(views, initial, flags, &self.solve).map_err(SolveFailed::from_error)?;
        Ok(IntrinsicsFit {
            camera: sol.camera,
            poses: sol.poses,
            rms: sol.rms,
        })
    }
}

impl SolvePoseRobust for NativeSolvers {
    fn solve_pose_robust(
        &self,
        view: &CorrespondenceView,
        camera: &Camera,
        ladder: &ThresholdLadder,
    ) -> Result<RobustPose, SolveFailed> {
        let robust =
            solve_pose_escalating(view, camera, ladder, &self.ransac).map_err(SolveFailed::from_error)?;
        if robust.inliers.len() < MIN_VIEW_POINTS {
            return Ok(robust);
        }

        // Polish on the consensus set.
        let inliers = CorrespondenceView {
            points_3d: robust.inliers.iter().map(|&i| view.points_3d[i]).collect(),
            points_2d: robust.inliers.iter().map(|&i| view.points_2d[i]).collect(),
        };
        match refine_pose(&inliers, camera, &robust.pose, &self.solve) {
            Ok(refined) => Ok(RobustPose {
                pose: refined.pose,
                ..robust
            }),
            Err(err) => {
                debug!("pose polish failed, keeping RANSAC pose: {err}");
                Ok(robust)
            }
        }
    }

    fn solve_pose_direct(&self, view: &CorrespondenceView, camera: &Camera) -> Result<Iso3, SolveFailed> {
        let pose = PlanarPnp::direct(view, camera).map_err(SolveFailed::from_error)?;
        Ok(refine_pose(view, camera, &pose, &self.solve).map_or(pose, |r| r.pose))
    }
}

impl SolveStereoExtrinsics for NativeSolvers {
    fn solve_extrinsics(
        &self,
        common: &CommonCorrespondences,
        left: &Camera,
        right: &Camera,
        r_guess: &Mat3,
        t_guess: &Vec3,
    ) -> Result<ExtrinsicsFit, SolveFailed> {
        let (r0, t0) = match self.stereo_start {
            StereoStart::Guess => (*r_guess, *t_guess),
            StereoStart::BestOfViews => {
                let start = best_stereo_start(&common.left, &common.right, left, right, r_guess, t_guess)
                    .map_err(SolveFailed::from_error)?;
                (*start.rotation.to_rotation_matrix().matrix(), start.translation.vector)
            }
        };
        let sol = calibrate_stereo(&common.left, &common.right, left, right, &r0, &t0, &self.solve)
            .map_err(SolveFailed::from_error)?;
        Ok(ExtrinsicsFit {
            r: sol.r,
            t: sol.t,
            rms: sol.rms,
        })
    }
}

impl Rectify for NativeSolvers {
    fn rectify(
        &self,
        left: &Camera,
        right: &Camera,
        r: &Mat3,
        t: &Vec3,
        resolution: Resolution,
        zero_disparity: bool,
    ) -> Result<StereoRectification, SolveFailed> {
        stereo_rectify(left, right, resolution, r, t, zero_disparity).map_err(SolveFailed::from_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::synthetic::{board_poses, observe, with_outlier};
    use rigcal_core::{rotation_angle_deg, CameraModel, CharucoBoard, Distortion, FxFyCxCySkew, Pt2};

    #[test]
    fn robust_pose_ignores_outlier_and_polishes() {
        let res = Resolution::new(1280, 800);
        let camera = Camera::new(
            FxFyCxCySkew::from_hfov(res.width, res.height, 70.0),
            Distortion::zero(CameraModel::Perspective),
        );
        let board = CharucoBoard::new(8, 6, 30.0, 22.0).unwrap();
        let truth = board_poses(&board, 3, 600.0)[1];
        let obs = with_outlier(&observe(&camera, &board, &truth, res), 4, Pt2::new(60.0, 40.0));
        let view = obs.to_view(&board).unwrap();

        let solvers = NativeSolvers::default();
        let pose = solvers
            .solve_pose_robust(&view, &camera, &ThresholdLadder::default())
            .unwrap();
        assert!(pose.converged);
        assert!(!pose.inliers.contains(&4));
        assert!((pose.pose.translation.vector - truth.translation.vector).norm() < 1e-3);
        let dr = rotation_angle_deg(
            pose.pose.rotation.to_rotation_matrix().matrix(),
            truth.rotation.to_rotation_matrix().matrix(),
        );
        assert!(dr < 1e-4);
    }
}
