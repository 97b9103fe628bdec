//! Pose of a planar target from 2D-3D correspondences.
//!
//! The direct solve undistorts the pixels, fits a board-to-image homography
//! and decomposes it. The robust solve wraps that in RANSAC and, in
//! [`solve_pose_escalating`], widens the inlier threshold in fixed steps
//! until enough of the view agrees with the pose.

use log::debug;
use rigcal_core::{
    ransac_fit, Camera, CorrespondenceView, Estimator, Iso3, Mat3, Pt2, Pt3, RansacOptions, Real,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::homography::dlt_homography;
use crate::planar_pose::estimate_planar_pose_from_h;

#[derive(Debug, Error, PartialEq)]
pub enum PnpError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("target points are not on the Z = 0 plane")]
    NonPlanarTarget,
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("ransac failed to find a consensus pose")]
    RansacFailed,
}

#[derive(Clone, Copy)]
struct PnpDatum {
    board: Pt2,
    pixel: Pt2,
    normalized: Pt2,
    camera: Camera,
}

impl PnpDatum {
    fn reprojection_error(&self, pose: &Iso3) -> Real {
        let p = Pt3::new(self.board.x, self.board.y, 0.0);
        match self.camera.project_point(pose, &p) {
            Some(px) => (px - self.pixel).norm(),
            None => Real::INFINITY,
        }
    }
}

fn build_data(view: &CorrespondenceView, camera: &Camera) -> Result<Vec<PnpDatum>, PnpError> {
    if view.len() < 4 {
        return Err(PnpError::NotEnoughPoints(view.len()));
    }
    let scale = view
        .points_3d
        .iter()
        .map(|p| p.coords.xy().norm())
        .fold(1.0, Real::max);
    if view.points_3d.iter().any(|p| p.z.abs() > 1e-9 * scale) {
        return Err(PnpError::NonPlanarTarget);
    }
    Ok(view
        .iter()
        .map(|(p3, px)| {
            let n = camera.undistort_pixel(px);
            PnpDatum {
                board: Pt2::new(p3.x, p3.y),
                pixel: *px,
                normalized: Pt2::new(n.x, n.y),
                camera: *camera,
            }
        })
        .collect())
}

fn fit_pose(data: &[PnpDatum], indices: &[usize]) -> Option<Iso3> {
    let (board, normalized): (Vec<Pt2>, Vec<Pt2>) = indices
        .iter()
        .map(|&i| (data[i].board, data[i].normalized))
        .unzip();
    let h = dlt_homography(&board, &normalized).ok()?;
    estimate_planar_pose_from_h(&Mat3::identity(), &h)
}

fn collinear(a: &Pt2, b: &Pt2, c: &Pt2) -> bool {
    let ab = b - a;
    let ac = c - a;
    let area = (ab.x * ac.y - ab.y * ac.x).abs();
    area <= 1e-9 * ab.norm_squared().max(ac.norm_squared()).max(Real::EPSILON)
}

struct PlanarPoseEstimator;

impl Estimator for PlanarPoseEstimator {
    type Datum = PnpDatum;
    type Model = Iso3;

    const MIN_SAMPLES: usize = 4;

    fn fit(data: &[PnpDatum], sample_indices: &[usize]) -> Option<Iso3> {
        fit_pose(data, sample_indices)
    }

    fn residual(model: &Iso3, datum: &PnpDatum) -> f64 {
        datum.reprojection_error(model)
    }

    fn is_degenerate(data: &[PnpDatum], idx: &[usize]) -> bool {
        let p: Vec<Pt2> = idx.iter().map(|&i| data[i].board).collect();
        (0..p.len()).any(|skip| {
            let rest: Vec<&Pt2> = p
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, q)| q)
                .collect();
            rest.len() == 3 && collinear(rest[0], rest[1], rest[2])
        })
    }

    fn refit(data: &[PnpDatum], inliers: &[usize]) -> Option<Iso3> {
        fit_pose(data, inliers)
    }
}

/// Closed-form pose solvers for planar targets.
#[derive(Debug, Clone, Copy)]
pub struct PlanarPnp;

impl PlanarPnp {
    /// Pose from all correspondences, no outlier handling.
    pub fn direct(view: &CorrespondenceView, camera: &Camera) -> Result<Iso3, PnpError> {
        let data = build_data(view, camera)?;
        let all: Vec<usize> = (0..data.len()).collect();
        fit_pose(&data, &all).ok_or(PnpError::Degenerate)
    }

    /// RANSAC pose; returns the pose and the inlier indices.
    pub fn ransac(
        view: &CorrespondenceView,
        camera: &Camera,
        opts: &RansacOptions,
    ) -> Result<(Iso3, Vec<usize>), PnpError> {
        let data = build_data(view, camera)?;
        let opts = RansacOptions {
            min_inliers: opts.min_inliers.max(PlanarPoseEstimator::MIN_SAMPLES),
            ..*opts
        };
        let res = ransac_fit::<PlanarPoseEstimator>(&data, &opts);
        match res.model {
            Some(pose) => Ok((pose, res.inliers)),
            None => Err(PnpError::RansacFailed),
        }
    }

    /// Per-point reprojection errors of `view` under `pose`.
    pub fn reprojection_errors(view: &CorrespondenceView, camera: &Camera, pose: &Iso3) -> Vec<Real> {
        view.iter()
            .map(|(p3, px)| match camera.project_point(pose, p3) {
                Some(proj) => (proj - px).norm(),
                None => Real::INFINITY,
            })
            .collect()
    }
}

/// Inlier-threshold ladder for the robust pose solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLadder {
    /// First RANSAC threshold in pixels.
    pub initial: Real,
    /// Increment applied after each attempt that misses the inlier target.
    pub step: Real,
    /// Largest threshold tried.
    pub max: Real,
    /// Fraction of the view that must be inliers to stop early.
    pub min_inlier_fraction: Real,
}

impl Default for ThresholdLadder {
    fn default() -> Self {
        Self {
            initial: 5.0,
            step: 1.0,
            max: 25.0,
            min_inlier_fraction: 0.9,
        }
    }
}

/// Result of [`solve_pose_escalating`].
#[derive(Debug, Clone)]
pub struct RobustPose {
    pub pose: Iso3,
    pub inliers: Vec<usize>,
    /// Threshold of the attempt that produced `pose`.
    pub threshold: Real,
    /// RANSAC runs performed.
    pub attempts: usize,
    /// `false` when the ladder was exhausted before reaching the inlier target.
    pub converged: bool,
}

impl RobustPose {
    pub fn inlier_fraction(&self, total: usize) -> Real {
        if total == 0 {
            0.0
        } else {
            self.inliers.len() as Real / total as Real
        }
    }
}

/// Robust pose with an escalating threshold.
///
/// Runs RANSAC at `ladder.initial`, `initial + step`, ... up to `ladder.max`
/// and stops at the first attempt whose inlier fraction reaches
/// `ladder.min_inlier_fraction`. When the ladder runs out the last successful
/// attempt is returned with `converged == false`; if no attempt found any
/// consensus the direct solve is used instead.
pub fn solve_pose_escalating(
    view: &CorrespondenceView,
    camera: &Camera,
    ladder: &ThresholdLadder,
    opts: &RansacOptions,
) -> Result<RobustPose, PnpError> {
    let total = view.len();
    let step = if ladder.step > 0.0 { ladder.step } else { 1.0 };
    let mut threshold = ladder.initial;
    let mut attempts = 0;
    let mut last: Option<RobustPose> = None;

    while threshold <= ladder.max {
        attempts += 1;
        let run = RansacOptions {
            thresh: threshold,
            ..*opts
        };
        match PlanarPnp::ransac(view, camera, &run) {
            Ok((pose, inliers)) => {
                let candidate = RobustPose {
                    pose,
                    inliers,
                    threshold,
                    attempts,
                    converged: false,
                };
                if candidate.inlier_fraction(total) >= ladder.min_inlier_fraction {
                    return Ok(RobustPose {
                        converged: true,
                        ..candidate
                    });
                }
                last = Some(candidate);
            }
            Err(PnpError::RansacFailed) => {}
            Err(e) => return Err(e),
        }
        threshold += step;
    }

    match last {
        Some(pose) => {
            debug!(
                "pose ladder exhausted at {:.2}px with {}/{} inliers",
                pose.threshold,
                pose.inliers.len(),
                total
            );
            Ok(RobustPose { attempts, ..pose })
        }
        None => {
            let pose = PlanarPnp::direct(view, camera)?;
            Ok(RobustPose {
                pose,
                inliers: (0..total).collect(),
                threshold: ladder.max,
                attempts,
                converged: false,
            })
        }
    }
}
