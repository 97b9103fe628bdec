//! Relative pose of a camera pair with both cameras' intrinsics held fixed.
//!
//! Unknowns are the right-from-left transform and one board pose per image
//! pair (in the left camera). The right camera sees the board through
//! `T_rl * T_lb`, so every image pair constrains the relative pose directly.

use log::debug;
use nalgebra::{DMatrix, DVector};
use rigcal_core::{isometry_from_rt, Camera, CorrespondenceView, Iso3, Mat3, Real, Vec3};
use rigcal_linear::{PlanarPnp, PnpError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intrinsics::{point_rms, push_view_residuals, MIN_VIEW_POINTS};
use crate::jacobian::fill_columns;
use crate::params::{pack_pose, unpack_pose, POSE_DIM};
use crate::{LmBackend, NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

#[derive(Debug, Error)]
pub enum StereoSolveError {
    #[error("no image pairs to solve")]
    NoViews,
    #[error("image pair {view}: left and right views differ")]
    Mismatch { view: usize },
    #[error("image pair {view} has {count} points, need at least {MIN_VIEW_POINTS}")]
    TooFewPoints { view: usize, count: usize },
    #[error("initial pose for image pair {view} failed: {source}")]
    InitialPose {
        view: usize,
        #[source]
        source: PnpError,
    },
    #[error("stereo solve diverged")]
    Diverged,
}

/// Where [`calibrate_stereo`] callers take the starting relative pose from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoStart {
    /// The supplied guess, as is.
    #[default]
    Guess,
    /// The best of the guess and the per-image closed-form estimates.
    BestOfViews,
}

struct StereoProblem<'a> {
    left: &'a [CorrespondenceView],
    right: &'a [CorrespondenceView],
    left_camera: &'a Camera,
    right_camera: &'a Camera,
    row_offsets: Vec<usize>,
    num_residuals: usize,
}

impl<'a> StereoProblem<'a> {
    fn new(
        left: &'a [CorrespondenceView],
        right: &'a [CorrespondenceView],
        left_camera: &'a Camera,
        right_camera: &'a Camera,
    ) -> Self {
        let mut row_offsets = Vec::with_capacity(left.len());
        let mut rows = 0;
        for v in left {
            row_offsets.push(rows);
            rows += 4 * v.len();
        }
        Self {
            left,
            right,
            left_camera,
            right_camera,
            row_offsets,
            num_residuals: rows,
        }
    }

    fn pose_offset(view: usize) -> usize {
        POSE_DIM * (view + 1)
    }

    fn pack(relative: &Iso3, left_poses: &[Iso3]) -> DVector<Real> {
        let mut x = Vec::with_capacity(POSE_DIM * (left_poses.len() + 1));
        x.extend(pack_pose(relative));
        for pose in left_poses {
            x.extend(pack_pose(pose));
        }
        DVector::from_vec(x)
    }

    fn view_residuals(&self, view: usize, relative: &Iso3, left_pose: &Iso3, out: &mut Vec<Real>) {
        push_view_residuals(self.left_camera, left_pose, &self.left[view], out);
        push_view_residuals(self.right_camera, &(relative * left_pose), &self.right[view], out);
    }
}

impl NllsProblem for StereoProblem<'_> {
    fn num_params(&self) -> usize {
        Self::pose_offset(self.left.len())
    }

    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let s = x.as_slice();
        let relative = unpack_pose(s);
        let mut r = Vec::with_capacity(self.num_residuals);
        for view in 0..self.left.len() {
            let left_pose = unpack_pose(&s[Self::pose_offset(view)..]);
            self.view_residuals(view, &relative, &left_pose, &mut r);
        }
        DVector::from_vec(r)
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut jac = DMatrix::zeros(self.num_residuals, self.num_params());
        fill_columns(&mut jac, 0, 0..POSE_DIM, x, |p| self.residuals(p));

        let relative = unpack_pose(x.as_slice());
        for view in 0..self.left.len() {
            let off = Self::pose_offset(view);
            fill_columns(&mut jac, self.row_offsets[view], off..off + POSE_DIM, x, |p| {
                let left_pose = unpack_pose(&p.as_slice()[off..]);
                let mut r = Vec::with_capacity(4 * self.left[view].len());
                self.view_residuals(view, &relative, &left_pose, &mut r);
                DVector::from_vec(r)
            });
        }
        jac
    }
}

/// Output of [`calibrate_stereo`].
#[derive(Debug, Clone)]
pub struct StereoSolution {
    /// Rotation taking left-camera coordinates to right-camera coordinates.
    pub r: Mat3,
    /// Translation of the same transform, in board units.
    pub t: Vec3,
    pub left_poses: Vec<Iso3>,
    /// Reprojection RMS over both cameras, in pixels.
    pub rms: Real,
    pub report: SolveReport,
}

fn check_views(
    left: &[CorrespondenceView],
    right: &[CorrespondenceView],
) -> Result<(), StereoSolveError> {
    if left.is_empty() {
        return Err(StereoSolveError::NoViews);
    }
    for (view, (l, r)) in left.iter().zip(right).enumerate() {
        if l.points_3d != r.points_3d {
            return Err(StereoSolveError::Mismatch { view });
        }
        if l.len() < MIN_VIEW_POINTS {
            return Err(StereoSolveError::TooFewPoints {
                view,
                count: l.len(),
            });
        }
    }
    if left.len() != right.len() {
        return Err(StereoSolveError::Mismatch {
            view: left.len().min(right.len()),
        });
    }
    Ok(())
}

/// Closed-form board pose per view.
fn direct_poses(views: &[CorrespondenceView], camera: &Camera) -> Result<Vec<Iso3>, StereoSolveError> {
    views
        .iter()
        .enumerate()
        .map(|(view, v)| {
            PlanarPnp::direct(v, camera).map_err(|source| StereoSolveError::InitialPose { view, source })
        })
        .collect()
}

/// Pick a starting relative pose for [`calibrate_stereo`].
///
/// Candidates are `(r_guess, t_guess)` and `right_i * left_i^-1` from each
/// image pair's closed-form board poses; the one with the lowest stereo
/// reprojection cost wins.
pub fn best_stereo_start(
    left: &[CorrespondenceView],
    right: &[CorrespondenceView],
    left_camera: &Camera,
    right_camera: &Camera,
    r_guess: &Mat3,
    t_guess: &Vec3,
) -> Result<Iso3, StereoSolveError> {
    check_views(left, right)?;
    let left_poses = direct_poses(left, left_camera)?;
    let right_poses = direct_poses(right, right_camera)?;

    let problem = StereoProblem::new(left, right, left_camera, right_camera);
    let cost = |relative: &Iso3| {
        problem
            .residuals(&StereoProblem::pack(relative, &left_poses))
            .norm_squared()
    };
    let guess = isometry_from_rt(r_guess, t_guess);
    let guess_cost = cost(&guess);
    let mut best = (None, guess, guess_cost);
    for (view, (l, r)) in left_poses.iter().zip(&right_poses).enumerate() {
        let candidate = r * l.inverse();
        let c = cost(&candidate);
        if c < best.2 {
            best = (Some(view), candidate, c);
        }
    }
    if let (Some(view), _, c) = best {
        debug!("stereo: image pair {view} replaces the supplied guess as start (cost {c:.3e} < {guess_cost:.3e})");
    }
    Ok(best.1)
}

/// Solve the right-from-left extrinsics of a calibrated pair.
///
/// `left[i]` and `right[i]` must hold the same board points in the same
/// order. `(r_guess, t_guess)` is the starting relative pose; see
/// [`best_stereo_start`] for picking one from the data.
pub fn calibrate_stereo(
    left: &[CorrespondenceView],
    right: &[CorrespondenceView],
    left_camera: &Camera,
    right_camera: &Camera,
    r_guess: &Mat3,
    t_guess: &Vec3,
    opts: &SolveOptions,
) -> Result<StereoSolution, StereoSolveError> {
    check_views(left, right)?;
    let left_poses = direct_poses(left, left_camera)?;
    let problem = StereoProblem::new(left, right, left_camera, right_camera);
    let start = isometry_from_rt(r_guess, t_guess);

    let x0 = StereoProblem::pack(&start, &left_poses);
    let (x, report) = LmBackend.solve(&problem, x0, opts);
    if x.iter().any(|v| !v.is_finite()) {
        return Err(StereoSolveError::Diverged);
    }

    let s = x.as_slice();
    let relative = unpack_pose(s);
    let left_poses = (0..left.len())
        .map(|view| unpack_pose(&s[StereoProblem::pose_offset(view)..]))
        .collect();
    let rms = point_rms(problem.residuals(&x).as_slice());
    debug!(
        "stereo: {} image pairs, rms {:.4}px, |T| {:.3}",
        left.len(),
        rms,
        relative.translation.vector.norm()
    );

    Ok(StereoSolution {
        r: *relative.rotation.to_rotation_matrix().matrix(),
        t: relative.translation.vector,
        left_poses,
        rms,
        report,
    })
}
