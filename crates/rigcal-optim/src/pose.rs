//! Single-view pose refinement with fixed intrinsics.

use nalgebra::DVector;
use rigcal_core::{Camera, CorrespondenceView, Iso3, Real};
use thiserror::Error;

use crate::intrinsics::{point_rms, push_view_residuals, MIN_VIEW_POINTS};
use crate::params::{pack_pose, unpack_pose, POSE_DIM};
use crate::{LmBackend, NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

#[derive(Debug, Error, PartialEq)]
pub enum PoseRefineError {
    #[error("need at least {MIN_VIEW_POINTS} points, got {0}")]
    TooFewPoints(usize),
    #[error("pose refinement diverged")]
    Diverged,
}

struct PoseProblem<'a> {
    view: &'a CorrespondenceView,
    camera: &'a Camera,
}

impl NllsProblem for PoseProblem<'_> {
    fn num_params(&self) -> usize {
        POSE_DIM
    }

    fn num_residuals(&self) -> usize {
        2 * self.view.len()
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut r = Vec::with_capacity(self.num_residuals());
        push_view_residuals(self.camera, &unpack_pose(x.as_slice()), self.view, &mut r);
        DVector::from_vec(r)
    }
}

#[derive(Debug, Clone)]
pub struct PoseSolution {
    pub pose: Iso3,
    pub rms: Real,
    pub report: SolveReport,
}

/// Minimise the reprojection error of `view` over the board pose.
pub fn refine_pose(
    view: &CorrespondenceView,
    camera: &Camera,
    initial: &Iso3,
    opts: &SolveOptions,
) -> Result<PoseSolution, PoseRefineError> {
    if view.len() < MIN_VIEW_POINTS {
        return Err(PoseRefineError::TooFewPoints(view.len()));
    }
    let problem = PoseProblem { view, camera };
    let x0 = DVector::from_row_slice(&pack_pose(initial));
    let (x, report) = LmBackend.solve(&problem, x0, opts);
    if x.iter().any(|v| !v.is_finite()) {
        return Err(PoseRefineError::Diverged);
    }
    Ok(PoseSolution {
        pose: unpack_pose(x.as_slice()),
        rms: point_rms(problem.residuals(&x).as_slice()),
        report,
    })
}
