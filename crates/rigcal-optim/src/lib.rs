//! Non-linear least squares refinement for rig calibration.
//!
//! Problems implement [`NllsProblem`] over dense parameter vectors and are
//! solved with the MINPACK Levenberg-Marquardt port in [`LmBackend`].
//! Jacobians are central differences assembled block by block
//! ([`jacobian::fill_columns`]).
//!
//! - [`calibrate_intrinsics`]: camera intrinsics, distortion and board poses.
//! - [`refine_pose`]: one board pose with the camera fixed.
//! - [`calibrate_stereo`]: relative pose of a pair with both cameras fixed,
//!   optionally started from [`best_stereo_start`].

mod backend_lm;
mod intrinsics;
pub mod jacobian;
pub mod params;
mod pose;
mod stereo;
mod traits;

pub use backend_lm::LmBackend;
pub use intrinsics::{
    calibrate_intrinsics, reprojection_errors, IntrinsicsProblem, IntrinsicsSolution,
    IntrinsicsSolveError, MIN_VIEW_POINTS,
};
pub use pose::{refine_pose, PoseRefineError, PoseSolution};
pub use stereo::{best_stereo_start, calibrate_stereo, StereoSolution, StereoSolveError, StereoStart};
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
