//! Multi-camera Charuco rig calibration.
//!
//! [`calibrate_rig`] takes a [`RigTopology`], per-camera detector output and
//! the board geometry, refines each camera's intrinsics with iterative
//! outlier rejection, then solves and rectifies every declared camera pair.
//! Failures are attributed to single cameras or pairs and returned next to
//! the successes in a [`RigCalibrationResult`].
//!
//! ```no_run
//! use rigcal_core::CharucoBoard;
//! use rigcal_pipeline::{calibrate_rig, CalibrationOptions, RigObservations, RigTopology};
//!
//! # fn main() -> anyhow::Result<()> {
//! let topology: RigTopology = serde_json::from_str(&std::fs::read_to_string("rig.json")?)?;
//! let observations: RigObservations =
//!     serde_json::from_str(&std::fs::read_to_string("corners.json")?)?;
//! let board = CharucoBoard::new(8, 6, 4.0, 3.0)?;
//! let result = calibrate_rig(&topology, &observations.sanitized()?, &board, &CalibrationOptions::default());
//! println!("{:?}", result.state);
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod correspondence;
pub mod dispatch;
pub mod epipolar;
pub mod error;
pub mod observations;
pub mod orchestrator;
pub mod outlier;
pub mod refiner;
pub mod resolution;
pub mod result;
pub mod schedule;
pub mod stereo;
pub mod topology;

pub use collaborators::{
    ExtrinsicsFit, IntrinsicsFit, NativeSolvers, Rectify, RigSolvers, SolveFailed, SolveIntrinsics,
    SolvePoseRobust, SolveStereoExtrinsics,
};
pub use config::{CalibrationOptions, IntrinsicsMode, RefinementConfig, StereoConfig};
pub use correspondence::{common_ids, intersect, CommonCorrespondences};
pub use dispatch::{BatchResults, DeferredBatch, ExecutionMode, TaskHandle};
pub use epipolar::{epipolar_score, rectified_error, RectifiedError};
pub use error::{CalibrationError, PairId, Unit, UnitFailure};
pub use observations::RigObservations;
pub use orchestrator::{calibrate_rig, calibrate_rig_with};
pub use outlier::{filter_outliers, FilterOutcome, FilterStats};
pub use refiner::{refine_camera, RefineFailure, RefinedCamera, RoundDiagnostics};
pub use resolution::{reconcile, scale_image, scale_intrinsics, scale_observation, Reconciliation, ReconcileError};
pub use result::{CameraCalibration, PipelineState, RigCalibrationResult, StereoConfigResult};
pub use schedule::RefinementSchedule;
pub use stereo::{solve_pair, StereoPair};
pub use topology::{CameraSpec, Edge, ExtrinsicsGuess, RigTopology, Rpy, StereoPairConfig};
