//! Entry crate for the `rigcal` toolbox.
//!
//! Calibrates a rig of Charuco-observing cameras: per-camera intrinsics with
//! iterative outlier rejection, then relative pose, rectification and
//! epipolar quality for every declared camera pair.
//!
//! ```no_run
//! use rigcal::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let topology: RigTopology = serde_json::from_str(&std::fs::read_to_string("rig.json")?)?;
//! let observations: RigObservations =
//!     serde_json::from_str(&std::fs::read_to_string("corners.json")?)?;
//! let board = CharucoBoard::new(8, 6, 4.0, 3.0)?;
//!
//! let result = calibrate_rig(&topology, &observations.sanitized()?, &board, &CalibrationOptions::default());
//! for pair in &result.pairs {
//!     println!("{} -> {}: |T| = {:.2}, score {:.2e}", pair.left, pair.right, pair.t.norm(), pair.epipolar_score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - **[`core`]**: math types, camera models, board geometry, RANSAC
//! - **[`linear`]**: homography, Zhang, planar PnP, stereo rectification
//! - **[`optim`]**: Levenberg-Marquardt problems for intrinsics, poses and pairs
//! - **[`pipeline`]**: the rig calibration pipeline
//! - **[`prelude`]**: common re-exports

/// Core math types, camera models and observations.
pub mod core {
    pub use rigcal_core::*;
}

/// Closed-form initialisation and rectification.
pub mod linear {
    pub use rigcal_linear::*;
}

/// Non-linear least-squares problems and the LM backend.
pub mod optim {
    pub use rigcal_optim::*;
}

/// Rig calibration pipeline.
pub mod pipeline {
    pub use rigcal_pipeline::*;
}

/// Import with `use rigcal::prelude::*;`.
pub mod prelude {
    pub use crate::core::{
        CalibFlag, CalibFlags, Camera, CameraModel, CameraObservation, CameraParameters,
        CharucoBoard, Distortion, FxFyCxCySkew, Iso3, Mat3, Pt2, Pt3, Real, Resolution, Vec3,
    };
    pub use crate::pipeline::{
        calibrate_rig, calibrate_rig_with, CalibrationError, CalibrationOptions, CameraCalibration,
        IntrinsicsMode, PipelineState, RigCalibrationResult, RigObservations, RigTopology,
        StereoPair,
    };
}
