//! Per-unit failures.
//!
//! Every failure is attributed to the smallest unit it affects (one camera,
//! one camera pair, or the rig as a whole for topology problems) and is
//! recorded in the result next to the successes. Nothing here aborts a run.

use std::fmt;

use rigcal_core::Resolution;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationError {
    #[error("image {image} has {found} corners, need at least {required}")]
    DetectionFailed {
        image: usize,
        found: usize,
        required: usize,
    },
    #[error("intrinsic solve failed in round {round}: {reason}")]
    IntrinsicSolveFailed {
        camera: String,
        round: usize,
        reason: String,
    },
    #[error("image pair {image} shares {found} corners, need at least {required}")]
    InsufficientCommonFeatures {
        image: usize,
        found: usize,
        required: usize,
    },
    #[error("cannot bring {from} to {to}: rescaled height {scaled_height} is too small")]
    InsufficientResolution {
        from: Resolution,
        to: Resolution,
        scaled_height: u32,
    },
    #[error("stereo solve failed: {reason}")]
    StereoSolveFailed { reason: String },
    #[error("camera {camera} has no intrinsics")]
    MissingIntrinsics { camera: String },
    #[error("invalid rig topology: {reason}")]
    InvalidTopology { reason: String },
}

/// Ordered camera pair, `left` being the camera that declares the edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairId {
    pub left: String,
    pub right: String,
}

impl PairId {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Whether this pair joins `a` and `b` in either direction.
    pub fn joins(&self, a: &str, b: &str) -> bool {
        (self.left == a && self.right == b) || (self.left == b && self.right == a)
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.left, self.right)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Rig,
    Camera(String),
    Pair(PairId),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Rig => f.write_str("rig"),
            Unit::Camera(name) => write!(f, "camera {name}"),
            Unit::Pair(pair) => write!(f, "pair {pair}"),
        }
    }
}

/// One entry of the result's failure list: `{unit, kind, ..., message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: Unit,
    #[serde(flatten)]
    pub error: CalibrationError,
    pub message: String,
}

impl UnitFailure {
    pub fn new(unit: Unit, error: CalibrationError) -> Self {
        let message = error.to_string();
        Self {
            unit,
            error,
            message,
        }
    }
}
