//! Pipeline configuration.
//!
//! Everything deserializes from JSON with defaults, so an empty object `{}`
//! is a valid [`CalibrationOptions`].

use rigcal_core::{RansacOptions, Real};
use rigcal_optim::{SolveOptions, StereoStart};
use serde::{Deserialize, Serialize};

/// Knobs for the per-camera refinement loop and its derived schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Refinement rounds after the initial solve.
    pub rounds: usize,
    /// Round-1 filter threshold is `first_round_factor * h / reference_height`.
    pub first_round_factor: Real,
    /// Filter threshold for later rounds, same scaling.
    pub later_round_factor: Real,
    pub reference_height: Real,
    /// First robust-pose inlier threshold, in pixels.
    pub ransac_initial_threshold: Real,
    pub ransac_threshold_step: Real,
    /// Ladder ceiling: `base + gain * (hfov / 30 + h / reference_height * 0.2)`.
    pub max_threshold_base: Real,
    pub max_threshold_gain: Real,
    /// Inlier target: `1 - gain * (hfov / 60 + h / reference_height * 0.2)`.
    pub min_filtered_gain: Real,
    pub ransac: RansacOptions,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            rounds: 5,
            first_round_factor: 2.0,
            later_round_factor: 5.0,
            reference_height: 800.0,
            ransac_initial_threshold: 5.0,
            ransac_threshold_step: 1.0,
            max_threshold_base: 10.0,
            max_threshold_gain: 15.0,
            min_filtered_gain: 0.05,
            ransac: RansacOptions::default(),
        }
    }
}

/// Whether the two cameras of a pair are treated as sharing intrinsics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrinsicsMode {
    #[default]
    PerCamera,
    Shared,
}

impl IntrinsicsMode {
    /// Fewest common corners an image pair needs in this mode.
    pub fn min_common_points(self) -> usize {
        match self {
            IntrinsicsMode::PerCamera => 6,
            IntrinsicsMode::Shared => 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoConfig {
    pub intrinsics_mode: IntrinsicsMode,
    /// Give both rectified cameras the same principal point.
    pub zero_disparity: bool,
    /// Starting relative pose: the topology guess unless set otherwise.
    pub start: StereoStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    pub refinement: RefinementConfig,
    pub stereo: StereoConfig,
    pub solver: SolveOptions,
    /// Cameras left out of the run; their entries stay empty.
    pub disabled_cameras: Vec<String>,
    /// Run batches on the rayon pool instead of the calling thread.
    pub parallel: bool,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            refinement: RefinementConfig::default(),
            stereo: StereoConfig::default(),
            solver: SolveOptions::default(),
            disabled_cameras: Vec::new(),
            parallel: true,
        }
    }
}

impl CalibrationOptions {
    pub fn is_disabled(&self, camera: &str) -> bool {
        self.disabled_cameras.iter().any(|c| c == camera)
    }
}
