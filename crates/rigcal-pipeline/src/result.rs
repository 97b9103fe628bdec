//! Output of a rig calibration run.

use std::collections::BTreeMap;

use rigcal_core::{CameraParameters, Mat3, Mat34, Real};
use serde::{Deserialize, Serialize};

use crate::error::{PairId, Unit, UnitFailure};
use crate::refiner::{RefinedCamera, RoundDiagnostics};
use crate::schedule::RefinementSchedule;
use crate::stereo::StereoPair;

/// Orchestrator progress; a finished run is `Assembled` or `Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    PerCameraIntrinsics,
    PerPairExtrinsics,
    Assembled,
    Failed,
}

/// Per-camera entry. Disabled and failed cameras keep an entry with no
/// parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    /// False for cameras disabled by configuration.
    pub enabled: bool,
    /// Refined intrinsics; `None` unless every round succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<CameraParameters>,
    /// Distortion vector in OpenCV order, sized by model and flags.
    pub distortion: Vec<Real>,
    /// Reprojection RMS of the last completed solve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rms: Option<Real>,
    /// Completed rounds, kept for failed cameras too.
    pub rounds: Vec<RoundDiagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<RefinementSchedule>,
}

impl CameraCalibration {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn failed() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Entry for a camera that failed after completing `rounds`. `rms` is
    /// the last completed round's.
    pub fn failed_with(rounds: Vec<RoundDiagnostics>) -> Self {
        Self {
            enabled: true,
            rms: rounds.last().map(|r| r.rms),
            rounds,
            ..Self::default()
        }
    }

    pub fn from_refined(refined: &RefinedCamera) -> Self {
        Self {
            enabled: true,
            parameters: Some(refined.parameters),
            distortion: refined.parameters.distortion_coefficients(),
            rms: Some(refined.rms),
            rounds: refined.rounds.clone(),
            schedule: Some(refined.schedule),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.parameters.is_some()
    }
}

/// Rectification of the primary pair, oriented as `stereo_config` names it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoConfigResult {
    pub left_cam: String,
    pub right_cam: String,
    pub rectified_rotation_left: Mat3,
    pub rectified_rotation_right: Mat3,
    pub projection_left: Mat34,
    pub projection_right: Mat34,
    pub epipolar_score: Real,
}

impl StereoConfigResult {
    /// Copy the rectification of `pair`, swapping sides when the requested
    /// orientation is the reverse of the solved edge.
    pub fn from_pair(pair: &StereoPair, left_cam: &str, right_cam: &str) -> Self {
        let rect = &pair.rectification;
        let reversed = pair.left == right_cam && pair.right == left_cam;
        let (rl, rr, pl, pr) = if reversed {
            (rect.r_right, rect.r_left, rect.p_right, rect.p_left)
        } else {
            (rect.r_left, rect.r_right, rect.p_left, rect.p_right)
        };
        Self {
            left_cam: left_cam.to_string(),
            right_cam: right_cam.to_string(),
            rectified_rotation_left: rl,
            rectified_rotation_right: rr,
            projection_left: pl,
            projection_right: pr,
            epipolar_score: pair.epipolar_score,
        }
    }
}

/// Everything a run produced, successes and failures side by side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigCalibrationResult {
    pub state: PipelineState,
    /// One entry per camera in the topology.
    pub cameras: BTreeMap<String, CameraCalibration>,
    /// Solved pairs, in edge order.
    pub pairs: Vec<StereoPair>,
    /// Edges left out because an endpoint camera is disabled.
    pub skipped_pairs: Vec<PairId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stereo_config: Option<StereoConfigResult>,
    /// Per camera, pair or rig; in the order they happened.
    pub failures: Vec<UnitFailure>,
}

impl RigCalibrationResult {
    pub fn camera(&self, name: &str) -> Option<&CameraCalibration> {
        self.cameras.get(name)
    }

    /// Solved pair joining `a` and `b`, in either direction.
    pub fn pair(&self, a: &str, b: &str) -> Option<&StereoPair> {
        self.pairs
            .iter()
            .find(|p| (p.left == a && p.right == b) || (p.left == b && p.right == a))
    }

    /// Failures attributed to `unit`, in the order they were recorded.
    pub fn failures_for<'a>(&'a self, unit: &Unit) -> impl Iterator<Item = &'a UnitFailure> + 'a {
        let unit = unit.clone();
        self.failures.iter().filter(move |f| f.unit == unit)
    }

    pub fn is_assembled(&self) -> bool {
        self.state == PipelineState::Assembled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epipolar::RectifiedError;
    use rigcal_core::{Mat4, Resolution, Vec3};
    use rigcal_linear::StereoRectification;

    fn pair() -> StereoPair {
        let mut p_right = Mat34::zeros();
        p_right[(0, 3)] = -7.5;
        StereoPair {
            left: "left".into(),
            right: "right".into(),
            r: Mat3::identity(),
            t: Vec3::new(-7.5, 0.0, 0.0),
            rms: 0.1,
            rectification: StereoRectification {
                r_left: Mat3::identity(),
                r_right: Mat3::identity() * 2.0,
                p_left: Mat34::zeros(),
                p_right,
                q: Mat4::identity(),
                horizontal: true,
            },
            resolution: Resolution::new(1280, 800),
            epipolar_score: 1e-4,
            rectified_error: RectifiedError {
                mean: 0.0,
                count: 0,
                above_one_px: 0,
                horizontal: true,
            },
            horizontal: true,
            image_pairs: 0,
            points: 0,
        }
    }

    #[test]
    fn stereo_config_swaps_reversed_pairs() {
        let p = pair();
        let same = StereoConfigResult::from_pair(&p, "left", "right");
        assert_eq!(same.rectified_rotation_left, Mat3::identity());
        assert_eq!(same.projection_right[(0, 3)], -7.5);

        let swapped = StereoConfigResult::from_pair(&p, "right", "left");
        assert_eq!(swapped.rectified_rotation_left, Mat3::identity() * 2.0);
        assert_eq!(swapped.projection_left[(0, 3)], -7.5);
    }

    #[test]
    fn disabled_entry_serializes_empty() {
        let json = serde_json::to_value(CameraCalibration::disabled()).unwrap();
        assert_eq!(json["enabled"], false);
        assert!(json.get("parameters").is_none());
        assert_eq!(json["distortion"].as_array().unwrap().len(), 0);
    }
}
