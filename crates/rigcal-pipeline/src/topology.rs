//! Rig description: cameras, declared extrinsic edges and the primary pair.
//!
//! ```json
//! {
//!   "cameras": {
//!     "left":  { "resolution": {"width": 1280, "height": 800}, "hfov_deg": 71.9,
//!                "extrinsics": { "to_cam": "right",
//!                                "rotation": {"roll": 0, "pitch": 0, "yaw": 0},
//!                                "translation": [-7.5, 0, 0] } },
//!     "right": { "resolution": {"width": 1280, "height": 800}, "hfov_deg": 71.9 }
//!   },
//!   "stereo_config": { "left_cam": "left", "right_cam": "right" }
//! }
//! ```

use std::collections::BTreeMap;

use rigcal_core::{rotation_from_rpy_deg, CalibFlags, CameraModel, Mat3, Real, Resolution, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, PairId};

/// Roll/pitch/yaw in degrees about the fixed x, y, z axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rpy {
    #[serde(alias = "r")]
    pub roll: Real,
    #[serde(alias = "p")]
    pub pitch: Real,
    #[serde(alias = "y")]
    pub yaw: Real,
}

impl Rpy {
    pub fn matrix(&self) -> Mat3 {
        rotation_from_rpy_deg(self.roll, self.pitch, self.yaw)
    }
}

/// Nominal pose of `to_cam` relative to the declaring camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrinsicsGuess {
    pub to_cam: String,
    #[serde(default)]
    pub rotation: Rpy,
    /// Board units, same as the board square size.
    #[serde(default = "Vec3::zeros")]
    pub translation: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    #[serde(default)]
    pub model: CameraModel,
    /// Nominal horizontal field of view; seeds the intrinsics when present.
    #[serde(default)]
    pub hfov_deg: Option<Real>,
    #[serde(default)]
    pub flags: CalibFlags,
    /// Fixed-focus sensors (thermal) skip the robust pose ladder.
    #[serde(default)]
    pub fixed_sensor: bool,
    pub resolution: Resolution,
    #[serde(default)]
    pub extrinsics: Option<ExtrinsicsGuess>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StereoPairConfig {
    pub left_cam: String,
    pub right_cam: String,
}

/// An extrinsic edge with its initial guess.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub pair: PairId,
    pub rotation: Mat3,
    pub translation: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigTopology {
    pub cameras: BTreeMap<String, CameraSpec>,
    #[serde(default)]
    pub stereo_config: Option<StereoPairConfig>,
}

impl RigTopology {
    pub fn camera(&self, name: &str) -> Option<&CameraSpec> {
        self.cameras.get(name)
    }

    /// Declared edges in camera-name order.
    pub fn edges(&self) -> Vec<Edge> {
        self.cameras
            .iter()
            .filter_map(|(name, spec)| {
                spec.extrinsics.as_ref().map(|ext| Edge {
                    pair: PairId::new(name.clone(), ext.to_cam.clone()),
                    rotation: ext.rotation.matrix(),
                    translation: ext.translation,
                })
            })
            .collect()
    }

    /// The primary pair, if declared.
    pub fn primary_pair(&self) -> Option<PairId> {
        self.stereo_config
            .as_ref()
            .map(|s| PairId::new(s.left_cam.clone(), s.right_cam.clone()))
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        let invalid = |reason: String| CalibrationError::InvalidTopology { reason };
        if self.cameras.is_empty() {
            return Err(invalid("no cameras".into()));
        }
        for (name, spec) in &self.cameras {
            if spec.resolution.width == 0 || spec.resolution.height == 0 {
                return Err(invalid(format!("camera {name} has an empty resolution")));
            }
            if let Some(hfov) = spec.hfov_deg {
                if !(hfov > 0.0 && hfov < 360.0) {
                    return Err(invalid(format!("camera {name} has hfov {hfov}")));
                }
            }
        }
        for edge in self.edges() {
            if edge.pair.left == edge.pair.right {
                return Err(invalid(format!("camera {} points at itself", edge.pair.left)));
            }
            if !self.cameras.contains_key(&edge.pair.right) {
                return Err(invalid(format!(
                    "edge {} references unknown camera {}",
                    edge.pair, edge.pair.right
                )));
            }
        }
        if let Some(primary) = self.primary_pair() {
            for cam in [&primary.left, &primary.right] {
                if !self.cameras.contains_key(cam) {
                    return Err(invalid(format!("stereo_config references unknown camera {cam}")));
                }
            }
            if !self
                .edges()
                .iter()
                .any(|e| e.pair.joins(&primary.left, &primary.right))
            {
                return Err(invalid(format!("no edge joins stereo_config pair {primary}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIG: &str = r#"{
        "cameras": {
            "left": {
                "resolution": {"width": 1280, "height": 800},
                "hfov_deg": 71.9,
                "extrinsics": {
                    "to_cam": "right",
                    "rotation": {"r": 0.0, "p": 0.0, "y": 1.5},
                    "translation": [-7.5, 0.0, 0.0]
                }
            },
            "right": {
                "resolution": {"width": 1280, "height": 800},
                "hfov_deg": 71.9,
                "flags": ["USE_INTRINSIC_GUESS"]
            },
            "rgb": {
                "model": "fisheye",
                "resolution": {"width": 1920, "height": 1080},
                "extrinsics": {"to_cam": "left"}
            }
        },
        "stereo_config": {"left_cam": "left", "right_cam": "right"}
    }"#;

    #[test]
    fn parses_and_lists_edges() {
        let rig: RigTopology = serde_json::from_str(RIG).unwrap();
        rig.validate().unwrap();

        let edges = rig.edges();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].pair, PairId::new("left", "right"));
        assert_eq!(edges[0].translation, Vec3::new(-7.5, 0.0, 0.0));
        assert_eq!(edges[1].pair, PairId::new("rgb", "left"));
        assert_eq!(edges[1].rotation, Mat3::identity());

        assert_eq!(rig.camera("rgb").unwrap().model, CameraModel::Fisheye);
        assert_eq!(rig.camera("left").unwrap().flags, CalibFlags::default());
        assert_eq!(rig.camera("right").unwrap().flags.iter().count(), 1);
    }

    #[test]
    fn rejects_dangling_edges_and_primary_pairs() {
        let mut rig: RigTopology = serde_json::from_str(RIG).unwrap();
        if let Some(ext) = rig.cameras.get_mut("rgb").and_then(|c| c.extrinsics.as_mut()) {
            ext.to_cam = "ghost".into();
        }
        assert!(matches!(rig.validate(), Err(CalibrationError::InvalidTopology { .. })));

        let mut rig: RigTopology = serde_json::from_str(RIG).unwrap();
        rig.stereo_config = Some(StereoPairConfig {
            left_cam: "rgb".into(),
            right_cam: "right".into(),
        });
        assert!(rig.validate().is_err());
    }
}
