//! Detector output for the whole rig.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::warn;
use rigcal_core::{CameraObservation, Resolution, MIN_DETECTION_CORNERS};
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// Per-camera image observations, image `i` of every camera taken at the
/// same instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigObservations {
    pub cameras: BTreeMap<String, Vec<CameraObservation>>,
}

impl RigObservations {
    pub fn get(&self, camera: &str) -> Option<&[CameraObservation]> {
        self.cameras.get(camera).map(Vec::as_slice)
    }

    pub fn insert(&mut self, camera: impl Into<String>, images: Vec<CameraObservation>) {
        self.cameras.insert(camera.into(), images);
    }

    /// Validate every observation and blank out failed detections.
    ///
    /// Images with fewer than [`MIN_DETECTION_CORNERS`] corners become empty
    /// observations so image indices stay aligned across cameras.
    pub fn sanitized(&self) -> Result<Self> {
        let mut cameras = BTreeMap::new();
        for (name, images) in &self.cameras {
            let mut cleaned = Vec::with_capacity(images.len());
            for (idx, obs) in images.iter().enumerate() {
                obs.validate()
                    .with_context(|| format!("camera {name}, image {idx}"))?;
                if let Err(err) = detection_check(idx, obs) {
                    if !obs.is_empty() {
                        warn!("camera {name}: skipping image: {err}");
                    }
                    cleaned.push(CameraObservation::empty(obs.resolution));
                } else {
                    cleaned.push(obs.clone());
                }
            }
            cameras.insert(name.clone(), cleaned);
        }
        Ok(Self { cameras })
    }
}

/// `DetectionFailed` when the image is below the corner minimum.
pub fn detection_check(image: usize, obs: &CameraObservation) -> Result<(), CalibrationError> {
    if obs.is_usable() {
        Ok(())
    } else {
        Err(CalibrationError::DetectionFailed {
            image,
            found: obs.len(),
            required: MIN_DETECTION_CORNERS,
        })
    }
}

/// Resolution reported by the first non-empty image, if any.
pub fn observed_resolution(images: &[CameraObservation]) -> Option<Resolution> {
    images.iter().find(|o| !o.is_empty()).map(|o| o.resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::Pt2;

    fn obs(n: u32) -> CameraObservation {
        CameraObservation::new(
            (0..n).map(|i| Pt2::new(i as f64, 0.0)).collect(),
            (0..n).collect(),
            Resolution::new(640, 480),
        )
        .unwrap()
    }

    #[test]
    fn sanitize_blanks_sparse_images_in_place() {
        let mut rig = RigObservations::default();
        rig.insert("left", vec![obs(10), obs(3), obs(4)]);
        let clean = rig.sanitized().unwrap();
        let left = clean.get("left").unwrap();
        assert_eq!(left.len(), 3);
        assert_eq!(left[0].len(), 10);
        assert!(left[1].is_empty());
        assert_eq!(left[2].len(), 4);
    }

    #[test]
    fn sanitize_rejects_malformed_input() {
        let mut bad = obs(5);
        bad.ids[1] = 0;
        let mut rig = RigObservations::default();
        rig.insert("left", vec![bad]);
        assert!(rig.sanitized().is_err());
    }

    #[test]
    fn detection_check_reports_counts() {
        assert_eq!(
            detection_check(7, &obs(2)),
            Err(CalibrationError::DetectionFailed {
                image: 7,
                found: 2,
                required: 4
            })
        );
    }
}
