//! Observation types for calibration data.
//!
//! A [`CameraObservation`] is what a board detector hands over for one image:
//! corner pixels tagged with board corner ids. A [`CorrespondenceView`] is the
//! same data resolved against the board geometry into 2D-3D pairs.

use std::collections::HashSet;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{CharucoBoard, Pt2, Pt3, Resolution};

/// Images with fewer corners than this are treated as failed detections.
pub const MIN_DETECTION_CORNERS: usize = 4;

/// Detected board corners in one image.
///
/// `ids[i]` is the board corner id of `corners[i]`. Ids are unique within an
/// image. Values are never mutated; filtering returns a new observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraObservation {
    pub corners: Vec<Pt2>,
    pub ids: Vec<u32>,
    pub resolution: Resolution,
}

impl CameraObservation {
    /// Build an observation, checking that corners and ids line up and that
    /// ids are unique.
    pub fn new(corners: Vec<Pt2>, ids: Vec<u32>, resolution: Resolution) -> Result<Self> {
        let obs = Self {
            corners,
            ids,
            resolution,
        };
        obs.validate()?;
        Ok(obs)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.corners.len() == self.ids.len(),
            "corner / id counts must match: {} vs {}",
            self.corners.len(),
            self.ids.len()
        );
        let mut seen = HashSet::with_capacity(self.ids.len());
        for id in &self.ids {
            ensure!(seen.insert(*id), "duplicate corner id {id} in observation");
        }
        Ok(())
    }

    /// An observation with no corners, used to keep image indices aligned
    /// after everything in an image was rejected.
    pub fn empty(resolution: Resolution) -> Self {
        Self {
            corners: Vec::new(),
            ids: Vec::new(),
            resolution,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether the detection has enough corners to be used at all.
    pub fn is_usable(&self) -> bool {
        self.len() >= MIN_DETECTION_CORNERS
    }

    /// Position of `id` in this observation.
    pub fn index_of(&self, id: u32) -> Option<usize> {
        self.ids.iter().position(|&i| i == id)
    }

    /// Subsequence selected by a keep mask of the same length.
    pub fn select(&self, keep: &[bool]) -> Self {
        debug_assert_eq!(keep.len(), self.len());
        let (corners, ids) = self
            .corners
            .iter()
            .zip(&self.ids)
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|((c, id), _)| (*c, *id))
            .unzip();
        Self {
            corners,
            ids,
            resolution: self.resolution,
        }
    }

    /// Resolve ids against the board into 2D-3D correspondences.
    pub fn to_view(&self, board: &CharucoBoard) -> Result<CorrespondenceView> {
        let points_3d = self
            .ids
            .iter()
            .map(|&id| {
                board
                    .corner(id)
                    .with_context(|| format!("corner id {id} is not on the board"))
            })
            .collect::<Result<Vec<_>>>()?;
        CorrespondenceView::new(points_3d, self.corners.clone())
    }
}

/// A single view containing 2D-3D point correspondences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceView {
    /// 3D points in the board frame.
    pub points_3d: Vec<Pt3>,
    /// Corresponding 2D pixel observations.
    pub points_2d: Vec<Pt2>,
}

impl CorrespondenceView {
    pub fn new(points_3d: Vec<Pt3>, points_2d: Vec<Pt2>) -> Result<Self> {
        ensure!(
            points_3d.len() == points_2d.len(),
            "3D / 2D point counts must match: {} vs {}",
            points_3d.len(),
            points_2d.len()
        );
        Ok(Self {
            points_3d,
            points_2d,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }

    /// Board-plane (X, Y) coordinates of the 3D points.
    pub fn planar_points(&self) -> Vec<Pt2> {
        self.points_3d.iter().map(|p| Pt2::new(p.x, p.y)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Pt3, &Pt2)> {
        self.points_3d.iter().zip(self.points_2d.iter())
    }

    /// Keep only the first `n` correspondences.
    pub fn truncated(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            points_3d: self.points_3d[..n].to_vec(),
            points_2d: self.points_2d[..n].to_vec(),
        }
    }
}

/// Summary statistics for reprojection errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    /// Mean reprojection error in pixels.
    pub mean: f64,
    /// Root mean square error in pixels.
    pub rms: f64,
    /// Median reprojection error in pixels.
    pub median: f64,
    /// Maximum reprojection error in pixels.
    pub max: f64,
    /// Number of points evaluated.
    pub count: usize,
}

impl ReprojectionStats {
    pub fn from_errors(errors: &[f64]) -> Self {
        if errors.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                median: 0.0,
                max: 0.0,
                count: 0,
            };
        }

        let sum: f64 = errors.iter().sum();
        let sum_sq: f64 = errors.iter().map(|e| e * e).sum();
        let max = errors.iter().cloned().fold(0.0_f64, f64::max);
        let n = errors.len() as f64;

        Self {
            mean: sum / n,
            rms: (sum_sq / n).sqrt(),
            median: crate::median(errors).unwrap_or(0.0),
            max,
            count: errors.len(),
        }
    }
}
