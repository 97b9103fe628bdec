//! Common board corners seen by both cameras of a pair.

use std::collections::HashSet;

use log::{debug, warn};
use rigcal_core::{CameraObservation, CharucoBoard, CorrespondenceView, Pt2, Pt3};

use crate::config::IntrinsicsMode;
use crate::error::CalibrationError;

/// Per image pair: board points and the matching pixels in each camera.
///
/// `left[i].points_3d == right[i].points_3d` for every image pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonCorrespondences {
    /// Left camera views, one per kept image pair.
    pub left: Vec<CorrespondenceView>,
    /// Right camera views, aligned with `left`.
    pub right: Vec<CorrespondenceView>,
    /// Source image index of each kept pair.
    pub images: Vec<usize>,
}

impl CommonCorrespondences {
    /// Number of image pairs.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Common points summed over all image pairs.
    pub fn total_points(&self) -> usize {
        self.left.iter().map(CorrespondenceView::len).sum()
    }

    /// Fewest common points over all image pairs.
    pub fn min_points(&self) -> usize {
        self.left.iter().map(CorrespondenceView::len).min().unwrap_or(0)
    }

    /// Cut every image pair down to the first `n` points.
    pub fn truncated(&self, n: usize) -> Self {
        Self {
            left: self.left.iter().map(|v| v.truncated(n)).collect(),
            right: self.right.iter().map(|v| v.truncated(n)).collect(),
            images: self.images.clone(),
        }
    }
}

/// Ids present in both observations, in `left` order.
pub fn common_ids(left: &CameraObservation, right: &CameraObservation) -> Vec<u32> {
    let right_ids: HashSet<u32> = right.ids.iter().copied().collect();
    left.ids
        .iter()
        .copied()
        .filter(|id| right_ids.contains(id))
        .collect()
}

/// Intersect two cameras' observations image by image.
///
/// Images are paired by index. Pairs where either side is a failed
/// detection (fewer than [`rigcal_core::MIN_DETECTION_CORNERS`] corners)
/// are skipped.
/// Every remaining pair must share at least `mode.min_common_points()`
/// corners, otherwise the whole pair fails with
/// [`CalibrationError::InsufficientCommonFeatures`]. So does a pair with no
/// usable images at all.
pub fn intersect(
    left: &[CameraObservation],
    right: &[CameraObservation],
    board: &CharucoBoard,
    mode: IntrinsicsMode,
) -> Result<CommonCorrespondences, CalibrationError> {
    let required = mode.min_common_points();
    if left.len() != right.len() {
        warn!(
            "image counts differ ({} vs {}), pairing the first {}",
            left.len(),
            right.len(),
            left.len().min(right.len())
        );
    }

    let mut out = CommonCorrespondences::default();
    for (image, (l, r)) in left.iter().zip(right).enumerate() {
        if !l.is_usable() || !r.is_usable() {
            debug!("image {image}: detection missing on one side, skipped");
            continue;
        }

        let mut points_3d: Vec<Pt3> = Vec::new();
        let mut left_px: Vec<Pt2> = Vec::new();
        let mut right_px: Vec<Pt2> = Vec::new();
        for id in common_ids(l, r) {
            let (Some(p3), Some(li), Some(ri)) = (board.corner(id), l.index_of(id), r.index_of(id))
            else {
                continue;
            };
            points_3d.push(p3);
            left_px.push(l.corners[li]);
            right_px.push(r.corners[ri]);
        }
        if points_3d.len() < required {
            return Err(CalibrationError::InsufficientCommonFeatures {
                image,
                found: points_3d.len(),
                required,
            });
        }
        out.left.push(CorrespondenceView {
            points_3d: points_3d.clone(),
            points_2d: left_px,
        });
        out.right.push(CorrespondenceView {
            points_3d,
            points_2d: right_px,
        });
        out.images.push(image);
    }

    if out.is_empty() {
        return Err(CalibrationError::InsufficientCommonFeatures {
            image: 0,
            found: 0,
            required,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::Resolution;

    fn obs(ids: &[u32], x: f64) -> CameraObservation {
        CameraObservation::new(
            ids.iter().map(|&id| Pt2::new(x + id as f64, 10.0 * id as f64)).collect(),
            ids.to_vec(),
            Resolution::new(640, 480),
        )
        .unwrap()
    }

    fn board() -> CharucoBoard {
        CharucoBoard::new(8, 6, 4.0, 3.0).unwrap()
    }

    #[test]
    fn intersection_matches_by_id() {
        let left = obs(&[1, 2, 3, 5], 0.0);
        let right = obs(&[2, 3, 4, 5], 100.0);
        assert_eq!(common_ids(&left, &right), vec![2, 3, 5]);

        let common = intersect(&[left], &[right], &board(), IntrinsicsMode::Shared).unwrap_err();
        // Three shared corners is below the shared-mode minimum of four.
        assert_eq!(
            common,
            CalibrationError::InsufficientCommonFeatures {
                image: 0,
                found: 3,
                required: 4
            }
        );
    }

    #[test]
    fn points_are_looked_up_by_id() {
        let b = board();
        let left = obs(&[1, 2, 3, 5, 9, 11, 12], 0.0);
        let right = obs(&[12, 2, 4, 5, 3, 11, 9], 100.0);
        let common = intersect(
            std::slice::from_ref(&left),
            std::slice::from_ref(&right),
            &b,
            IntrinsicsMode::PerCamera,
        )
        .unwrap();
        assert_eq!(common.len(), 1);
        let (l, r) = (&common.left[0], &common.right[0]);
        assert_eq!(l.len(), 6);
        assert_eq!(l.points_3d, r.points_3d);
        for (i, id) in [2u32, 3, 5, 9, 11, 12].iter().enumerate() {
            assert_eq!(l.points_3d[i], b.corner(*id).unwrap());
            assert_eq!(l.points_2d[i], Pt2::new(*id as f64, 10.0 * *id as f64));
            assert_eq!(r.points_2d[i], Pt2::new(100.0 + *id as f64, 10.0 * *id as f64));
        }
    }

    #[test]
    fn one_sparse_image_fails_the_pair() {
        let full: Vec<u32> = (0..10).collect();
        let left = vec![obs(&full, 0.0), obs(&full, 0.0)];
        let right = vec![obs(&full, 1.0), obs(&[0, 1, 2, 3, 4], 1.0)];
        let err = intersect(&left, &right, &board(), IntrinsicsMode::PerCamera).unwrap_err();
        assert_eq!(
            err,
            CalibrationError::InsufficientCommonFeatures {
                image: 1,
                found: 5,
                required: 6
            }
        );
    }

    #[test]
    fn failed_detections_are_skipped_not_fatal() {
        let full: Vec<u32> = (0..10).collect();
        let left = vec![obs(&full, 0.0), obs(&full, 0.0), obs(&full, 0.0)];
        let right = vec![
            obs(&full, 1.0),
            CameraObservation::empty(Resolution::new(640, 480)),
            obs(&full, 1.0),
        ];
        let common = intersect(&left, &right, &board(), IntrinsicsMode::PerCamera).unwrap();
        assert_eq!(common.len(), 2);
        assert_eq!(common.images, vec![0, 2]);
        assert_eq!(common.total_points(), 20);

        // Only failed detections left.
        let err = intersect(&left[1..2], &right[1..2], &board(), IntrinsicsMode::PerCamera)
            .unwrap_err();
        assert!(matches!(err, CalibrationError::InsufficientCommonFeatures { found: 0, .. }));
    }

    #[test]
    fn no_images_is_insufficient() {
        let err = intersect(&[], &[], &board(), IntrinsicsMode::PerCamera).unwrap_err();
        assert!(matches!(err, CalibrationError::InsufficientCommonFeatures { found: 0, .. }));
    }
}
