//! Bringing two cameras of different sizes onto one working resolution.
//!
//! The larger image is resized by the width ratio and then cropped
//! symmetrically in height. Intrinsics and corner coordinates follow the
//! same mapping, so a pair can be solved without the original images.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use rigcal_core::{Camera, CameraObservation, FxFyCxCySkew, Pt2, Real, Resolution};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CalibrationError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("cannot bring {from} to {to}: rescaled height {scaled_height} is too small")]
    InsufficientResolution {
        from: Resolution,
        to: Resolution,
        scaled_height: u32,
    },
}

impl From<ReconcileError> for CalibrationError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::InsufficientResolution {
                from,
                to,
                scaled_height,
            } => CalibrationError::InsufficientResolution {
                from,
                to,
                scaled_height,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Working resolution for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Width ratio applied to the larger camera.
    pub scale: Real,
    pub target: Resolution,
    /// Camera that gets resized, `None` when no rescaling is needed.
    pub scaled: Option<Side>,
}

impl Reconciliation {
    pub fn is_identity(&self) -> bool {
        self.scaled.is_none()
    }
}

fn scale_factor(from: Resolution, to: Resolution) -> Real {
    to.width as Real / from.width as Real
}

/// Pick the common resolution of `left` and `right`.
///
/// Rescaling only happens when one image is strictly smaller in both
/// dimensions. If the width-scaled height of the larger image falls short of
/// the smaller one, the target height shrinks to fit.
pub fn reconcile(left: Resolution, right: Resolution) -> Reconciliation {
    let smaller = |a: Resolution, b: Resolution| a.width < b.width && a.height < b.height;
    let (source, target, side) = if smaller(right, left) {
        (left, right, Side::Left)
    } else if smaller(left, right) {
        (right, left, Side::Right)
    } else {
        return Reconciliation {
            scale: 1.0,
            target: left,
            scaled: None,
        };
    };

    let scale = scale_factor(source, target);
    let scaled_height = (scale * source.height as Real).floor() as u32;
    let target = Resolution::new(target.width, target.height.min(scaled_height));
    Reconciliation {
        scale,
        target,
        scaled: Some(side),
    }
}

/// Pixel offsets removed by the symmetric crop after width scaling.
fn crop_offsets(from: Resolution, to: Resolution, s: Real) -> (Real, Real) {
    (
        (from.width as Real * s - to.width as Real) / 2.0,
        (from.height as Real * s - to.height as Real) / 2.0,
    )
}

/// Intrinsics of `camera` after mapping its image from `from` to `to`.
pub fn scale_intrinsics(camera: &Camera, from: Resolution, to: Resolution) -> Camera {
    if from == to {
        return *camera;
    }
    let s = scale_factor(from, to);
    let (dx, dy) = crop_offsets(from, to, s);
    let k = camera.intrinsics;
    Camera {
        intrinsics: FxFyCxCySkew {
            fx: k.fx * s,
            fy: k.fy * s,
            cx: k.cx * s - dx,
            cy: k.cy * s - dy,
            skew: k.skew * s,
        },
        ..*camera
    }
}

/// Resize by the width ratio, then crop the height symmetrically.
pub fn scale_image(image: &DynamicImage, to: Resolution) -> Result<DynamicImage, ReconcileError> {
    let (w, h) = image.dimensions();
    let from = Resolution::new(w, h);
    if from == to {
        return Ok(image.clone());
    }
    let s = scale_factor(from, to);
    let scaled_height = (h as Real * s).round() as u32;
    if scaled_height < to.height {
        return Err(ReconcileError::InsufficientResolution {
            from,
            to,
            scaled_height,
        });
    }
    if scaled_height == to.height {
        return Ok(image.resize_exact(to.width, to.height, FilterType::Triangle));
    }
    let resized = image.resize_exact(to.width, scaled_height, FilterType::Triangle);
    let offset = (scaled_height - to.height) / 2;
    Ok(resized.crop_imm(0, offset, to.width, to.height))
}

/// Map detected corners from `obs.resolution` to `to`.
///
/// Corners that fall outside the cropped frame are dropped.
pub fn scale_observation(obs: &CameraObservation, to: Resolution) -> CameraObservation {
    let from = obs.resolution;
    if from == to {
        return obs.clone();
    }
    let s = scale_factor(from, to);
    let (dx, dy) = crop_offsets(from, to, s);
    let (corners, ids) = obs
        .corners
        .iter()
        .zip(&obs.ids)
        .filter_map(|(c, id)| {
            let p = Pt2::new(c.x * s - dx, c.y * s - dy);
            to.contains(&p).then_some((p, *id))
        })
        .unzip();
    CameraObservation {
        corners,
        ids,
        resolution: to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use rigcal_core::{CameraModel, Distortion};

    fn camera(res: Resolution) -> Camera {
        Camera::new(
            FxFyCxCySkew::from_hfov(res.width, res.height, 70.0),
            Distortion::zero(CameraModel::Perspective),
        )
    }

    #[test]
    fn identical_resolutions_are_a_no_op() {
        let res = Resolution::new(1280, 800);
        let rec = reconcile(res, res);
        assert!(rec.is_identity());
        assert_eq!(rec.scale, 1.0);
        assert_eq!(rec.target, res);
        let cam = camera(res);
        assert_eq!(scale_intrinsics(&cam, res, res), cam);
    }

    #[test]
    fn larger_camera_is_scaled_to_the_smaller() {
        let rgb = Resolution::new(1920, 1080);
        let mono = Resolution::new(1280, 800);
        let rec = reconcile(rgb, mono);
        assert_eq!(rec.scaled, Some(Side::Left));
        assert!((rec.scale - 2.0 / 3.0).abs() < 1e-12);
        // 1080 * 2/3 = 720 < 800
        assert_eq!(rec.target, Resolution::new(1280, 720));

        let rec = reconcile(mono, Resolution::new(4056, 3040));
        assert_eq!(rec.scaled, Some(Side::Right));
        assert_eq!(rec.target, mono);

        // Not smaller in both dimensions.
        assert!(reconcile(Resolution::new(1280, 1024), Resolution::new(1920, 1000)).is_identity());
    }

    #[test]
    fn intrinsics_follow_scale_and_crop() {
        let from = Resolution::new(4056, 3040);
        let to = Resolution::new(1280, 800);
        let cam = camera(from);
        let scaled = scale_intrinsics(&cam, from, to);
        let s = 1280.0 / 4056.0;
        assert!((scaled.intrinsics.fx - cam.intrinsics.fx * s).abs() < 1e-9);
        // Principal point of a centred camera stays centred.
        assert!((scaled.intrinsics.cx - 640.0).abs() < 1e-9);
        assert!((scaled.intrinsics.cy - 400.0).abs() < 1e-9);
    }

    #[test]
    fn observations_follow_intrinsics() {
        let from = Resolution::new(4056, 3040);
        let to = Resolution::new(1280, 800);
        let cam = camera(from);
        let scaled_cam = scale_intrinsics(&cam, from, to);
        let rays = [
            rigcal_core::Vec3::new(0.0, 0.0, 1.0),
            rigcal_core::Vec3::new(0.1, -0.2, 1.0),
            rigcal_core::Vec3::new(-0.3, 0.5, 1.0),
        ];
        let corners: Vec<Pt2> = rays.iter().filter_map(|r| cam.project_point_c(r)).collect();
        let obs = CameraObservation::new(corners, vec![0, 1, 2], from).unwrap();
        let scaled = scale_observation(&obs, to);
        // The steepest ray is cropped away.
        assert_eq!(scaled.ids, vec![0, 1]);
        for (c, id) in scaled.corners.iter().zip(&scaled.ids) {
            let expected = scaled_cam.project_point_c(&rays[*id as usize]).unwrap();
            assert!((c - expected).norm() < 1e-9);
        }
    }

    #[test]
    fn image_resize_and_crop() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(1920, 1200));
        let out = scale_image(&img, Resolution::new(1280, 720)).unwrap();
        assert_eq!(out.dimensions(), (1280, 720));

        let out = scale_image(&img, Resolution::new(1280, 800)).unwrap();
        assert_eq!(out.dimensions(), (1280, 800));

        let err = scale_image(&img, Resolution::new(1280, 1000)).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::InsufficientResolution {
                from: Resolution::new(1920, 1200),
                to: Resolution::new(1280, 1000),
                scaled_height: 800,
            }
        );
    }
}
