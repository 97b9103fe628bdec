use nalgebra::{Matrix3, RealField, Vector2};
use serde::{Deserialize, Serialize};

use crate::{Mat3, Real};

/// Standard pinhole intrinsics with optional skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxFyCxCySkew<S: RealField + Copy> {
    /// Focal length in pixels along X.
    pub fx: S,
    /// Focal length in pixels along Y.
    pub fy: S,
    /// Principal point X coordinate in pixels.
    pub cx: S,
    /// Principal point Y coordinate in pixels.
    pub cy: S,
    /// Skew term (held at 0 by the calibration pipeline).
    pub skew: S,
}

impl<S: RealField + Copy> FxFyCxCySkew<S> {
    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Matrix3<S> {
        Matrix3::new(
            self.fx,
            self.skew,
            self.cx,
            S::zero(),
            self.fy,
            self.cy,
            S::zero(),
            S::zero(),
            S::one(),
        )
    }

    /// Normalized (sensor-plane) coordinates to pixels.
    pub fn sensor_to_pixel(&self, sensor: &Vector2<S>) -> Vector2<S> {
        let u = self.fx * sensor.x + self.skew * sensor.y + self.cx;
        let v = self.fy * sensor.y + self.cy;
        Vector2::new(u, v)
    }

    /// Pixels to normalized (sensor-plane) coordinates.
    pub fn pixel_to_sensor(&self, pixel: &Vector2<S>) -> Vector2<S> {
        let sy = (pixel.y - self.cy) / self.fy;
        let sx = (pixel.x - self.cx - self.skew * sy) / self.fx;
        Vector2::new(sx, sy)
    }
}

impl FxFyCxCySkew<Real> {
    /// Read intrinsics from an upper-triangular K matrix.
    ///
    /// Returns `None` when K is not a valid camera matrix (zero focal length or
    /// a bottom row other than `[0, 0, 1]`).
    pub fn try_from_k_matrix(k: &Mat3) -> Option<Self> {
        let bottom_ok = k[(2, 0)].abs() < 1e-12 && k[(2, 1)].abs() < 1e-12;
        if !bottom_ok || k[(2, 2)].abs() < 1e-12 || k[(1, 0)].abs() > 1e-12 {
            return None;
        }
        let k = k / k[(2, 2)];
        if k[(0, 0)].abs() < 1e-12 || k[(1, 1)].abs() < 1e-12 {
            return None;
        }
        Some(Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        })
    }

    /// Square-pixel guess from a horizontal field of view in degrees.
    ///
    /// `f = width / (2 tan(hfov / 2))`, principal point at the image centre.
    pub fn from_hfov(width: u32, height: u32, hfov_deg: Real) -> Self {
        let w = width as Real;
        let h = height as Real;
        let f = w / (2.0 * (hfov_deg.to_radians() / 2.0).tan());
        Self {
            fx: f,
            fy: f,
            cx: w / 2.0,
            cy: h / 2.0,
            skew: 0.0,
        }
    }

    /// Horizontal field of view in degrees implied by `fx` at the given width.
    pub fn hfov_deg(&self, width: u32) -> Real {
        (2.0 * ((width as Real) / (2.0 * self.fx)).atan()).to_degrees()
    }
}
