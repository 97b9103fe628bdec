//! Bouguet stereo rectification.
//!
//! Given two calibrated cameras and the right-from-left extrinsics
//! `X_r = R * X_l + T`, computes the rectifying rotations and the new
//! projection matrices so that corresponding points share a row (horizontal
//! rigs) or a column (vertical rigs).

use nalgebra::Rotation3;
use rigcal_core::{Camera, CameraModel, Mat3, Mat34, Mat4, Pt2, Real, Resolution, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RectifyError {
    #[error("baseline is zero")]
    ZeroBaseline,
    #[error("rectification produced non-finite values")]
    NonFinite,
}

/// Rectifying rotations and projections for a stereo pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoRectification {
    /// Rotation from the left camera frame into the rectified frame.
    pub r_left: Mat3,
    /// Rotation from the right camera frame into the rectified frame.
    pub r_right: Mat3,
    /// Left rectified projection `[K' | 0]`.
    pub p_left: Mat34,
    /// Right rectified projection; the baseline sits in column 3.
    pub p_right: Mat34,
    /// Disparity-to-depth mapping.
    pub q: Mat4,
    /// Whether the baseline is mostly along x.
    pub horizontal: bool,
}

fn rodrigues(v: &Vec3) -> Mat3 {
    *Rotation3::from_scaled_axis(*v).matrix()
}

/// Map a raw pixel into the rectified image defined by `r` and `p`.
pub fn rectify_point(camera: &Camera, r: &Mat3, p: &Mat34, px: &Pt2) -> Option<Pt2> {
    let n = camera.undistort_pixel(px);
    let ray = r * Vec3::new(n.x, n.y, 1.0);
    let h = p.fixed_view::<3, 3>(0, 0) * ray;
    if h.z.abs() <= Real::EPSILON {
        return None;
    }
    Some(Pt2::new(h.x / h.z, h.y / h.z))
}

impl StereoRectification {
    pub fn rectify_left(&self, camera: &Camera, px: &Pt2) -> Option<Pt2> {
        rectify_point(camera, &self.r_left, &self.p_left, px)
    }

    pub fn rectify_right(&self, camera: &Camera, px: &Pt2) -> Option<Pt2> {
        rectify_point(camera, &self.r_right, &self.p_right, px)
    }

    /// Shared rectified focal length.
    pub fn focal(&self) -> Real {
        self.p_left[(0, 0)]
    }
}

/// Compute the rectification for a calibrated pair.
///
/// The new focal length is the smaller of the two cameras' focal lengths
/// along the axis orthogonal to the baseline, shrunk for barrel distortion.
/// Principal points are chosen to centre the rectified image; with
/// `zero_disparity` both cameras share one principal point.
pub fn stereo_rectify(
    left: &Camera,
    right: &Camera,
    resolution: Resolution,
    r: &Mat3,
    t: &Vec3,
    zero_disparity: bool,
) -> Result<StereoRectification, RectifyError> {
    let om = Rotation3::from_matrix(r).scaled_axis();
    let r_half = rodrigues(&(-0.5 * om));
    let t_half = r_half * t;

    let horizontal = t_half.x.abs() > t_half.y.abs();
    let idx = if horizontal { 0 } else { 1 };
    let c = t_half[idx];
    let nt = t_half.norm();
    if nt <= Real::EPSILON {
        return Err(RectifyError::ZeroBaseline);
    }

    let mut uu = Vec3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };
    let mut ww = t_half.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / nt).clamp(-1.0, 1.0).acos() / nw;
    }
    let w_r = rodrigues(&ww);

    let r_left = w_r * r_half.transpose();
    let r_right = w_r * r_half;
    let t_rect = r_right * t;

    let (w, h) = (resolution.width as Real, resolution.height as Real);
    let fc = [left, right]
        .iter()
        .map(|cam| {
            let k = cam.k_matrix();
            let mut f = k[(1 - idx, 1 - idx)];
            if cam.model() == CameraModel::Perspective {
                let k1 = cam.distortion.coefficients()[0];
                if k1 < 0.0 {
                    f *= 1.0 + k1 * (w * w + h * h) / (4.0 * f * f);
                }
            }
            f
        })
        .fold(Real::INFINITY, Real::min);

    let corners = [
        Pt2::new(0.0, 0.0),
        Pt2::new(w - 1.0, 0.0),
        Pt2::new(0.0, h - 1.0),
        Pt2::new(w - 1.0, h - 1.0),
    ];
    let p_bare = Mat34::new(fc, 0.0, 0.0, 0.0, 0.0, fc, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0);
    let mut cc = [Pt2::origin(); 2];
    for (k, (cam, rk)) in [(left, &r_left), (right, &r_right)].into_iter().enumerate() {
        let mut sum = Vec3::zeros();
        for corner in &corners {
            let p = rectify_point(cam, rk, &p_bare, corner).ok_or(RectifyError::NonFinite)?;
            sum.x += p.x;
            sum.y += p.y;
        }
        cc[k] = Pt2::new((w - 1.0) * 0.5 - sum.x / 4.0, (h - 1.0) * 0.5 - sum.y / 4.0);
    }
    if zero_disparity {
        let mid = Pt2::from((cc[0].coords + cc[1].coords) * 0.5);
        cc = [mid, mid];
    } else if horizontal {
        let y = 0.5 * (cc[0].y + cc[1].y);
        cc[0].y = y;
        cc[1].y = y;
    } else {
        let x = 0.5 * (cc[0].x + cc[1].x);
        cc[0].x = x;
        cc[1].x = x;
    }

    let projection = |c: &Pt2| Mat34::new(fc, 0.0, c.x, 0.0, 0.0, fc, c.y, 0.0, 0.0, 0.0, 1.0, 0.0);
    let p_left = projection(&cc[0]);
    let mut p_right = projection(&cc[1]);
    p_right[(idx, 3)] = t_rect[idx] * fc;

    let tx = t_rect[idx];
    let mut q = Mat4::identity();
    q[(0, 3)] = -cc[0].x;
    q[(1, 3)] = -cc[0].y;
    q[(2, 2)] = 0.0;
    q[(2, 3)] = fc;
    q[(3, 2)] = -1.0 / tx;
    q[(3, 3)] = (cc[0][idx] - cc[1][idx]) / tx;

    let out = StereoRectification {
        r_left,
        r_right,
        p_left,
        p_right,
        q,
        horizontal,
    };
    let finite = out.r_left.iter().chain(out.r_right.iter()).all(|v| v.is_finite())
        && out.p_left.iter().chain(out.p_right.iter()).all(|v| v.is_finite());
    if !finite {
        return Err(RectifyError::NonFinite);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::{rotation_from_rpy_deg, Distortion, FxFyCxCySkew, Pt3};

    fn cam(fx: Real, k1: Real) -> Camera {
        Camera::new(
            FxFyCxCySkew {
                fx,
                fy: fx,
                cx: 640.0,
                cy: 400.0,
                skew: 0.0,
            },
            Distortion::from_coefficients(CameraModel::Perspective, &[k1, 0.0, 0.0, 0.0, 0.0]),
        )
    }

    fn rows_align(horizontal: bool, r: Mat3, t: Vec3) {
        let (left, right) = (cam(800.0, -0.05), cam(790.0, 0.02));
        let res = Resolution::new(1280, 800);
        let rect = stereo_rectify(&left, &right, res, &r, &t, false).unwrap();
        assert_eq!(rect.horizontal, horizontal);

        let inside = |q: &Pt2| q.x >= 0.0 && q.y >= 0.0 && q.x < 1280.0 && q.y < 800.0;
        for p in [Vec3::new(0.1, -0.2, 2.0), Vec3::new(-0.3, 0.25, 3.5), Vec3::new(0.0, 0.0, 1.2)] {
            let pl = left.project_point_c(&p).unwrap();
            let pr = right.project_point_c(&(r * p + t)).unwrap();
            assert!(inside(&pl) && inside(&pr), "{pl} {pr}");
            let ql = rect.rectify_left(&left, &pl).unwrap();
            let qr = rect.rectify_right(&right, &pr).unwrap();
            let d = if horizontal { ql.y - qr.y } else { ql.x - qr.x };
            assert!(d.abs() < 1e-6, "misaligned by {d}");
        }
    }

    #[test]
    fn horizontal_rig_rows_align() {
        rows_align(true, rotation_from_rpy_deg(0.5, -1.0, 0.3), Vec3::new(-0.075, 0.001, 0.0005));
    }

    #[test]
    fn vertical_rig_columns_align() {
        rows_align(false, rotation_from_rpy_deg(-0.4, 0.2, 0.8), Vec3::new(0.002, 0.06, -0.001));
    }

    #[test]
    fn right_projection_carries_baseline() {
        let (left, right) = (cam(800.0, 0.0), cam(800.0, 0.0));
        let t = Vec3::new(-10.0, 0.0, 0.0);
        let rect = stereo_rectify(&left, &right, Resolution::new(1280, 800), &Mat3::identity(), &t, true)
            .unwrap();
        assert!((rect.focal() - 800.0).abs() < 1e-9);
        assert!((rect.p_right[(0, 3)] + 8000.0).abs() < 1e-6);
        assert_eq!(rect.p_left[(0, 2)], rect.p_right[(0, 2)]);

        // Depth from disparity through Q.
        let p = Pt3::new(1.0, 0.5, 40.0);
        let ql = rect.rectify_left(&left, &left.project_point_c(&p.coords).unwrap()).unwrap();
        let qr = rect
            .rectify_right(&right, &right.project_point_c(&(p.coords + t)).unwrap())
            .unwrap();
        let hom = rect.q * nalgebra::Vector4::new(ql.x, ql.y, ql.x - qr.x, 1.0);
        assert!((hom.z / hom.w - 40.0).abs() < 1e-6);
    }

    #[test]
    fn zero_baseline_is_rejected() {
        let c = cam(800.0, 0.0);
        let err = stereo_rectify(&c, &c, Resolution::new(640, 480), &Mat3::identity(), &Vec3::zeros(), false);
        assert_eq!(err, Err(RectifyError::ZeroBaseline));
    }
}
