use nalgebra::{Matrix3, RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::flags::{FISHEYE_COEFFS, PERSPECTIVE_COEFFS};

/// Lens distortion acting on pinhole-normalized coordinates.
pub trait DistortionModel<S: RealField + Copy> {
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S>;
    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S>;
}

const UNDISTORT_ITERS: usize = 20;

/// Perspective distortion: rational radial, tangential, thin prism and tilted sensor.
///
/// Coefficient order follows the 14-element convention
/// `k1 k2 p1 p2 k3 k4 k5 k6 s1 s2 s3 s4 tau_x tau_y`; unused groups are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RationalDistortion<S: RealField + Copy> {
    pub k1: S,
    pub k2: S,
    pub p1: S,
    pub p2: S,
    pub k3: S,
    pub k4: S,
    pub k5: S,
    pub k6: S,
    pub s1: S,
    pub s2: S,
    pub s3: S,
    pub s4: S,
    pub tau_x: S,
    pub tau_y: S,
}

impl<S: RealField + Copy> RationalDistortion<S> {
    pub fn zero() -> Self {
        Self::from_coefficients(&[])
    }

    /// Build from a coefficient slice in canonical order; missing trailing
    /// coefficients are zero and extra ones are ignored.
    pub fn from_coefficients(c: &[S]) -> Self {
        let at = |i: usize| c.get(i).copied().unwrap_or_else(S::zero);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
            s1: at(8),
            s2: at(9),
            s3: at(10),
            s4: at(11),
            tau_x: at(12),
            tau_y: at(13),
        }
    }

    pub fn coefficients(&self) -> [S; PERSPECTIVE_COEFFS] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6, self.s1,
            self.s2, self.s3, self.s4, self.tau_x, self.tau_y,
        ]
    }

    fn has_tilt(&self) -> bool {
        self.tau_x != S::zero() || self.tau_y != S::zero()
    }

    /// Tilted-sensor projection matrix for `tau_x, tau_y`.
    fn tilt_matrix(&self) -> Matrix3<S> {
        let (s_tx, c_tx) = self.tau_x.sin_cos();
        let (s_ty, c_ty) = self.tau_y.sin_cos();
        let zero = S::zero();
        let one = S::one();

        let rot_x = Matrix3::new(one, zero, zero, zero, c_tx, s_tx, zero, -s_tx, c_tx);
        let rot_y = Matrix3::new(c_ty, zero, -s_ty, zero, one, zero, s_ty, zero, c_ty);
        let rot_xy = rot_y * rot_x;
        let proj_z = Matrix3::new(
            rot_xy[(2, 2)],
            zero,
            -rot_xy[(0, 2)],
            zero,
            rot_xy[(2, 2)],
            -rot_xy[(1, 2)],
            zero,
            zero,
            one,
        );
        proj_z * rot_xy
    }

    fn apply_homography(h: &Matrix3<S>, p: &Vector2<S>) -> Vector2<S> {
        let v = h * Vector3::new(p.x, p.y, S::one());
        if v.z == S::zero() {
            Vector2::new(v.x, v.y)
        } else {
            Vector2::new(v.x / v.z, v.y / v.z)
        }
    }

    fn radial_ratio(&self, r2: S) -> S {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = S::one() + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = S::one() + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        num / den
    }

    fn additive_terms(&self, x: S, y: S) -> (S, S) {
        let two = S::one() + S::one();
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let dx = two * self.p1 * x * y
            + self.p2 * (r2 + two * x * x)
            + self.s1 * r2
            + self.s2 * r4;
        let dy = self.p1 * (r2 + two * y * y)
            + two * self.p2 * x * y
            + self.s3 * r2
            + self.s4 * r4;
        (dx, dy)
    }
}

impl<S: RealField + Copy> DistortionModel<S> for RationalDistortion<S> {
    fn distort(&self, n: &Vector2<S>) -> Vector2<S> {
        let (x, y) = (n.x, n.y);
        let ratio = self.radial_ratio(x * x + y * y);
        let (dx, dy) = self.additive_terms(x, y);
        let d = Vector2::new(x * ratio + dx, y * ratio + dy);
        if self.has_tilt() {
            Self::apply_homography(&self.tilt_matrix(), &d)
        } else {
            d
        }
    }

    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S> {
        let d = if self.has_tilt() {
            match self.tilt_matrix().try_inverse() {
                Some(inv) => Self::apply_homography(&inv, n_dist),
                None => *n_dist,
            }
        } else {
            *n_dist
        };

        let (x0, y0) = (d.x, d.y);
        let (mut x, mut y) = (x0, y0);
        for _ in 0..UNDISTORT_ITERS {
            let ratio = self.radial_ratio(x * x + y * y);
            if ratio <= S::zero() {
                break;
            }
            let (dx, dy) = self.additive_terms(x, y);
            x = (x0 - dx) / ratio;
            y = (y0 - dy) / ratio;
        }
        Vector2::new(x, y)
    }
}

/// Equidistant fisheye distortion `theta_d = theta (1 + k1 theta^2 + .. + k4 theta^8)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EquidistantDistortion<S: RealField + Copy> {
    pub k1: S,
    pub k2: S,
    pub k3: S,
    pub k4: S,
}

impl<S: RealField + Copy> EquidistantDistortion<S> {
    pub fn from_coefficients(c: &[S]) -> Self {
        let at = |i: usize| c.get(i).copied().unwrap_or_else(S::zero);
        Self {
            k1: at(0),
            k2: at(1),
            k3: at(2),
            k4: at(3),
        }
    }

    pub fn coefficients(&self) -> [S; FISHEYE_COEFFS] {
        [self.k1, self.k2, self.k3, self.k4]
    }

    fn theta_d(&self, theta: S) -> S {
        let t2 = theta * theta;
        let t4 = t2 * t2;
        let t6 = t4 * t2;
        let t8 = t4 * t4;
        theta * (S::one() + self.k1 * t2 + self.k2 * t4 + self.k3 * t6 + self.k4 * t8)
    }

    fn theta_d_derivative(&self, theta: S) -> S {
        let t2 = theta * theta;
        let t4 = t2 * t2;
        let t6 = t4 * t2;
        let t8 = t4 * t4;
        let c = |n: f64| nalgebra::convert::<f64, S>(n);
        S::one() + c(3.0) * self.k1 * t2 + c(5.0) * self.k2 * t4 + c(7.0) * self.k3 * t6
            + c(9.0) * self.k4 * t8
    }
}

impl<S: RealField + Copy> DistortionModel<S> for EquidistantDistortion<S> {
    fn distort(&self, n: &Vector2<S>) -> Vector2<S> {
        let r = n.norm();
        if r <= S::default_epsilon() {
            return *n;
        }
        let theta = r.atan();
        let scale = self.theta_d(theta) / r;
        n * scale
    }

    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S> {
        let theta_d = n_dist.norm();
        if theta_d <= S::default_epsilon() {
            return *n_dist;
        }
        let mut theta = theta_d;
        for _ in 0..UNDISTORT_ITERS {
            let f = self.theta_d(theta) - theta_d;
            let df = self.theta_d_derivative(theta);
            if df == S::zero() {
                break;
            }
            theta = theta - f / df;
        }
        let scale = theta.tan() / theta_d;
        n_dist * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<D: DistortionModel<f64>>(d: &D, p: Vector2<f64>) -> f64 {
        (d.undistort(&d.distort(&p)) - p).norm()
    }

    #[test]
    fn rational_roundtrip_with_prism_and_tilt() {
        let d = RationalDistortion::from_coefficients(&[
            -0.12, 0.03, 0.001, -0.0005, 0.002, 0.05, 0.004, 0.0001, 0.0002, 0.0001, -0.0002,
            0.0001, 0.01, -0.005,
        ]);
        for p in [
            Vector2::new(0.1, -0.2),
            Vector2::new(-0.35, 0.25),
            Vector2::new(0.0, 0.0),
        ] {
            assert!(roundtrip(&d, p) < 1e-9, "p={p:?}");
        }
    }

    #[test]
    fn rational_zero_is_identity() {
        let d = RationalDistortion::<f64>::zero();
        let p = Vector2::new(0.3, -0.1);
        assert_eq!(d.distort(&p), p);
    }

    #[test]
    fn equidistant_roundtrip() {
        let d = EquidistantDistortion {
            k1: -0.02,
            k2: 0.004,
            k3: -0.001,
            k4: 0.0002,
        };
        for p in [Vector2::new(0.5, 0.4), Vector2::new(-1.2, 0.3)] {
            assert!(roundtrip(&d, p) < 1e-9, "p={p:?}");
        }
    }

    #[test]
    fn equidistant_compresses_wide_angles() {
        let d = EquidistantDistortion::<f64>::default();
        let p = Vector2::new(1.0, 0.0);
        let q = d.distort(&p);
        assert!((q.x - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }
}
