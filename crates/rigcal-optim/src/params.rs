//! Parameter packing for the calibration problems.
//!
//! Poses use a 6-vector `[rx ry rz tx ty tz]` with an axis-angle rotation.
//! The camera block is variable length: [`IntrinsicsLayout`] decides from the
//! calibration flags which of `fx fy cx cy` and which distortion coefficients
//! are free, and everything else is held at the initial camera's values.

use nalgebra::{Translation3, UnitQuaternion};
use rigcal_core::{
    CalibFlag, CalibFlags, Camera, CameraModel, Distortion, Iso3, Real, Vec3,
};

pub const POSE_DIM: usize = 6;

pub fn pack_pose(pose: &Iso3) -> [Real; POSE_DIM] {
    let r = pose.rotation.scaled_axis();
    let t = pose.translation.vector;
    [r.x, r.y, r.z, t.x, t.y, t.z]
}

/// Inverse of [`pack_pose`]; reads the first six entries of `p`.
pub fn unpack_pose(p: &[Real]) -> Iso3 {
    let rot = UnitQuaternion::from_scaled_axis(Vec3::new(p[0], p[1], p[2]));
    Iso3::from_parts(Translation3::new(p[3], p[4], p[5]), rot)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Focal {
    Fixed,
    /// Only `fx` is free; `fy = ratio * fx`.
    Locked { ratio: Real },
    Free,
}

/// Mapping between a [`Camera`] and its free parameters.
#[derive(Debug, Clone)]
pub struct IntrinsicsLayout {
    base: Camera,
    focal: Focal,
    principal_point: bool,
    free_distortion: Vec<usize>,
}

impl IntrinsicsLayout {
    /// Layout for refining `initial` under `flags`.
    ///
    /// Perspective coefficients beyond the flag-selected model length are
    /// zeroed, as are `p1 p2` under `ZERO_TANGENT_DIST`. Skew is always held.
    pub fn new(initial: &Camera, flags: CalibFlags) -> Self {
        let model = initial.model();
        let mut coeffs = initial.distortion.coefficients();
        let free_mask: Vec<bool> = match model {
            CameraModel::Perspective => {
                let count = flags.perspective_coefficient_count();
                coeffs.iter_mut().skip(count).for_each(|c| *c = 0.0);
                if flags.contains(CalibFlag::ZeroTangentDist) {
                    coeffs[2] = 0.0;
                    coeffs[3] = 0.0;
                }
                flags.free_perspective_coefficients().to_vec()
            }
            CameraModel::Fisheye => flags.free_fisheye_coefficients().to_vec(),
        };
        let mut base = *initial;
        base.distortion = Distortion::from_coefficients(model, &coeffs);

        let focal = if flags.contains(CalibFlag::FixFocalLength) {
            Focal::Fixed
        } else if flags.contains(CalibFlag::FixAspectRatio) && initial.intrinsics.fx != 0.0 {
            Focal::Locked {
                ratio: initial.intrinsics.fy / initial.intrinsics.fx,
            }
        } else {
            Focal::Free
        };

        Self {
            base,
            focal,
            principal_point: !flags.contains(CalibFlag::FixPrincipalPoint),
            free_distortion: free_mask
                .iter()
                .enumerate()
                .filter_map(|(i, free)| free.then_some(i))
                .collect(),
        }
    }

    /// Initial camera with the flag-implied zeroing applied.
    pub fn base(&self) -> &Camera {
        &self.base
    }

    pub fn len(&self) -> usize {
        let focal = match self.focal {
            Focal::Fixed => 0,
            Focal::Locked { .. } => 1,
            Focal::Free => 2,
        };
        focal + if self.principal_point { 2 } else { 0 } + self.free_distortion.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pack(&self, camera: &Camera) -> Vec<Real> {
        let k = &camera.intrinsics;
        let mut out = Vec::with_capacity(self.len());
        match self.focal {
            Focal::Fixed => {}
            Focal::Locked { .. } => out.push(k.fx),
            Focal::Free => out.extend([k.fx, k.fy]),
        }
        if self.principal_point {
            out.extend([k.cx, k.cy]);
        }
        let coeffs = camera.distortion.coefficients();
        out.extend(self.free_distortion.iter().map(|&i| coeffs[i]));
        out
    }

    /// Camera from the first [`IntrinsicsLayout::len`] entries of `p`.
    pub fn unpack(&self, p: &[Real]) -> Camera {
        let mut camera = self.base;
        let mut it = p.iter().copied();
        let mut next = || it.next().unwrap_or_default();
        let k = &mut camera.intrinsics;
        match self.focal {
            Focal::Fixed => {}
            Focal::Locked { ratio } => {
                k.fx = next();
                k.fy = ratio * k.fx;
            }
            Focal::Free => {
                k.fx = next();
                k.fy = next();
            }
        }
        if self.principal_point {
            k.cx = next();
            k.cy = next();
        }
        if !self.free_distortion.is_empty() {
            let mut coeffs = self.base.distortion.coefficients();
            for &i in &self.free_distortion {
                coeffs[i] = next();
            }
            camera.distortion = Distortion::from_coefficients(self.base.model(), &coeffs);
        }
        camera
    }
}
