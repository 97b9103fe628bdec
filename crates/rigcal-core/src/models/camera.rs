use serde::{Deserialize, Serialize};

use super::{
    CalibFlags, DistortionModel, EquidistantDistortion, FxFyCxCySkew, RationalDistortion,
};
use crate::{Iso3, Mat3, Pt2, Pt3, Real, Vec2, Vec3};

/// Image size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether `px` lies inside `[0, width) x [0, height)`.
    pub fn contains(&self, px: &Pt2) -> bool {
        px.x >= 0.0 && px.y >= 0.0 && px.x < self.width as Real && px.y < self.height as Real
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Calibration model family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraModel {
    /// Pinhole with rational / thin-prism / tilted distortion.
    #[default]
    Perspective,
    /// Equidistant fisheye.
    Fisheye,
}

/// Serializable distortion parameters for either model family.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distortion {
    Rational {
        #[serde(flatten)]
        params: RationalDistortion<Real>,
    },
    Equidistant {
        #[serde(flatten)]
        params: EquidistantDistortion<Real>,
    },
}

impl Distortion {
    /// All-zero distortion for the given model.
    pub fn zero(model: CameraModel) -> Self {
        Self::from_coefficients(model, &[])
    }

    pub fn from_coefficients(model: CameraModel, coeffs: &[Real]) -> Self {
        match model {
            CameraModel::Perspective => Distortion::Rational {
                params: RationalDistortion::from_coefficients(coeffs),
            },
            CameraModel::Fisheye => Distortion::Equidistant {
                params: EquidistantDistortion::from_coefficients(coeffs),
            },
        }
    }

    pub fn model(&self) -> CameraModel {
        match self {
            Distortion::Rational { .. } => CameraModel::Perspective,
            Distortion::Equidistant { .. } => CameraModel::Fisheye,
        }
    }

    /// Full coefficient vector (14 perspective or 4 fisheye entries).
    pub fn coefficients(&self) -> Vec<Real> {
        match self {
            Distortion::Rational { params } => params.coefficients().to_vec(),
            Distortion::Equidistant { params } => params.coefficients().to_vec(),
        }
    }
}

impl DistortionModel<Real> for Distortion {
    fn distort(&self, n: &Vec2) -> Vec2 {
        match self {
            Distortion::Rational { params } => params.distort(n),
            Distortion::Equidistant { params } => params.distort(n),
        }
    }

    fn undistort(&self, n: &Vec2) -> Vec2 {
        match self {
            Distortion::Rational { params } => params.undistort(n),
            Distortion::Equidistant { params } => params.undistort(n),
        }
    }
}

/// Pinhole camera with lens distortion: `pixel = K(distort(x/z, y/z))`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub intrinsics: FxFyCxCySkew<Real>,
    pub distortion: Distortion,
}

impl Camera {
    pub fn new(intrinsics: FxFyCxCySkew<Real>, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    pub fn model(&self) -> CameraModel {
        self.distortion.model()
    }

    pub fn k_matrix(&self) -> Mat3 {
        self.intrinsics.k_matrix()
    }

    /// Project a point given in camera coordinates.
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project_point_c(&self, p_c: &Vec3) -> Option<Pt2> {
        if p_c.z <= 0.0 {
            return None;
        }
        let n_u = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let n_d = self.distortion.distort(&n_u);
        let px = self.intrinsics.sensor_to_pixel(&n_d);
        Some(Pt2::new(px.x, px.y))
    }

    /// Project a board point through a board-to-camera pose.
    pub fn project_point(&self, pose: &Iso3, p_w: &Pt3) -> Option<Pt2> {
        self.project_point_c(&(pose * p_w).coords)
    }

    /// Undistorted pinhole-normalized coordinates of a pixel.
    pub fn undistort_pixel(&self, px: &Pt2) -> Vec2 {
        let n_d = self.intrinsics.pixel_to_sensor(&px.coords);
        self.distortion.undistort(&n_d)
    }

    /// Unit-length viewing ray through a pixel.
    pub fn backproject_pixel(&self, px: &Pt2) -> Vec3 {
        let n = self.undistort_pixel(px);
        Vec3::new(n.x, n.y, 1.0).normalize()
    }
}

/// Calibrated (or to-be-calibrated) parameters of one camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub camera: Camera,
    /// Working resolution the intrinsics refer to.
    pub resolution: Resolution,
    /// Which intrinsic and distortion parameters are free during solves.
    #[serde(default)]
    pub flags: CalibFlags,
}

impl CameraParameters {
    pub fn new(camera: Camera, resolution: Resolution, flags: CalibFlags) -> Self {
        Self {
            camera,
            resolution,
            flags,
        }
    }

    pub fn model(&self) -> CameraModel {
        self.camera.model()
    }

    pub fn intrinsics(&self) -> &FxFyCxCySkew<Real> {
        &self.camera.intrinsics
    }

    pub fn k_matrix(&self) -> Mat3 {
        self.camera.k_matrix()
    }

    /// Distortion vector truncated to the length implied by model and flags
    /// (5/8/12/14 for perspective, 4 for fisheye).
    pub fn distortion_coefficients(&self) -> Vec<Real> {
        let mut coeffs = self.camera.distortion.coefficients();
        if self.model() == CameraModel::Perspective {
            coeffs.truncate(self.flags.perspective_coefficient_count());
        }
        coeffs
    }

    #[must_use]
    pub fn with_camera(self, camera: Camera) -> Self {
        Self { camera, ..self }
    }
}
