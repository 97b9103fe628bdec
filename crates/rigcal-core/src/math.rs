use nalgebra::{
    Isometry3, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Rotation3, Translation3,
    UnitQuaternion, Vector2, Vector3,
};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Mat34 = Matrix3x4<Real>;
pub type Mat4 = Matrix4<Real>;
pub type Iso3 = Isometry3<Real>;

pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Rotation from roll/pitch/yaw given in degrees.
///
/// Angles are applied about the fixed x, y and z axes in that order, so the
/// result is `Rz(yaw) * Ry(pitch) * Rx(roll)`.
pub fn rotation_from_rpy_deg(roll: Real, pitch: Real, yaw: Real) -> Mat3 {
    *Rotation3::from_euler_angles(roll.to_radians(), pitch.to_radians(), yaw.to_radians())
        .matrix()
}

/// Inverse of [`rotation_from_rpy_deg`], returned as `(roll, pitch, yaw)` in degrees.
pub fn rpy_deg_from_rotation(r: &Mat3) -> (Real, Real, Real) {
    let (roll, pitch, yaw) = Rotation3::from_matrix(r).euler_angles();
    (roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
}

/// Build an isometry from a rotation matrix and a translation vector.
///
/// The rotation is re-orthonormalised, so slightly drifted matrices are fine.
pub fn isometry_from_rt(r: &Mat3, t: &Vec3) -> Iso3 {
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(r));
    Iso3::from_parts(Translation3::from(*t), rot)
}

/// Angle in degrees between two rotation matrices.
pub fn rotation_angle_deg(a: &Mat3, b: &Mat3) -> Real {
    let rel = Rotation3::from_matrix(&(a.transpose() * b));
    rel.angle().to_degrees()
}

/// Median of a slice, `None` when empty. NaNs sort last.
pub fn median(values: &[Real]) -> Option<Real> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}
