use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use rigcal_core::{Iso3, Mat3, Real, Vec3};

/// Decompose a plane-induced homography into the board-to-camera pose.
///
/// The board lies on `Z = 0` in its own frame and `H ~ K [r1 r2 t]`. The sign
/// of the scale is chosen so the board is in front of the camera. Returns
/// `None` when K is singular or H is degenerate.
pub fn estimate_planar_pose_from_h(kmtx: &Mat3, hmtx: &Mat3) -> Option<Iso3> {
    let k_inv = kmtx.try_inverse()?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);
    let k_inv_h3 = k_inv * hmtx.column(2);

    let mean_norm = 0.5 * (k_inv_h1.norm() + k_inv_h2.norm());
    if mean_norm <= Real::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / mean_norm;
    if k_inv_h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);
    let r_mat = Mat3::from_columns(&[r1, r2, r3]);

    // Closest rotation in the Frobenius sense.
    let svd = r_mat.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t: Vec3 = lambda * k_inv_h3;
    if !t.iter().all(|v| v.is_finite()) {
        return None;
    }
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Some(Iso3::from_parts(Translation3::from(t), rot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::FxFyCxCySkew;

    #[test]
    fn recovers_pose_and_keeps_board_in_front() {
        let k = FxFyCxCySkew {
            fx: 800.0,
            fy: 790.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        }
        .k_matrix();
        let rot = Rotation3::from_euler_angles(0.1, -0.2, 0.3);
        let t = Vec3::new(0.05, -0.02, 0.8);

        let mut h = Mat3::zeros();
        h.set_column(0, &(k * rot.matrix().column(0)));
        h.set_column(1, &(k * rot.matrix().column(1)));
        h.set_column(2, &(k * t));

        for scale in [1.0, -3.0] {
            let pose = estimate_planar_pose_from_h(&k, &(h * scale)).unwrap();
            assert!((pose.translation.vector - t).norm() < 1e-9);
            let dr = pose.rotation.to_rotation_matrix().matrix() - rot.matrix();
            assert!(dr.norm() < 1e-9);
        }
    }
}
