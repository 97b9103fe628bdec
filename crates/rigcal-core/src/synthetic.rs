//! Synthetic Charuco captures for tests and demos.
//!
//! Poses place the board in front of the camera with a spread of tilts so
//! that focal length and principal point are observable; [`observe`] projects
//! the board into an image and keeps the corners that land inside it.

use nalgebra::{Translation3, UnitQuaternion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{Camera, CameraObservation, CharucoBoard, Iso3, Pt2, Pt3, Real, Resolution, Vec3};

/// Centre of the corner grid on the board plane.
pub fn board_center(board: &CharucoBoard) -> Pt3 {
    Pt3::new(
        0.5 * board.squares_x as Real * board.square_size,
        0.5 * board.squares_y as Real * board.square_size,
        0.0,
    )
}

/// `n` board-to-camera poses around `distance` along the optical axis.
///
/// Tilts sweep roughly +-20 degrees about X and Y; depth varies by +-15%.
pub fn board_poses(board: &CharucoBoard, n: usize, distance: Real) -> Vec<Iso3> {
    let center = board_center(board);
    (0..n)
        .map(|i| {
            let phase = i as Real / n.max(1) as Real * std::f64::consts::TAU;
            let tilt_x = 0.35 * phase.sin();
            let tilt_y = 0.35 * phase.cos();
            let yaw = 0.1 * ((i % 3) as Real - 1.0);
            let rot = UnitQuaternion::from_euler_angles(tilt_x, tilt_y, yaw);
            let depth = distance * (1.0 + 0.1 * ((i % 4) as Real - 1.5));
            let offset = Vec3::new(
                0.05 * distance * phase.cos(),
                0.05 * distance * phase.sin(),
                depth,
            );
            let t = offset - rot * center.coords;
            Iso3::from_parts(Translation3::from(t), rot)
        })
        .collect()
}

/// Project every board corner and keep those inside `resolution`.
pub fn observe(
    camera: &Camera,
    board: &CharucoBoard,
    pose: &Iso3,
    resolution: Resolution,
) -> CameraObservation {
    let (corners, ids): (Vec<Pt2>, Vec<u32>) = (0..board.num_corners() as u32)
        .filter_map(|id| {
            let p = board.corner(id)?;
            let px = camera.project_point(pose, &p)?;
            resolution.contains(&px).then_some((px, id))
        })
        .unzip();
    CameraObservation {
        corners,
        ids,
        resolution,
    }
}

/// Observe the board once per pose.
pub fn observe_all(
    camera: &Camera,
    board: &CharucoBoard,
    poses: &[Iso3],
    resolution: Resolution,
) -> Vec<CameraObservation> {
    poses
        .iter()
        .map(|pose| observe(camera, board, pose, resolution))
        .collect()
}

/// Add uniform pixel noise in `[-amplitude, amplitude]` to every corner.
pub fn with_noise(obs: &CameraObservation, amplitude: Real, seed: u64) -> CameraObservation {
    let mut rng = StdRng::seed_from_u64(seed);
    let corners = obs
        .corners
        .iter()
        .map(|c| {
            Pt2::new(
                c.x + rng.random_range(-amplitude..=amplitude),
                c.y + rng.random_range(-amplitude..=amplitude),
            )
        })
        .collect();
    CameraObservation {
        corners,
        ..obs.clone()
    }
}

/// Displace the corner at `index` by `offset` pixels.
pub fn with_outlier(obs: &CameraObservation, index: usize, offset: Pt2) -> CameraObservation {
    let mut corners = obs.corners.clone();
    if let Some(c) = corners.get_mut(index) {
        *c = Pt2::new(c.x + offset.x, c.y + offset.y);
    }
    CameraObservation {
        corners,
        ..obs.clone()
    }
}
