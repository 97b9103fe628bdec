//! Closed-form initialisers for the rig refinement pipeline.
//!
//! Everything here is deterministic linear algebra (plus seeded RANSAC):
//! plane homographies, Zhang intrinsics, planar pose recovery with an
//! escalating robust wrapper, and Bouguet stereo rectification.

mod homography;
pub mod math;
mod planar_pose;
mod pnp;
mod rectify;
mod zhang;

pub use homography::*;
pub use planar_pose::*;
pub use pnp::*;
pub use rectify::*;
pub use zhang::*;
