//! Camera model building blocks.
//!
//! A camera maps a point in its own frame to pixels as
//! `pixel = K(distort(x/z, y/z))`, where the distortion stage is either the
//! perspective rational/thin-prism/tilted model or the equidistant fisheye
//! model. [`CalibFlags`] decides which parameters a solver may move.

mod camera;
mod distortion;
mod flags;
mod intrinsics;

pub use camera::*;
pub use distortion::*;
pub use flags::*;
pub use intrinsics::*;
