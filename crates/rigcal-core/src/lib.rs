//! Core math and geometry primitives for `rigcal`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - perspective and fisheye camera models with structured calibration flags,
//! - Charuco board geometry and detector observation types,
//! - a generic RANSAC engine ([`ransac_fit`], [`Estimator`]),
//! - synthetic capture helpers used by tests across the workspace.

/// Charuco board geometry.
pub mod board;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera models, distortion and calibration flags.
pub mod models;
/// Detector observations and 2D-3D correspondence views.
pub mod observation;
/// Generic RANSAC engine and traits.
pub mod ransac;
/// Synthetic board captures.
pub mod synthetic;

pub use board::*;
pub use math::*;
pub use models::*;
pub use observation::*;
pub use ransac::*;
