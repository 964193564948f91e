//! Core geometry and data model for `spatial-lens`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the pinhole camera with Brown-Conrady distortion,
//! - the calibration data model ([`CalibrationPattern`], [`PatternObservation`],
//!   [`CalibrationSession`], [`CalibrationResult`]) and its JSON persistence,
//! - deterministic synthetic data generators.
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ (x/z, y/z)`

mod error;
/// Linear algebra type aliases and coordinate helpers.
pub mod math;
/// Camera model.
pub mod models;
/// Synthetic pattern views.
pub mod synthetic;
/// Calibration data model.
pub mod types;

pub use error::CoreError;
pub use math::*;
pub use models::*;
pub use synthetic::UniformPixelNoise;
pub use types::*;
