//! Deterministic synthetic calibration data for tests and demos.

pub mod noise;
pub mod planar;

pub use noise::UniformPixelNoise;
