//! Pinhole camera model with Brown-Conrady lens distortion.
//!
//! The forward mapping of a camera-frame point `p` is
//! `pixel = K(distort(p.xy / p.z))`; the three stages live in
//! [`IntrinsicsModel`], [`DistortionModel`] and [`PinholeCamera`].

mod camera;
mod distortion;
mod intrinsics;

pub use camera::*;
pub use distortion::*;
pub use intrinsics::*;
