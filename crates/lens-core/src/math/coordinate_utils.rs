//! Conversions between pixel coordinates and the normalized image plane.
//!
//! Every function here works with an explicit intrinsics block and a
//! distortion model, so the same helpers serve the solver (projection of
//! world points) and the undistortion map (per-pixel inverse lookup).

use crate::{DistortionModel, FxFyCxCySkew, IntrinsicsModel, Pt2, Real, Vec2};

/// Map a pixel to the normalized plane (`Z = 1`) by inverting K.
///
/// No distortion is removed; the result is still in distorted space if the
/// pixel came from a raw frame.
pub fn pixel_to_normalized(pixel: Pt2, intrinsics: &FxFyCxCySkew<Real>) -> Vec2 {
    intrinsics.pixel_to_sensor(&pixel.coords)
}

/// Map a normalized-plane point to pixels by applying K.
pub fn normalized_to_pixel(normalized: Vec2, intrinsics: &FxFyCxCySkew<Real>) -> Pt2 {
    Pt2::from(intrinsics.sensor_to_pixel(&normalized))
}

/// Remove lens distortion from a raw pixel, returning ideal normalized coordinates.
///
/// Inverts K, then runs the model's fixed-point undistortion.
pub fn undistort_pixel<D: DistortionModel<Real>>(
    pixel: Pt2,
    intrinsics: &FxFyCxCySkew<Real>,
    distortion: &D,
) -> Vec2 {
    distortion.undistort(&pixel_to_normalized(pixel, intrinsics))
}

/// Distort an ideal normalized point and map it to raw pixels.
///
/// This is the forward model used both for reprojection and for building
/// undistortion maps: for an output (ideal) pixel, the raw source pixel is
/// `distort_to_pixel(pixel_to_normalized(out), K, D)`.
pub fn distort_to_pixel<D: DistortionModel<Real>>(
    normalized: Vec2,
    intrinsics: &FxFyCxCySkew<Real>,
    distortion: &D,
) -> Pt2 {
    normalized_to_pixel(distortion.distort(&normalized), intrinsics)
}
