//! Closed-form initialisation for planar calibration.
//!
//! - [`dlt_homography`]: normalised DLT estimate of the pattern-plane to
//!   image homography of one observation,
//! - [`estimate_intrinsics_from_homographies`]: Zhang's closed-form K,
//! - [`estimate_planar_pose_from_h`]: pattern pose from `H` and `K`.
//!
//! These provide the starting point for the nonlinear refinement in
//! `lens-optim`; none of them model lens distortion.

mod homography;
pub mod math;
mod planar_pose;
mod zhang_intrinsics;

pub use homography::*;
pub use planar_pose::*;
pub use zhang_intrinsics::*;
