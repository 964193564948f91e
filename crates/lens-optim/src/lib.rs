//! Nonlinear least-squares refinement for planar calibration.
//!
//! The solver stack is deliberately small:
//! - [`NllsProblem`]: dense residual/Jacobian interface with IRLS weighting,
//! - [`LmBackend`]: Levenberg-Marquardt via the `levenberg-marquardt` crate,
//! - [`planar_intrinsics`]: the joint intrinsics + distortion + pose problem.

mod backend_lm;
mod jacobian;
pub mod planar_intrinsics;
mod robust;
mod traits;

pub use backend_lm::LmBackend;
pub use planar_intrinsics::{
    refine_planar_intrinsics, reprojection_stats, IntrinsicsMask, ParamLayout,
    PlanarIntrinsicsError, PlanarIntrinsicsProblem, PlanarRefinement, ReprojectionStats,
};
pub use robust::RobustKernel;
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
