//! Calibration solver: closed-form initialisation followed by joint
//! Levenberg-Marquardt refinement.

use lens_core::{
    BrownConrady5, CalibrationResult, CalibrationSession, CoreError, Iso3, Mat3, PinholeCamera,
    Real, ViewPose,
};
use lens_linear::{
    dlt_homography, estimate_intrinsics_from_homographies, estimate_planar_pose_from_h,
    homography_rms_error,
};
use lens_optim::{
    refine_planar_intrinsics, reprojection_stats, IntrinsicsMask, LmBackend,
    PlanarIntrinsicsError, RobustKernel, SolveOptions,
};
use log::{debug, info, warn};
use thiserror::Error;

use crate::config::CalibrationConfig;

/// Views needed by the closed-form intrinsics estimate.
const MIN_INIT_VIEWS: usize = 3;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("insufficient data: have {have} observations, need {need}")]
    InsufficientData { have: usize, need: usize },
    #[error("initialization failed at {stage}")]
    Initialization {
        stage: String,
        #[source]
        source: BoxError,
    },
    #[error("refinement setup failed")]
    Refinement(#[from] PlanarIntrinsicsError),
    #[error("solver diverged: {reason}")]
    SolverDiverged { reason: String },
    #[error("calibration result rejected")]
    InvalidResult(#[from] CoreError),
}

fn init_error(stage: impl Into<String>, source: impl Into<BoxError>) -> CalibrationError {
    CalibrationError::Initialization {
        stage: stage.into(),
        source: source.into(),
    }
}

/// Estimates intrinsics, distortion and per-view poses from a session.
#[derive(Debug, Clone)]
pub struct CalibrationSolver {
    pub min_observations: usize,
    pub mask: IntrinsicsMask,
    pub robust: RobustKernel,
    pub options: SolveOptions,
}

impl Default for CalibrationSolver {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

impl CalibrationSolver {
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            min_observations: config.min_observations,
            mask: config.mask(),
            robust: config.robust_kernel,
            options: config.solve_options(),
        }
    }

    /// Observations required before [`Self::solve`] runs.
    pub fn required_observations(&self) -> usize {
        self.min_observations.max(MIN_INIT_VIEWS)
    }

    pub fn solve(&self, session: &CalibrationSession) -> Result<CalibrationResult, CalibrationError> {
        let need = self.required_observations();
        let have = session.len();
        let image_size = match session.image_size() {
            Some(size) if have >= need => size,
            _ => return Err(CalibrationError::InsufficientData { have, need }),
        };
        let views = session.observations();
        info!(
            "calibrating from {} views of {} points ({}x{})",
            have,
            session.points_per_view().unwrap_or(0),
            image_size.width,
            image_size.height
        );

        let homographies = session
            .iter()
            .map(|(id, v)| {
                let world = v.planar_points();
                let h = dlt_homography(&world, v.points_2d())
                    .map_err(|e| init_error(format!("homography of view {}", id.0), e))?;
                debug!(
                    "view {}: homography transfer rms {:.4} px",
                    id.0,
                    homography_rms_error(&h, &world, v.points_2d())
                );
                Ok(h)
            })
            .collect::<Result<Vec<Mat3>, CalibrationError>>()?;

        let mut intrinsics = estimate_intrinsics_from_homographies(&homographies)
            .map_err(|e| init_error("closed-form intrinsics", e))?;
        if self.mask.fix_skew {
            intrinsics.skew = 0.0;
        }
        debug!(
            "initial intrinsics fx={:.3} fy={:.3} cx={:.3} cy={:.3}",
            intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
        );

        let poses = homographies
            .iter()
            .enumerate()
            .map(|(i, h)| {
                estimate_planar_pose_from_h(&intrinsics, h)
                    .map_err(|e| init_error(format!("pose of view {i}"), e))
            })
            .collect::<Result<Vec<Iso3>, _>>()?;

        let initial = PinholeCamera::new(intrinsics, BrownConrady5::default());
        let refined = refine_planar_intrinsics(
            &LmBackend,
            views,
            &initial,
            &poses,
            self.mask,
            self.robust,
            &self.options,
        )?;
        let report = &refined.report;
        if !report.converged {
            warn!("refinement stopped without converging: {}", report.termination);
            return Err(CalibrationError::SolverDiverged {
                reason: format!(
                    "{} after {} evaluations",
                    report.termination, report.iterations
                ),
            });
        }

        let k = refined.camera.k;
        let usable = [k.fx, k.fy, k.cx, k.cy, k.skew]
            .into_iter()
            .chain(refined.camera.dist.coeffs())
            .all(Real::is_finite)
            && k.fx > 0.0
            && k.fy > 0.0;
        if !usable {
            return Err(CalibrationError::SolverDiverged {
                reason: format!("unusable camera fx={} fy={}", k.fx, k.fy),
            });
        }

        let stats = reprojection_stats(&refined.camera, &refined.poses, views).ok_or_else(|| {
            CalibrationError::SolverDiverged {
                reason: "refined poses put pattern points behind the camera".into(),
            }
        })?;
        info!(
            "calibration done: rms {:.4} px, cost {:.3e}, {}",
            stats.rms, report.final_cost, report.termination
        );

        let poses = refined.poses.iter().map(ViewPose::from_iso).collect();
        Ok(CalibrationResult::new(
            image_size,
            refined.camera,
            poses,
            stats.rms,
            stats.per_view_mean,
        )?)
    }
}
