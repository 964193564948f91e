//! Entry crate for `spatial-lens`.
//!
//! Calibrate a camera from views of a planar chessboard, then measure real
//! distances between circular markers in undistorted frames.
//!
//! ```no_run
//! use spatial_lens::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LensConfig::default();
//! let mut capture = CaptureController::new(
//!     ChessboardDetector::new(config.pattern.to_pattern()?),
//!     CalibrationSolver::from_config(&config.calibration),
//! );
//! let mut frames = ImageDirSource::open("calibration/")?;
//! while let Some(frame) = frames.next_frame()? {
//!     if capture.process_frame(&frame) {
//!         capture.handle(CaptureEvent::Accept)?;
//!     }
//! }
//! capture.handle(CaptureEvent::Finish)?;
//! let calibration = capture.into_result().ok_or("no calibration")?;
//!
//! let mut pipeline = MeasurementPipeline::from_config(calibration, &config)?;
//! let mut frames = ImageDirSource::open("frames/")?;
//! run_measurements(&mut frames, &mut pipeline, |report| {
//!     if let Ok(m) = &report.measurement {
//!         if let Some(p) = m.primary() {
//!             println!("frame {}: {:.3}", report.index, p.metric_distance);
//!         }
//!     }
//! })?;
//! # Ok(())
//! # }
//! ```

/// Geometry, camera model, calibration data types and persistence.
pub mod core {
    pub use lens_core::*;
}

/// Closed-form homography, intrinsics and pose estimation.
pub mod linear {
    pub use lens_linear::*;
}

/// Levenberg-Marquardt refinement.
pub mod optim {
    pub use lens_optim::*;
}

/// Raster kernels: blur, remap, Hough circles, chessboard corners, overlays.
pub mod imgproc {
    pub use lens_imgproc::*;
}

/// Capture, calibration, undistortion and measurement pipelines.
pub mod pipeline {
    pub use lens_pipeline::*;
}

/// Common imports: `use spatial_lens::prelude::*;`.
pub mod prelude {
    pub use crate::core::{
        BrownConrady5, CalibrationPattern, CalibrationResult, CalibrationSession, FxFyCxCySkew,
        ImageSize, PatternObservation, PinholeCamera, Pt2, Pt3, Real,
    };
    pub use crate::pipeline::{
        run_measurements, CalibrationSolver, CaptureController, CaptureEvent, CaptureState,
        ChessboardDetector, DetectedCircle, FrameMeasurement, FrameSource, ImageDirSource,
        LensConfig, MarkerDetector, MeasurementPipeline, MeasurementResult, ScaleReference,
        Undistorter, VecSource,
    };
}
