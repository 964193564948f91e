//! Capture and measurement pipelines built on the spatial-lens kernels.
//!
//! Capture phase: a [`CaptureController`] feeds frames to a
//! [`CorrespondenceAccumulator`], which collects pattern observations into a
//! [`lens_core::CalibrationSession`]; the [`CalibrationSolver`] turns the
//! session into a [`lens_core::CalibrationResult`].
//!
//! Runtime phase: a [`MeasurementPipeline`] undistorts each frame, detects
//! circular markers and reports metric distances from a reference marker of
//! known diameter.

pub mod calibrate;
pub mod capture;
pub mod config;
pub mod markers;
pub mod measure;
pub mod runtime;
pub mod source;
pub mod undistort;

pub use calibrate::{CalibrationError, CalibrationSolver};
pub use capture::{
    CaptureController, CaptureError, CaptureEvent, CaptureState, ChessboardDetector,
    CorrespondenceAccumulator, PatternDetector,
};
pub use config::{
    load_json_file, CalibrationConfig, ConfigError, DetectorConfig, LensConfig,
    MeasurementConfig, PatternConfig, ReferenceSelector,
};
pub use markers::{DetectedCircle, MarkerDetector};
pub use measure::{
    measure_frame, metric_distance, pixels_per_unit, FrameMeasurement, MeasureError,
    MeasurementResult, ScaleReference,
};
pub use runtime::{run_measurements, FrameReport, MeasurementPipeline, PipelineError};
pub use source::{FrameError, FrameSource, ImageDirSource, VecSource};
pub use undistort::Undistorter;
