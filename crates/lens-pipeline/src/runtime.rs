//! Per-frame measurement loop: undistort, detect markers, measure.

use image::RgbImage;
use lens_core::{CalibrationResult, ImageSize};
use lens_imgproc::{draw_circles, draw_measurement, HoughCircle, ImgprocError, OverlayStyle};
use log::{debug, info, warn};
use thiserror::Error;

use crate::config::{LensConfig, ReferenceSelector};
use crate::markers::{DetectedCircle, MarkerDetector};
use crate::measure::{measure_frame, FrameMeasurement, MeasureError, ScaleReference};
use crate::source::{FrameError, FrameSource};
use crate::undistort::Undistorter;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frame acquisition failed after {frames} frames")]
    Frame {
        frames: usize,
        #[source]
        source: FrameError,
    },
    #[error("image processing failed on frame {frame}")]
    Imgproc {
        frame: usize,
        #[source]
        source: ImgprocError,
    },
    #[error(transparent)]
    Setup(#[from] MeasureError),
}

/// Outcome of one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub index: usize,
    pub undistorted: RgbImage,
    pub circles: Vec<DetectedCircle>,
    /// Recoverable per-frame conditions (too few markers, no reference) are errors here.
    pub measurement: Result<FrameMeasurement, MeasureError>,
}

impl FrameReport {
    /// Undistorted frame with circle outlines and the primary measurement drawn on.
    pub fn annotated(&self, style: &OverlayStyle) -> RgbImage {
        let mut img = self.undistorted.clone();
        let hough: Vec<HoughCircle> = self.circles.iter().map(DetectedCircle::to_hough).collect();
        let reference = self.measurement.as_ref().ok().map(|m| m.reference);
        draw_circles(&mut img, &hough, reference, style);
        if let Ok(m) = &self.measurement {
            if let Some(pair) = m.primary() {
                let a = &hough[pair.from];
                let b = &hough[pair.to];
                let label = format!("{:.2}", pair.metric_distance);
                draw_measurement(&mut img, a.center(), b.center(), Some(&label), style);
            }
        }
        img
    }
}

/// Undistortion, marker detection and scale/distance for a calibrated camera.
#[derive(Debug)]
pub struct MeasurementPipeline {
    calibration: CalibrationResult,
    detector: MarkerDetector,
    reference: ScaleReference,
    selector: ReferenceSelector,
    undistorter: Option<Undistorter>,
}

impl MeasurementPipeline {
    pub fn new(
        calibration: CalibrationResult,
        detector: MarkerDetector,
        reference: ScaleReference,
        selector: ReferenceSelector,
    ) -> Self {
        Self {
            calibration,
            detector,
            reference,
            selector,
            undistorter: None,
        }
    }

    pub fn from_config(calibration: CalibrationResult, config: &LensConfig) -> Result<Self, MeasureError> {
        let reference = ScaleReference::new(config.measurement.reference_diameter)?;
        Ok(Self::new(
            calibration,
            MarkerDetector::from_config(&config.detector),
            reference,
            config.measurement.reference,
        ))
    }

    pub fn calibration(&self) -> &CalibrationResult {
        &self.calibration
    }

    fn undistorter_for(&mut self, size: ImageSize) -> Result<&Undistorter, ImgprocError> {
        let undistorter = match self.undistorter.take() {
            Some(u) if u.image_size() == size => u,
            _ => {
                let calibrated = self.calibration.image_size();
                if size != calibrated {
                    warn!(
                        "frame is {}x{} but the camera was calibrated at {}x{}",
                        size.width, size.height, calibrated.width, calibrated.height
                    );
                }
                Undistorter::new(&self.calibration, size)?
            }
        };
        Ok(self.undistorter.insert(undistorter))
    }

    /// Process one frame; `index` only labels the report.
    pub fn process(&mut self, index: usize, frame: &RgbImage) -> Result<FrameReport, ImgprocError> {
        let size = ImageSize::new(frame.width(), frame.height());
        let undistorted = self.undistorter_for(size)?.apply(frame);
        let circles = self.detector.detect(&undistorted)?;
        let measurement = measure_frame(circles.clone(), &self.reference, &self.selector);
        match &measurement {
            Ok(m) => {
                if let Some(p) = m.primary() {
                    info!(
                        "frame {index}: {} markers, distance {:.4} ({:.1} px)",
                        m.circles.len(),
                        p.metric_distance,
                        p.pixel_distance
                    );
                }
            }
            Err(e) => debug!("frame {index}: {e}"),
        }
        Ok(FrameReport {
            index,
            undistorted,
            circles,
            measurement,
        })
    }
}

/// Pull frames until the source ends, handing each report to `on_frame`.
///
/// Returns the number of frames processed. A source failure stops the loop.
pub fn run_measurements<S, F>(
    source: &mut S,
    pipeline: &mut MeasurementPipeline,
    mut on_frame: F,
) -> Result<usize, PipelineError>
where
    S: FrameSource + ?Sized,
    F: FnMut(&FrameReport),
{
    let mut frames = 0;
    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(source) => return Err(PipelineError::Frame { frames, source }),
        };
        let report = pipeline
            .process(frames, &frame)
            .map_err(|source| PipelineError::Imgproc {
                frame: frames,
                source,
            })?;
        on_frame(&report);
        frames += 1;
    }
    info!("measurement loop done after {frames} frames");
    Ok(frames)
}
