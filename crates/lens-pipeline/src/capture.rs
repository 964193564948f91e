//! Correspondence accumulation and the interactive capture flow.

use image::imageops::grayscale;
use image::{GrayImage, RgbImage};
use lens_core::{
    CalibrationPattern, CalibrationResult, CalibrationSession, CoreError, ImageSize,
    ObservationId, PatternObservation, Pt2,
};
use lens_imgproc::{find_chessboard_corners, ChessboardParams};
use log::{debug, info, warn};
use thiserror::Error;

use crate::calibrate::{CalibrationError, CalibrationSolver};

/// Finds the pattern's points in a grayscale frame.
///
/// Implementations return the points in the pattern's row-major order, or
/// `None` when the full pattern is not visible.
pub trait PatternDetector {
    fn pattern(&self) -> &CalibrationPattern;
    fn detect(&self, gray: &GrayImage) -> Option<Vec<Pt2>>;
}

/// Inner-corner detector for a chessboard target.
#[derive(Debug, Clone)]
pub struct ChessboardDetector {
    pattern: CalibrationPattern,
    params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(pattern: CalibrationPattern) -> Self {
        Self {
            params: ChessboardParams::new(pattern.rows, pattern.cols),
            pattern,
        }
    }

    pub fn with_params(mut self, params: ChessboardParams) -> Self {
        self.params = ChessboardParams {
            rows: self.pattern.rows,
            cols: self.pattern.cols,
            ..params
        };
        self
    }
}

impl PatternDetector for ChessboardDetector {
    fn pattern(&self) -> &CalibrationPattern {
        &self.pattern
    }

    fn detect(&self, gray: &GrayImage) -> Option<Vec<Pt2>> {
        match find_chessboard_corners(gray, &self.params) {
            Ok(found) => found,
            Err(e) => {
                warn!("chessboard detection failed: {e}");
                None
            }
        }
    }
}

/// Pairs detected pattern points with world points and appends them to a session.
#[derive(Debug)]
pub struct CorrespondenceAccumulator<D> {
    detector: D,
    session: CalibrationSession,
}

impl<D: PatternDetector> CorrespondenceAccumulator<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            session: CalibrationSession::new(),
        }
    }

    pub fn pattern(&self) -> &CalibrationPattern {
        self.detector.pattern()
    }

    /// Observation for `frame` if the whole pattern is detected.
    pub fn try_capture(&self, frame: &RgbImage) -> Option<PatternObservation> {
        let pattern = self.detector.pattern();
        let Some(pixels) = self.detector.detect(&grayscale(frame)) else {
            debug!("pattern not found");
            return None;
        };
        if pixels.len() != pattern.point_count() {
            debug!(
                "detector returned {} of {} points",
                pixels.len(),
                pattern.point_count()
            );
            return None;
        }
        match PatternObservation::from_pattern(pattern, pixels) {
            Ok(obs) => Some(obs),
            Err(e) => {
                debug!("rejected detection: {e}");
                None
            }
        }
    }

    pub fn add_observation(
        &mut self,
        observation: PatternObservation,
        frame_size: ImageSize,
    ) -> Result<ObservationId, CoreError> {
        let id = self.session.add_observation(observation, frame_size)?;
        debug!("observation {} stored", id.0);
        Ok(id)
    }

    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    pub fn len(&self) -> usize {
        self.session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_empty()
    }

    pub fn into_session(self) -> CalibrationSession {
        self.session
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Capturing,
    Calibrating,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Keep the observation from the latest frame.
    Accept,
    /// Stop capturing and calibrate.
    Finish,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("latest frame has no pattern to accept")]
    NothingToAccept,
    #[error("{event:?} is not valid while {state:?}")]
    InvalidEvent {
        state: CaptureState,
        event: CaptureEvent,
    },
    #[error("observation rejected")]
    Session(#[from] CoreError),
    #[error("calibration failed")]
    Calibration(#[from] CalibrationError),
}

/// Capture flow driven by frames and user events.
///
/// `Capturing` accepts frames and `Accept`; `Finish` runs the solver. On
/// success the controller is `Finished` and holds the result; on failure it
/// returns to `Capturing` with the session intact.
#[derive(Debug)]
pub struct CaptureController<D> {
    accumulator: CorrespondenceAccumulator<D>,
    solver: CalibrationSolver,
    state: CaptureState,
    pending: Option<(PatternObservation, ImageSize)>,
    result: Option<CalibrationResult>,
}

impl<D: PatternDetector> CaptureController<D> {
    pub fn new(detector: D, solver: CalibrationSolver) -> Self {
        Self {
            accumulator: CorrespondenceAccumulator::new(detector),
            solver,
            state: CaptureState::Capturing,
            pending: None,
            result: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn accumulator(&self) -> &CorrespondenceAccumulator<D> {
        &self.accumulator
    }

    pub fn result(&self) -> Option<&CalibrationResult> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Option<CalibrationResult> {
        self.result
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Run detection on a frame; returns whether the pattern was found.
    ///
    /// The detection replaces any pending one. Frames are ignored outside
    /// `Capturing`.
    pub fn process_frame(&mut self, frame: &RgbImage) -> bool {
        if self.state != CaptureState::Capturing {
            return false;
        }
        let size = ImageSize::new(frame.width(), frame.height());
        self.pending = self.accumulator.try_capture(frame).map(|obs| (obs, size));
        self.pending.is_some()
    }

    pub fn handle(&mut self, event: CaptureEvent) -> Result<CaptureState, CaptureError> {
        if self.state != CaptureState::Capturing {
            return Err(CaptureError::InvalidEvent {
                state: self.state,
                event,
            });
        }
        match event {
            CaptureEvent::Accept => {
                let (obs, size) = self.pending.take().ok_or(CaptureError::NothingToAccept)?;
                let id = self.accumulator.add_observation(obs, size)?;
                info!(
                    "accepted view {} ({} of {} needed)",
                    id.0,
                    self.accumulator.len(),
                    self.solver.required_observations()
                );
            }
            CaptureEvent::Finish => {
                self.pending = None;
                self.state = CaptureState::Calibrating;
                match self.solver.solve(self.accumulator.session()) {
                    Ok(result) => {
                        self.result = Some(result);
                        self.state = CaptureState::Finished;
                    }
                    Err(e) => {
                        warn!("calibration failed: {e}");
                        self.state = CaptureState::Capturing;
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(self.state)
    }
}
