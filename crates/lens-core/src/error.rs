use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or persisting calibration data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid calibration pattern: {0}")]
    InvalidPattern(String),
    #[error("invalid observation: {0}")]
    InvalidObservation(String),
    #[error("observation has {got} points, session expects {expected}")]
    PointCountMismatch { expected: usize, got: usize },
    #[error("frame is {got_w}x{got_h}, session was captured at {expected_w}x{expected_h}")]
    ResolutionMismatch {
        expected_w: u32,
        expected_h: u32,
        got_w: u32,
        got_h: u32,
    },
    #[error("invalid calibration result: {0}")]
    InvalidResult(String),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
