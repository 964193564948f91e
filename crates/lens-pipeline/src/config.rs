//! JSON configuration for capture, calibration and measurement.
//!
//! Every section and field has a default, so a partial (or empty) file is a
//! valid configuration.

use std::fs;
use std::path::{Path, PathBuf};

use lens_core::{CalibrationPattern, CoreError, Real};
use lens_imgproc::HoughCircleParams;
use lens_optim::{IntrinsicsMask, RobustKernel, SolveOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Pattern(#[from] CoreError),
}

/// Read and deserialize a JSON file.
pub fn load_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub pattern: PatternConfig,
    pub calibration: CalibrationConfig,
    pub detector: DetectorConfig,
    pub measurement: MeasurementConfig,
}

impl LensConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_json_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pattern.to_pattern()?;
        if self.calibration.min_observations == 0 {
            return Err(ConfigError::Invalid(
                "calibration.min_observations must be at least 1".into(),
            ));
        }
        if self.detector.blur_kernel % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "detector.blur_kernel must be odd, got {}",
                self.detector.blur_kernel
            )));
        }
        let dp = self.detector.dp;
        if !(dp.is_finite() && dp >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "detector.dp must be at least 1, got {dp}"
            )));
        }
        let d = self.measurement.reference_diameter;
        if !(d.is_finite() && d > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "measurement.reference_diameter must be positive, got {d}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub rows: usize,
    pub cols: usize,
    /// Distance between adjacent corners, in the unit results are reported in.
    pub spacing: Real,
}

impl Default for PatternConfig {
    fn default() -> Self {
        let p = CalibrationPattern::default();
        Self {
            rows: p.rows,
            cols: p.cols,
            spacing: p.spacing,
        }
    }
}

impl PatternConfig {
    pub fn to_pattern(&self) -> Result<CalibrationPattern, CoreError> {
        CalibrationPattern::new(self.rows, self.cols, self.spacing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub min_observations: usize,
    pub fix_skew: bool,
    pub fix_k3: bool,
    pub fix_tangential: bool,
    pub robust_kernel: RobustKernel,
    pub max_iters: usize,
    pub ftol: Real,
    pub gtol: Real,
    pub xtol: Real,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let mask = IntrinsicsMask::default();
        let opts = SolveOptions::default();
        Self {
            min_observations: 10,
            fix_skew: mask.fix_skew,
            fix_k3: mask.fix_k3,
            fix_tangential: mask.fix_tangential,
            robust_kernel: RobustKernel::None,
            max_iters: opts.max_iters,
            ftol: opts.ftol,
            gtol: opts.gtol,
            xtol: opts.xtol,
        }
    }
}

impl CalibrationConfig {
    pub fn mask(&self) -> IntrinsicsMask {
        IntrinsicsMask {
            fix_skew: self.fix_skew,
            fix_k3: self.fix_k3,
            fix_tangential: self.fix_tangential,
        }
    }

    pub fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            max_iters: self.max_iters,
            ftol: self.ftol,
            gtol: self.gtol,
            xtol: self.xtol,
        }
    }
}

/// Marker detector settings: pre-blur plus Hough gradient parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub blur_kernel: usize,
    pub blur_sigma: f32,
    pub dp: f32,
    pub min_dist: f32,
    pub param1: f32,
    pub param2: u32,
    pub min_radius: f32,
    pub max_radius: f32,
    pub max_circles: Option<usize>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let hough = HoughCircleParams::default();
        Self {
            blur_kernel: 9,
            blur_sigma: 2.0,
            dp: hough.dp,
            min_dist: hough.min_dist,
            param1: hough.param1,
            param2: hough.param2,
            min_radius: hough.min_radius,
            max_radius: hough.max_radius,
            max_circles: hough.max_circles,
        }
    }
}

impl DetectorConfig {
    pub fn hough_params(&self) -> HoughCircleParams {
        HoughCircleParams {
            dp: self.dp,
            min_dist: self.min_dist,
            param1: self.param1,
            param2: self.param2,
            min_radius: self.min_radius,
            max_radius: self.max_radius,
            max_circles: self.max_circles,
        }
    }
}

/// Which detected circle provides the metric scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReferenceSelector {
    /// Strongest detection.
    #[default]
    First,
    /// Detection whose centre is closest to a pixel.
    NearestTo { x: f32, y: f32 },
    /// Strongest detection whose centre lies inside a pixel rectangle.
    InRegion {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Physical diameter of the reference marker.
    pub reference_diameter: Real,
    pub reference: ReferenceSelector,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            reference_diameter: 2.5,
            reference: ReferenceSelector::First,
        }
    }
}
