use std::fs;
use std::path::Path;

use log::debug;
use nalgebra::{Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::{
    BrownConrady5, CoreError, FxFyCxCySkew, ImageSize, Iso3, Mat3, PinholeCamera, Real, Vec3,
};

/// Pose of the pattern in the camera frame for one observation
/// (`p_cam = R(rvec) * p_pattern + tvec`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    /// Axis-angle rotation vector (radians).
    pub rvec: [Real; 3],
    pub tvec: [Real; 3],
}

impl ViewPose {
    pub fn from_iso(pose: &Iso3) -> Self {
        let r = pose.rotation.scaled_axis();
        let t = pose.translation.vector;
        Self {
            rvec: [r.x, r.y, r.z],
            tvec: [t.x, t.y, t.z],
        }
    }

    pub fn to_iso(&self) -> Iso3 {
        let rotation = UnitQuaternion::from_scaled_axis(Vec3::from(self.rvec));
        Iso3::from_parts(Translation3::from(Vec3::from(self.tvec)), rotation)
    }
}

/// Solved camera model plus per-observation poses and error statistics.
///
/// Persisted as JSON with the camera matrix as 9 row-major values and the
/// distortion vector as `[k1, k2, k3, p1, p2]`; see [`CalibrationResult::save_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CalibrationFile", into = "CalibrationFile")]
pub struct CalibrationResult {
    image_size: ImageSize,
    camera: PinholeCamera<Real>,
    poses: Vec<ViewPose>,
    rms_error: Real,
    per_view_errors: Vec<Real>,
}

impl CalibrationResult {
    /// Validate and assemble a result.
    ///
    /// `per_view_errors` is either empty or has one entry per pose.
    pub fn new(
        image_size: ImageSize,
        camera: PinholeCamera<Real>,
        poses: Vec<ViewPose>,
        rms_error: Real,
        per_view_errors: Vec<Real>,
    ) -> Result<Self, CoreError> {
        let k = camera.k;
        if !(k.fx.is_finite() && k.fy.is_finite() && k.fx > 0.0 && k.fy > 0.0) {
            return Err(CoreError::InvalidResult(format!(
                "focal lengths must be positive, got fx={} fy={}",
                k.fx, k.fy
            )));
        }
        let finite = [k.cx, k.cy, k.skew]
            .into_iter()
            .chain(camera.dist.coeffs())
            .chain(poses.iter().flat_map(|p| p.rvec.into_iter().chain(p.tvec)))
            .all(Real::is_finite);
        if !finite {
            return Err(CoreError::InvalidResult(
                "camera parameters and poses must be finite".to_string(),
            ));
        }
        if !per_view_errors.is_empty() && per_view_errors.len() != poses.len() {
            return Err(CoreError::InvalidResult(format!(
                "{} per-view errors for {} poses",
                per_view_errors.len(),
                poses.len()
            )));
        }
        Ok(Self {
            image_size,
            camera,
            poses,
            rms_error,
            per_view_errors,
        })
    }

    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    pub fn camera(&self) -> &PinholeCamera<Real> {
        &self.camera
    }

    pub fn intrinsics(&self) -> &FxFyCxCySkew<Real> {
        &self.camera.k
    }

    pub fn distortion(&self) -> &BrownConrady5<Real> {
        &self.camera.dist
    }

    pub fn k_matrix(&self) -> Mat3 {
        self.camera.k.k_matrix()
    }

    pub fn poses(&self) -> &[ViewPose] {
        &self.poses
    }

    /// Root-mean-square reprojection error over all points (pixels).
    pub fn rms_error(&self) -> Real {
        self.rms_error
    }

    /// Mean reprojection error of each observation (pixels).
    pub fn per_view_errors(&self) -> &[Real] {
        &self.per_view_errors
    }

    /// Mean of [`Self::per_view_errors`]; `None` when unknown.
    pub fn mean_reprojection_error(&self) -> Option<Real> {
        if self.per_view_errors.is_empty() {
            return None;
        }
        Some(self.per_view_errors.iter().sum::<Real>() / self.per_view_errors.len() as Real)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), CoreError> {
        let path = path.as_ref();
        let text = self.to_json_string().map_err(|source| CoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("saved calibration ({} views) to {}", self.poses.len(), path.display());
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| CoreError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// On-disk layout of a [`CalibrationResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalibrationFile {
    image_size: ImageSize,
    /// Row-major 3x3 camera matrix.
    camera_matrix: [Real; 9],
    /// `[k1, k2, k3, p1, p2]`.
    distortion_coeffs: [Real; 5],
    rvecs: Vec<[Real; 3]>,
    tvecs: Vec<[Real; 3]>,
    rms_error: Real,
    #[serde(default)]
    per_view_errors: Vec<Real>,
}

impl From<CalibrationResult> for CalibrationFile {
    fn from(result: CalibrationResult) -> Self {
        Self {
            image_size: result.image_size,
            camera_matrix: result.camera.k.to_row_major(),
            distortion_coeffs: result.camera.dist.coeffs(),
            rvecs: result.poses.iter().map(|p| p.rvec).collect(),
            tvecs: result.poses.iter().map(|p| p.tvec).collect(),
            rms_error: result.rms_error,
            per_view_errors: result.per_view_errors,
        }
    }
}

impl TryFrom<CalibrationFile> for CalibrationResult {
    type Error = CoreError;

    fn try_from(file: CalibrationFile) -> Result<Self, Self::Error> {
        let k = FxFyCxCySkew::from_row_major(&file.camera_matrix).ok_or_else(|| {
            CoreError::InvalidResult(
                "camera_matrix must be upper triangular with K[2][2] = 1 and positive focal lengths"
                    .to_string(),
            )
        })?;
        if file.rvecs.len() != file.tvecs.len() {
            return Err(CoreError::InvalidResult(format!(
                "{} rotation vectors but {} translation vectors",
                file.rvecs.len(),
                file.tvecs.len()
            )));
        }
        let poses = file
            .rvecs
            .into_iter()
            .zip(file.tvecs)
            .map(|(rvec, tvec)| ViewPose { rvec, tvec })
            .collect();
        let camera = PinholeCamera::new(k, BrownConrady5::from_coeffs(file.distortion_coeffs));
        Self::new(file.image_size, camera, poses, file.rms_error, file.per_view_errors)
    }
}
