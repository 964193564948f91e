//! Synthetic views of a planar calibration pattern.

use anyhow::{bail, Result};
use nalgebra::{Translation3, UnitQuaternion};

use crate::{
    CalibrationPattern, CalibrationSession, ImageSize, Iso3, PatternObservation, PinholeCamera,
    Pt2, Real, Vec3,
};

use super::UniformPixelNoise;

/// `n_views` poses looking at the pattern centre from `distance`, each with a
/// different tilt about the X and Y axes and a small in-plane roll.
///
/// The tilt schedule cycles through all four quadrants so the set is never
/// degenerate for closed-form intrinsics.
pub fn tilted_poses(pattern: &CalibrationPattern, n_views: usize, distance: Real) -> Vec<Iso3> {
    let center = Vec3::new(
        (pattern.cols - 1) as Real * pattern.spacing * 0.5,
        (pattern.rows - 1) as Real * pattern.spacing * 0.5,
        0.0,
    );
    (0..n_views)
        .map(|i| {
            let phase = i as Real * std::f64::consts::FRAC_PI_2 + 0.3 * (i / 4) as Real;
            let tilt = 0.25 + 0.05 * (i % 3) as Real;
            let rx = tilt * phase.cos();
            let ry = tilt * phase.sin();
            let rz = 0.1 * ((i % 5) as Real - 2.0);
            let rotation = UnitQuaternion::from_euler_angles(rx, ry, rz);

            let offset = Vec3::new(
                0.01 * ((i % 3) as Real - 1.0),
                0.01 * ((i % 2) as Real - 0.5),
                distance * (1.0 + 0.05 * (i % 4) as Real),
            );
            let translation = offset - rotation * center;
            Iso3::from_parts(Translation3::from(translation), rotation)
        })
        .collect()
}

/// Project every pattern point through `camera` at `pose`, adding `noise`.
///
/// Fails if a point ends up behind the camera.
pub fn project_observation(
    camera: &PinholeCamera<Real>,
    pattern: &CalibrationPattern,
    pose: &Iso3,
    noise: &UniformPixelNoise,
    view_idx: usize,
) -> Result<PatternObservation> {
    let mut pixels = Vec::with_capacity(pattern.point_count());
    for (idx, pw) in pattern.world_points().iter().enumerate() {
        let pc = pose.transform_point(pw);
        let Some(uv) = camera.project_point(&pc) else {
            bail!("point {idx} of view {view_idx} not projectable (z={:.6})", pc.z);
        };
        pixels.push(Pt2::from(uv + noise.sample(view_idx, idx)));
    }
    Ok(PatternObservation::from_pattern(pattern, pixels)?)
}

/// Build a full session from synthetic views.
pub fn synthetic_session(
    camera: &PinholeCamera<Real>,
    pattern: &CalibrationPattern,
    poses: &[Iso3],
    image_size: ImageSize,
    noise: &UniformPixelNoise,
) -> Result<CalibrationSession> {
    let mut session = CalibrationSession::new();
    for (view_idx, pose) in poses.iter().enumerate() {
        let obs = project_observation(camera, pattern, pose, noise, view_idx)?;
        session.add_observation(obs, image_size)?;
    }
    Ok(session)
}
