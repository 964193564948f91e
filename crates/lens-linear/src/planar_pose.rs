use lens_core::{FxFyCxCySkew, Iso3, Mat3, Real, Vec3};
use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanarPoseError {
    #[error("camera matrix is singular")]
    SingularIntrinsics,
    #[error("homography columns vanish after removing K")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Pose of a `Z = 0` pattern in the camera frame from its homography and K.
///
/// `K⁻¹ H = λ [r1 r2 t]`; the rotation is projected onto SO(3) and the sign of
/// `λ` is chosen so the pattern lies in front of the camera.
pub fn estimate_planar_pose_from_h(
    intrinsics: &FxFyCxCySkew<Real>,
    h: &Mat3,
) -> Result<Iso3, PlanarPoseError> {
    let k_inv = intrinsics
        .k_matrix()
        .try_inverse()
        .ok_or(PlanarPoseError::SingularIntrinsics)?;

    let a1: Vec3 = k_inv * h.column(0);
    let a2: Vec3 = k_inv * h.column(1);
    let a3: Vec3 = k_inv * h.column(2);

    let mean_norm = 0.5 * (a1.norm() + a2.norm());
    if mean_norm <= Real::EPSILON {
        return Err(PlanarPoseError::Degenerate);
    }
    let mut lambda = 1.0 / mean_norm;
    if a3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Mat3::from_columns(&[r1, r2, r3]);

    // Closest rotation in the Frobenius sense.
    let svd = r.svd(true, true);
    let u = svd.u.ok_or(PlanarPoseError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PlanarPoseError::SvdFailed)?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(a3 * lambda), rotation))
}
