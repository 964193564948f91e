use lens_core::{from_homogeneous, to_homogeneous, Mat3, Pt2, Real};
use nalgebra::DMatrix;
use thiserror::Error;

use crate::math::normalize_points_2d;

#[derive(Debug, Error)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point sets differ in length: {0} vs {1}")]
    LengthMismatch(usize, usize),
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Estimate `H` with `image ~ H * world` by normalised DLT.
///
/// Both point sets are Hartley-normalised before solving `A h = 0`, and the
/// result is scaled so that `H[2][2] = 1` whenever that entry is non-zero.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::LengthMismatch(n, image.len()));
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let (world_n, t_world) = normalize_points_2d(world).ok_or(HomographyError::Degenerate)?;
    let (image_n, t_image) = normalize_points_2d(image).ok_or(HomographyError::Degenerate)?;

    // Pad to at least 9 rows so the thin SVD still exposes the null vector.
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<Real>::zeros(rows, 9);
    for (i, (pw, pi)) in world_n.iter().zip(&image_n).enumerate() {
        let (x, y, u, v) = (pw.x, pw.y, pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let (min_idx, _) = svd.singular_values.argmin();
    let h = v_t.row(min_idx);
    let h_norm = Mat3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    let t_image_inv = t_image.try_inverse().ok_or(HomographyError::Degenerate)?;
    let mut h_mat = t_image_inv * h_norm * t_world;

    let scale = h_mat[(2, 2)];
    if scale.abs() > Real::EPSILON {
        h_mat /= scale;
    }
    if !h_mat.iter().all(|v| v.is_finite()) {
        return Err(HomographyError::Degenerate);
    }
    Ok(h_mat)
}

/// Root-mean-square transfer error of `H` over the correspondences (pixels).
pub fn homography_rms_error(h: &Mat3, world: &[Pt2], image: &[Pt2]) -> Real {
    if world.is_empty() {
        return 0.0;
    }
    let sum_sq: Real = world
        .iter()
        .zip(image)
        .map(|(pw, pi)| match from_homogeneous(&(h * to_homogeneous(pw))) {
            Some(p) => (p - pi).norm_squared(),
            None => Real::INFINITY,
        })
        .sum();
    (sum_sq / world.len() as Real).sqrt()
}
