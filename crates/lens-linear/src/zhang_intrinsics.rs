use lens_core::{FxFyCxCySkew, Mat3, Real};
use log::debug;
use nalgebra::{DMatrix, SVector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZhangError {
    #[error("need at least 3 homographies, got {0}")]
    NotEnoughViews(usize),
    #[error("svd failed")]
    SvdFailed,
    #[error("degenerate view configuration (views too similar)")]
    Degenerate,
    #[error("estimated image of the absolute conic is not positive definite")]
    NotPositiveDefinite,
}

/// Row of Zhang's constraint matrix built from columns `i` and `j` of `H`.
fn v_ij(h: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Similarity `N` (and its inverse) that moves the images of the pattern
/// origins to zero mean and roughly unit scale.
fn conditioning(homographies: &[Mat3]) -> (Mat3, Mat3) {
    let origins: Vec<(Real, Real)> = homographies
        .iter()
        .filter(|h| h[(2, 2)].abs() > Real::EPSILON)
        .map(|h| (h[(0, 2)] / h[(2, 2)], h[(1, 2)] / h[(2, 2)]))
        .collect();
    if origins.is_empty() {
        return (Mat3::identity(), Mat3::identity());
    }
    let cnt = origins.len() as Real;
    let mx = origins.iter().map(|o| o.0).sum::<Real>() / cnt;
    let my = origins.iter().map(|o| o.1).sum::<Real>() / cnt;
    let spread = origins.iter().map(|o| o.0.hypot(o.1)).sum::<Real>() / cnt;
    let s = 1.0 / spread.max(1.0);
    let n = Mat3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0);
    let n_inv = Mat3::new(1.0 / s, 0.0, mx, 0.0, 1.0 / s, my, 0.0, 0.0, 1.0);
    (n, n_inv)
}

/// Closed-form intrinsics from plane-to-image homographies (Zhang, 2000).
///
/// Each homography contributes the two orthonormality constraints
/// `v12ᵀ b = 0` and `(v11 - v22)ᵀ b = 0` on `B = K⁻ᵀ K⁻¹`. Distortion is
/// ignored, so the estimate is only a starting point.
pub fn estimate_intrinsics_from_homographies(
    homographies: &[Mat3],
) -> Result<FxFyCxCySkew<Real>, ZhangError> {
    let m = homographies.len();
    if m < 3 {
        return Err(ZhangError::NotEnoughViews(m));
    }

    let (n, n_inv) = conditioning(homographies);

    let mut v = DMatrix::<Real>::zeros(2 * m, 6);
    for (k, h) in homographies.iter().enumerate() {
        // Work with N * H (pixels mapped to unit scale), each at unit norm.
        let h = n * h;
        let h = h / h.norm();
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);
        v.row_mut(2 * k).copy_from(&v12.transpose());
        v.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = v.svd(false, true);
    let v_t = svd.v_t.ok_or(ZhangError::SvdFailed)?;
    let mut sorted: Vec<Real> = svd.singular_values.iter().copied().collect();
    sorted.sort_by(Real::total_cmp);
    // A second vanishing singular value leaves B undetermined.
    if sorted[1] <= 1e-9 * sorted[sorted.len() - 1] {
        return Err(ZhangError::Degenerate);
    }
    let (min_idx, _) = svd.singular_values.argmin();
    let b = v_t.row(min_idx);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-9 {
        return Err(ZhangError::Degenerate);
    }

    let cy = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + cy * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() || denom.signum() != lambda.signum() * b11.signum() {
        return Err(ZhangError::NotPositiveDefinite);
    }

    let fx = (lambda / b11).sqrt();
    let fy = (lambda * b11 / denom).sqrt();
    let skew = -b12 * fx * fx * fy / lambda;
    let cx = skew * cy / fy - b13 * fx * fx / lambda;

    // Undo the conditioning: K = N⁻¹ K'.
    let k_cond = FxFyCxCySkew {
        fx,
        fy,
        cx,
        cy,
        skew,
    }
    .k_matrix();
    let k_mat = n_inv * k_cond;
    let (fx, fy, cx, cy, skew) = (
        k_mat[(0, 0)],
        k_mat[(1, 1)],
        k_mat[(0, 2)],
        k_mat[(1, 2)],
        k_mat[(0, 1)],
    );
    if ![fx, fy, cx, cy, skew].iter().all(|x| x.is_finite()) {
        return Err(ZhangError::Degenerate);
    }
    let k = FxFyCxCySkew {
        fx,
        fy,
        cx,
        cy,
        skew,
    };
    debug!(
        "zhang init from {m} views: fx={fx:.2} fy={fy:.2} cx={cx:.2} cy={cy:.2} skew={skew:.4}"
    );
    Ok(k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_core::Vec3;
    use nalgebra::Rotation3;

    fn k_gt() -> FxFyCxCySkew<Real> {
        FxFyCxCySkew {
            fx: 900.0,
            fy: 880.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        }
    }

    fn homography(k: &Mat3, rot: Rotation3<Real>, t: Vec3) -> Mat3 {
        let r = rot.matrix();
        let mut h = Mat3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));
        h
    }

    #[test]
    fn recovers_intrinsics_from_exact_homographies() {
        let k = k_gt().k_matrix();
        let hs = vec![
            homography(&k, Rotation3::from_euler_angles(0.1, 0.0, 0.05), Vec3::new(0.1, -0.05, 1.0)),
            homography(&k, Rotation3::from_euler_angles(-0.05, 0.15, -0.1), Vec3::new(-0.05, 0.1, 1.2)),
            homography(&k, Rotation3::from_euler_angles(0.2, -0.1, 0.0), Vec3::new(0.0, 0.0, 0.9)),
        ];
        let est = estimate_intrinsics_from_homographies(&hs).unwrap();
        let gt = k_gt();
        assert!((est.fx - gt.fx).abs() < 1e-3, "fx {}", est.fx);
        assert!((est.fy - gt.fy).abs() < 1e-3, "fy {}", est.fy);
        assert!((est.cx - gt.cx).abs() < 1e-3, "cx {}", est.cx);
        assert!((est.cy - gt.cy).abs() < 1e-3, "cy {}", est.cy);
        assert!(est.skew.abs() < 1e-6);
    }

    #[test]
    fn sign_of_homography_does_not_matter() {
        let k = k_gt().k_matrix();
        let hs = vec![
            homography(&k, Rotation3::from_euler_angles(0.1, 0.0, 0.05), Vec3::new(0.1, -0.05, 1.0)),
            -homography(&k, Rotation3::from_euler_angles(-0.05, 0.15, -0.1), Vec3::new(-0.05, 0.1, 1.2)),
            homography(&k, Rotation3::from_euler_angles(0.2, -0.1, 0.0), Vec3::new(0.0, 0.0, 0.9)) * 3.0,
        ];
        let est = estimate_intrinsics_from_homographies(&hs).unwrap();
        assert!((est.fx - 900.0).abs() < 1e-3);
    }

    #[test]
    fn too_few_views_is_an_error() {
        let h = Mat3::identity();
        assert!(matches!(
            estimate_intrinsics_from_homographies(&[h, h]),
            Err(ZhangError::NotEnoughViews(2))
        ));
    }

    #[test]
    fn repeated_view_is_degenerate() {
        let k = k_gt().k_matrix();
        let h = homography(&k, Rotation3::from_euler_angles(0.2, -0.1, 0.0), Vec3::new(0.0, 0.0, 0.9));
        assert!(matches!(
            estimate_intrinsics_from_homographies(&[h, h, h, h]),
            Err(ZhangError::Degenerate)
        ));
    }
}
