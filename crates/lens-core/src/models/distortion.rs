use nalgebra::{RealField, Vector2};
use serde::{Deserialize, Serialize};

/// Lens distortion acting on normalized image-plane coordinates.
pub trait DistortionModel<S: RealField + Copy> {
    /// Ideal -> distorted.
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S>;
    /// Distorted -> ideal (usually iterative).
    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S>;
}

/// Brown-Conrady model with three radial (`k1`, `k2`, `k3`) and two
/// tangential (`p1`, `p2`) coefficients.
///
/// `iters` is the fixed-point iteration count used by
/// [`DistortionModel::undistort`]; `0` selects the default of 8.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5<S: RealField> {
    pub k1: S,
    pub k2: S,
    pub k3: S,
    pub p1: S,
    pub p2: S,
    #[serde(default)]
    pub iters: u32,
}

impl<S: RealField + Copy> BrownConrady5<S> {
    /// Build from a coefficient vector ordered radial first, then tangential:
    /// `[k1, k2, k3, p1, p2]`.
    pub fn from_coeffs(c: [S; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            k3: c[2],
            p1: c[3],
            p2: c[4],
            iters: 0,
        }
    }

    /// Coefficients as `[k1, k2, k3, p1, p2]`.
    pub fn coeffs(&self) -> [S; 5] {
        [self.k1, self.k2, self.k3, self.p1, self.p2]
    }

    fn distort_impl(&self, x: S, y: S) -> (S, S) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = S::one() + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let two = S::one() + S::one();
        let xy = x * y;
        let x_tan = two * self.p1 * xy + self.p2 * (r2 + two * x * x);
        let y_tan = self.p1 * (r2 + two * y * y) + two * self.p2 * xy;

        (x * radial + x_tan, y * radial + y_tan)
    }
}

impl<S: RealField + Copy> DistortionModel<S> for BrownConrady5<S> {
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S> {
        let (xd, yd) = self.distort_impl(n_undist.x, n_undist.y);
        Vector2::new(xd, yd)
    }

    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S> {
        let mut x = n_dist.x;
        let mut y = n_dist.y;

        let iters = if self.iters == 0 { 8 } else { self.iters };
        for _ in 0..iters {
            let (xd, yd) = self.distort_impl(x, y);
            x -= xd - n_dist.x;
            y -= yd - n_dist.y;
        }
        Vector2::new(x, y)
    }
}
