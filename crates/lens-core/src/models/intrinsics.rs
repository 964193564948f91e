use nalgebra::{Matrix3, RealField, Vector2};
use serde::{Deserialize, Serialize};

/// Intrinsics that map normalized image-plane coordinates to pixels.
pub trait IntrinsicsModel<S: RealField + Copy> {
    /// Normalized plane -> pixel.
    fn sensor_to_pixel(&self, sensor: &Vector2<S>) -> Vector2<S>;
    /// Pixel -> normalized plane.
    fn pixel_to_sensor(&self, pixel: &Vector2<S>) -> Vector2<S>;
}

/// Pinhole intrinsics with optional skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxFyCxCySkew<S: RealField + Copy> {
    /// Focal length in pixels along X.
    pub fx: S,
    /// Focal length in pixels along Y.
    pub fy: S,
    /// Principal point X coordinate in pixels.
    pub cx: S,
    /// Principal point Y coordinate in pixels.
    pub cy: S,
    /// Skew term (typically 0).
    pub skew: S,
}

impl<S: RealField + Copy> FxFyCxCySkew<S> {
    /// Return the 3x3 camera matrix K.
    pub fn k_matrix(&self) -> Matrix3<S> {
        Matrix3::new(
            self.fx,
            self.skew,
            self.cx,
            S::zero(),
            self.fy,
            self.cy,
            S::zero(),
            S::zero(),
            S::one(),
        )
    }

    /// Read intrinsics back from a camera matrix.
    ///
    /// Returns `None` unless `k` is upper triangular with `K[2][2] = 1` and
    /// strictly positive focal lengths.
    pub fn from_k_matrix(k: &Matrix3<S>) -> Option<Self> {
        let zero = S::zero();
        if k[(1, 0)] != zero || k[(2, 0)] != zero || k[(2, 1)] != zero || k[(2, 2)] != S::one() {
            return None;
        }
        if k[(0, 0)] <= zero || k[(1, 1)] <= zero {
            return None;
        }
        Some(Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        })
    }

    /// K stored row-major as 9 values.
    pub fn to_row_major(&self) -> [S; 9] {
        let k = self.k_matrix();
        [
            k[(0, 0)],
            k[(0, 1)],
            k[(0, 2)],
            k[(1, 0)],
            k[(1, 1)],
            k[(1, 2)],
            k[(2, 0)],
            k[(2, 1)],
            k[(2, 2)],
        ]
    }

    /// Inverse of [`Self::to_row_major`]; validates like [`Self::from_k_matrix`].
    pub fn from_row_major(values: &[S; 9]) -> Option<Self> {
        Self::from_k_matrix(&Matrix3::from_row_slice(values))
    }
}

impl<S: RealField + Copy> IntrinsicsModel<S> for FxFyCxCySkew<S> {
    fn sensor_to_pixel(&self, sensor: &Vector2<S>) -> Vector2<S> {
        let u = self.fx * sensor.x + self.skew * sensor.y + self.cx;
        let v = self.fy * sensor.y + self.cy;
        Vector2::new(u, v)
    }

    fn pixel_to_sensor(&self, pixel: &Vector2<S>) -> Vector2<S> {
        let sy = (pixel.y - self.cy) / self.fy;
        let sx = (pixel.x - self.cx - self.skew * sy) / self.fx;
        Vector2::new(sx, sy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_layout_matches_k() {
        let k = FxFyCxCySkew {
            fx: 800.0,
            fy: 790.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.5,
        };
        let rm = k.to_row_major();
        assert_eq!(rm, [800.0, 0.5, 320.0, 0.0, 790.0, 240.0, 0.0, 0.0, 1.0]);
        assert_eq!(FxFyCxCySkew::from_row_major(&rm), Some(k));
    }

    #[test]
    fn rejects_non_projective_matrices() {
        let bad_focal = [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        assert!(FxFyCxCySkew::<f64>::from_row_major(&bad_focal).is_none());
        let lower = [1.0, 0.0, 0.0, 0.2, 1.0, 0.0, 0.0, 0.0, 1.0];
        assert!(FxFyCxCySkew::<f64>::from_row_major(&lower).is_none());
        let scaled = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0];
        assert!(FxFyCxCySkew::<f64>::from_row_major(&scaled).is_none());
    }
}
