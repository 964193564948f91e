//! Scalar and linear-algebra aliases shared by every `spatial-lens` crate.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, Vector2, Vector3};

pub mod coordinate_utils;

pub use coordinate_utils::{distort_to_pixel, normalized_to_pixel, pixel_to_normalized, undistort_pixel};

/// Scalar type used throughout the workspace.
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3x3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// Rigid transform in SE(3).
pub type Iso3 = Isometry3<Real>;

/// Lift a 2D point to homogeneous coordinates `(x, y, 1)`.
pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

/// Drop a homogeneous vector back to a 2D point.
///
/// Returns `None` when the last coordinate is (numerically) zero, i.e. the
/// point lies at infinity.
pub fn from_homogeneous(v: &Vec3) -> Option<Pt2> {
    if v.z.abs() <= Real::EPSILON {
        return None;
    }
    Some(Pt2::new(v.x / v.z, v.y / v.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homogeneous_roundtrip() {
        let p = Pt2::new(3.5, -2.0);
        let h = to_homogeneous(&p) * 4.0;
        let back = from_homogeneous(&h).unwrap();
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn point_at_infinity_is_rejected() {
        assert!(from_homogeneous(&Vec3::new(1.0, 2.0, 0.0)).is_none());
    }
}
