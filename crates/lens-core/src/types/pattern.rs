use serde::{Deserialize, Serialize};

use crate::{CoreError, Pt3, Real};

/// Planar calibration target: a `rows x cols` lattice of inner intersections
/// with uniform `spacing` between neighbours (metric units).
///
/// Construct through [`CalibrationPattern::new`] to get the invariants
/// checked; deserialized values should be passed through
/// [`CalibrationPattern::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPattern {
    pub rows: usize,
    pub cols: usize,
    pub spacing: Real,
}

impl Default for CalibrationPattern {
    /// 7x7 inner corners, 25 mm squares.
    fn default() -> Self {
        Self {
            rows: 7,
            cols: 7,
            spacing: 0.025,
        }
    }
}

impl CalibrationPattern {
    pub fn new(rows: usize, cols: usize, spacing: Real) -> Result<Self, CoreError> {
        let pattern = Self {
            rows,
            cols,
            spacing,
        };
        pattern.validate()?;
        Ok(pattern)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.rows < 2 || self.cols < 2 {
            return Err(CoreError::InvalidPattern(format!(
                "grid must be at least 2x2, got {}x{}",
                self.rows, self.cols
            )));
        }
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(CoreError::InvalidPattern(format!(
                "spacing must be positive, got {}",
                self.spacing
            )));
        }
        Ok(())
    }

    /// Number of intersections, `rows * cols`.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.rows * self.cols
    }

    /// World-plane points (z = 0), row-major: index `r * cols + c` is
    /// `(c * spacing, r * spacing, 0)`.
    pub fn world_points(&self) -> Vec<Pt3> {
        let mut points = Vec::with_capacity(self.point_count());
        for r in 0..self.rows {
            for c in 0..self.cols {
                points.push(Pt3::new(
                    c as Real * self.spacing,
                    r as Real * self.spacing,
                    0.0,
                ));
            }
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_points_are_row_major_on_plane() {
        let p = CalibrationPattern::new(2, 3, 0.5).unwrap();
        let pts = p.world_points();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Pt3::new(0.5, 0.0, 0.0));
        assert_eq!(pts[3], Pt3::new(0.0, 0.5, 0.0));
        assert_eq!(pts[5], Pt3::new(1.0, 0.5, 0.0));
        assert!(pts.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(CalibrationPattern::new(1, 5, 0.1).is_err());
        assert!(CalibrationPattern::new(5, 5, 0.0).is_err());
        assert!(CalibrationPattern::new(5, 5, -0.1).is_err());
        assert!(CalibrationPattern::new(5, 5, f64::NAN).is_err());
        assert!(CalibrationPattern::new(2, 2, 0.01).is_ok());
    }

    #[test]
    fn default_is_seven_by_seven() {
        let p = CalibrationPattern::default();
        assert_eq!(p.point_count(), 49);
        p.validate().unwrap();
    }
}
