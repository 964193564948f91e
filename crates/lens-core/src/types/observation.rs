use serde::{Deserialize, Serialize};

use crate::{CalibrationPattern, CoreError, Pt2, Pt3};

/// Correspondences from one accepted frame: world-plane points paired in
/// order with their detected pixels.
///
/// Immutable once built. All world points lie on the `z = 0` plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ObservationData")]
pub struct PatternObservation {
    points_3d: Vec<Pt3>,
    points_2d: Vec<Pt2>,
}

#[derive(Deserialize)]
struct ObservationData {
    points_3d: Vec<Pt3>,
    points_2d: Vec<Pt2>,
}

impl TryFrom<ObservationData> for PatternObservation {
    type Error = CoreError;

    fn try_from(data: ObservationData) -> Result<Self, Self::Error> {
        Self::new(data.points_3d, data.points_2d)
    }
}

impl PatternObservation {
    /// Minimum correspondences for a homography.
    pub const MIN_POINTS: usize = 4;

    pub fn new(points_3d: Vec<Pt3>, points_2d: Vec<Pt2>) -> Result<Self, CoreError> {
        if points_3d.len() != points_2d.len() {
            return Err(CoreError::InvalidObservation(format!(
                "3D / 2D point counts must match: {} vs {}",
                points_3d.len(),
                points_2d.len()
            )));
        }
        if points_3d.len() < Self::MIN_POINTS {
            return Err(CoreError::InvalidObservation(format!(
                "need at least {} points, got {}",
                Self::MIN_POINTS,
                points_3d.len()
            )));
        }
        if let Some(idx) = points_3d.iter().position(|p| p.z != 0.0) {
            return Err(CoreError::InvalidObservation(format!(
                "world point {idx} is off the pattern plane (z = {})",
                points_3d[idx].z
            )));
        }
        if points_2d.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return Err(CoreError::InvalidObservation(
                "pixel coordinates must be finite".to_string(),
            ));
        }
        Ok(Self {
            points_3d,
            points_2d,
        })
    }

    /// Pair detected pixels, in detection order, with the pattern's world grid.
    pub fn from_pattern(pattern: &CalibrationPattern, pixels: Vec<Pt2>) -> Result<Self, CoreError> {
        if pixels.len() != pattern.point_count() {
            return Err(CoreError::PointCountMismatch {
                expected: pattern.point_count(),
                got: pixels.len(),
            });
        }
        Self::new(pattern.world_points(), pixels)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }

    pub fn points_3d(&self) -> &[Pt3] {
        &self.points_3d
    }

    pub fn points_2d(&self) -> &[Pt2] {
        &self.points_2d
    }

    /// World points projected onto the pattern plane as 2D coordinates.
    pub fn planar_points(&self) -> Vec<Pt2> {
        self.points_3d.iter().map(|p| Pt2::new(p.x, p.y)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> (Vec<Pt3>, Vec<Pt2>) {
        (
            vec![
                Pt3::new(0.0, 0.0, 0.0),
                Pt3::new(1.0, 0.0, 0.0),
                Pt3::new(1.0, 1.0, 0.0),
                Pt3::new(0.0, 1.0, 0.0),
            ],
            vec![
                Pt2::new(10.0, 10.0),
                Pt2::new(20.0, 10.0),
                Pt2::new(20.0, 20.0),
                Pt2::new(10.0, 20.0),
            ],
        )
    }

    #[test]
    fn rejects_length_mismatch_and_off_plane_points() {
        let (w, mut p) = square();
        p.pop();
        assert!(PatternObservation::new(w.clone(), p).is_err());

        let (mut w2, p2) = square();
        w2[2].z = 0.1;
        assert!(PatternObservation::new(w2, p2).is_err());

        let (w3, p3) = square();
        assert_eq!(PatternObservation::new(w3, p3).unwrap().len(), 4);
    }

    #[test]
    fn from_pattern_pairs_in_detection_order() {
        let pattern = CalibrationPattern::new(2, 2, 0.1).unwrap();
        let (_, pixels) = square();
        let obs = PatternObservation::from_pattern(&pattern, pixels.clone()).unwrap();
        assert_eq!(obs.points_2d(), pixels.as_slice());
        assert_eq!(obs.points_3d()[1], Pt3::new(0.1, 0.0, 0.0));
        assert_eq!(obs.planar_points()[3], Pt2::new(0.0, 0.1));
    }

    #[test]
    fn deserialization_runs_validation() {
        let bad = r#"{"points_3d":[[0,0,0]],"points_2d":[[1,1]]}"#;
        assert!(serde_json::from_str::<PatternObservation>(bad).is_err());
    }
}
