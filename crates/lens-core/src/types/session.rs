use serde::{Deserialize, Serialize};

use crate::{CoreError, PatternObservation};

/// Frame resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Stable handle to an observation inside a [`CalibrationSession`].
///
/// Sessions are append-only, so an id stays valid for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObservationId(pub usize);

/// Observations accepted during the capture phase.
///
/// The first accepted observation fixes the point count and the frame
/// resolution; later observations must match both. Rejected additions leave
/// the session untouched.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSession {
    image_size: Option<ImageSize>,
    points_per_view: Option<usize>,
    observations: Vec<PatternObservation>,
}

impl CalibrationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session whose resolution and point count are known up front.
    pub fn with_layout(image_size: ImageSize, points_per_view: usize) -> Self {
        Self {
            image_size: Some(image_size),
            points_per_view: Some(points_per_view),
            observations: Vec::new(),
        }
    }

    pub fn add_observation(
        &mut self,
        observation: PatternObservation,
        frame_size: ImageSize,
    ) -> Result<ObservationId, CoreError> {
        if let Some(expected) = self.image_size {
            if expected != frame_size {
                return Err(CoreError::ResolutionMismatch {
                    expected_w: expected.width,
                    expected_h: expected.height,
                    got_w: frame_size.width,
                    got_h: frame_size.height,
                });
            }
        }
        if let Some(expected) = self.points_per_view {
            if expected != observation.len() {
                return Err(CoreError::PointCountMismatch {
                    expected,
                    got: observation.len(),
                });
            }
        }

        self.image_size = Some(frame_size);
        self.points_per_view = Some(observation.len());
        self.observations.push(observation);
        Ok(ObservationId(self.observations.len() - 1))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    pub fn points_per_view(&self) -> Option<usize> {
        self.points_per_view
    }

    pub fn get(&self, id: ObservationId) -> Option<&PatternObservation> {
        self.observations.get(id.0)
    }

    pub fn observations(&self) -> &[PatternObservation] {
        &self.observations
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObservationId, &PatternObservation)> {
        self.observations
            .iter()
            .enumerate()
            .map(|(i, obs)| (ObservationId(i), obs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CalibrationPattern, Pt2};

    fn observation(pattern: &CalibrationPattern, offset: f64) -> PatternObservation {
        let pixels = pattern
            .world_points()
            .iter()
            .map(|p| Pt2::new(p.x * 1000.0 + offset, p.y * 1000.0 + offset))
            .collect();
        PatternObservation::from_pattern(pattern, pixels).unwrap()
    }

    #[test]
    fn ids_are_stable_and_sequential() {
        let pattern = CalibrationPattern::new(3, 4, 0.02).unwrap();
        let size = ImageSize::new(640, 480);
        let mut session = CalibrationSession::new();
        let a = session.add_observation(observation(&pattern, 0.0), size).unwrap();
        let b = session.add_observation(observation(&pattern, 5.0), size).unwrap();
        assert_eq!((a, b), (ObservationId(0), ObservationId(1)));
        assert_eq!(session.get(a).unwrap().points_2d()[0], Pt2::new(0.0, 0.0));
        assert_eq!(session.get(b).unwrap().points_2d()[0], Pt2::new(5.0, 5.0));
        assert_eq!(session.image_size(), Some(size));
        assert_eq!(session.points_per_view(), Some(12));
        let ids: Vec<ObservationId> = session.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn mismatched_additions_are_rejected_without_side_effects() {
        let pattern = CalibrationPattern::new(3, 4, 0.02).unwrap();
        let other = CalibrationPattern::new(3, 3, 0.02).unwrap();
        let size = ImageSize::new(640, 480);
        let mut session = CalibrationSession::new();
        session.add_observation(observation(&pattern, 0.0), size).unwrap();

        let err = session
            .add_observation(observation(&pattern, 1.0), ImageSize::new(320, 240))
            .unwrap_err();
        assert!(matches!(err, CoreError::ResolutionMismatch { .. }));

        let err = session
            .add_observation(observation(&other, 1.0), size)
            .unwrap_err();
        assert!(matches!(err, CoreError::PointCountMismatch { expected: 12, got: 9 }));

        assert_eq!(session.len(), 1);
    }

    #[test]
    fn preset_layout_is_enforced_on_first_addition() {
        let pattern = CalibrationPattern::new(3, 3, 0.02).unwrap();
        let mut session = CalibrationSession::with_layout(ImageSize::new(640, 480), 12);
        assert!(session
            .add_observation(observation(&pattern, 0.0), ImageSize::new(640, 480))
            .is_err());
        assert!(session.is_empty());
    }
}
