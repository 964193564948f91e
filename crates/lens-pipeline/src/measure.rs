//! Pixel-to-metric scale from a reference marker and inter-marker distances.

use lens_core::{Pt2, Real};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ReferenceSelector;
use crate::markers::DetectedCircle;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MeasureError {
    #[error("need at least two markers, found {found}")]
    InsufficientMarkers { found: usize },
    #[error("no marker matches the reference selector")]
    ReferenceNotFound,
    #[error("reference diameter must be positive and finite, got {0}")]
    InvalidDiameter(Real),
    #[error("marker radius must be positive and finite, got {0}")]
    InvalidRadius(Real),
}

/// Known physical diameter of the reference marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleReference {
    diameter: Real,
}

impl ScaleReference {
    pub fn new(diameter: Real) -> Result<Self, MeasureError> {
        if !(diameter.is_finite() && diameter > 0.0) {
            return Err(MeasureError::InvalidDiameter(diameter));
        }
        Ok(Self { diameter })
    }

    pub fn diameter(&self) -> Real {
        self.diameter
    }
}

/// Pixels per metric unit: `radius_px / (diameter / 2)`.
pub fn pixels_per_unit(radius_px: Real, reference: &ScaleReference) -> Result<Real, MeasureError> {
    if !(radius_px.is_finite() && radius_px > 0.0) {
        return Err(MeasureError::InvalidRadius(radius_px));
    }
    Ok(radius_px / (reference.diameter * 0.5))
}

/// Metric distance between two pixel positions at `scale` pixels per unit.
pub fn metric_distance(a: &Pt2, b: &Pt2, scale: Real) -> Real {
    (b - a).norm() / scale
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Index of the first circle in the frame's detection list.
    pub from: usize,
    pub to: usize,
    pub pixel_distance: Real,
    pub metric_distance: Real,
}

/// Everything measured in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMeasurement {
    pub circles: Vec<DetectedCircle>,
    /// Index of the reference circle in `circles`.
    pub reference: usize,
    pub pixels_per_unit: Real,
    /// Reference to every other circle, in detection order.
    pub measurements: Vec<MeasurementResult>,
}

impl FrameMeasurement {
    /// Reference to the strongest other circle.
    pub fn primary(&self) -> Option<&MeasurementResult> {
        self.measurements.first()
    }
}

fn select_reference(circles: &[DetectedCircle], selector: &ReferenceSelector) -> Option<usize> {
    match *selector {
        ReferenceSelector::First => (!circles.is_empty()).then_some(0),
        ReferenceSelector::NearestTo { x, y } => {
            let target = Pt2::new(x as Real, y as Real);
            circles
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    (a.center - target)
                        .norm_squared()
                        .total_cmp(&(b.center - target).norm_squared())
                })
                .map(|(i, _)| i)
        }
        ReferenceSelector::InRegion {
            x,
            y,
            width,
            height,
        } => {
            let (x0, y0) = (x as Real, y as Real);
            let (x1, y1) = (x0 + width as Real, y0 + height as Real);
            circles.iter().position(|c| {
                c.center.x >= x0 && c.center.x < x1 && c.center.y >= y0 && c.center.y < y1
            })
        }
    }
}

/// Scale the frame from the selected reference and measure to every other marker.
///
/// `circles` must be in detection (strength) order.
pub fn measure_frame(
    circles: Vec<DetectedCircle>,
    reference: &ScaleReference,
    selector: &ReferenceSelector,
) -> Result<FrameMeasurement, MeasureError> {
    if circles.len() < 2 {
        return Err(MeasureError::InsufficientMarkers {
            found: circles.len(),
        });
    }
    let ref_idx = select_reference(&circles, selector).ok_or(MeasureError::ReferenceNotFound)?;
    let scale = pixels_per_unit(circles[ref_idx].radius, reference)?;
    let origin = circles[ref_idx].center;
    let measurements = circles
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != ref_idx)
        .map(|(i, c)| {
            let pixel_distance = (c.center - origin).norm();
            MeasurementResult {
                from: ref_idx,
                to: i,
                pixel_distance,
                metric_distance: pixel_distance / scale,
            }
        })
        .collect();
    Ok(FrameMeasurement {
        circles,
        reference: ref_idx,
        pixels_per_unit: scale,
        measurements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(x: Real, y: Real, radius: Real, votes: u32) -> DetectedCircle {
        DetectedCircle {
            center: Pt2::new(x, y),
            radius,
            votes,
        }
    }

    #[test]
    fn worked_scale_example() {
        let reference = ScaleReference::new(2.5).unwrap();
        let scale = pixels_per_unit(40.0, &reference).unwrap();
        assert!((scale - 32.0).abs() < 1e-12);
        let d = metric_distance(&Pt2::new(100.0, 100.0), &Pt2::new(300.0, 100.0), scale);
        assert!((d - 6.25).abs() < 1e-12);
    }

    #[test]
    fn frame_measures_from_reference_to_others() {
        let circles = vec![
            circle(100.0, 100.0, 40.0, 90),
            circle(300.0, 100.0, 20.0, 70),
            circle(100.0, 260.0, 25.0, 50),
        ];
        let m = measure_frame(circles, &ScaleReference::new(2.5).unwrap(), &ReferenceSelector::First)
            .unwrap();
        assert_eq!(m.reference, 0);
        assert_eq!(m.measurements.len(), 2);
        let first = m.primary().unwrap();
        assert_eq!((first.from, first.to), (0, 1));
        assert!((first.pixel_distance - 200.0).abs() < 1e-12);
        assert!((first.metric_distance - 6.25).abs() < 1e-12);
        assert!((m.measurements[1].metric_distance - 5.0).abs() < 1e-12);
    }

    #[test]
    fn fewer_than_two_markers_is_reported() {
        let reference = ScaleReference::new(2.5).unwrap();
        assert_eq!(
            measure_frame(Vec::new(), &reference, &ReferenceSelector::First),
            Err(MeasureError::InsufficientMarkers { found: 0 })
        );
        assert_eq!(
            measure_frame(vec![circle(5.0, 5.0, 3.0, 40)], &reference, &ReferenceSelector::First),
            Err(MeasureError::InsufficientMarkers { found: 1 })
        );
    }

    #[test]
    fn nearest_selector_picks_closest_centre() {
        let circles = vec![circle(100.0, 100.0, 40.0, 90), circle(300.0, 100.0, 20.0, 70)];
        let m = measure_frame(
            circles,
            &ScaleReference::new(2.0).unwrap(),
            &ReferenceSelector::NearestTo { x: 290.0, y: 90.0 },
        )
        .unwrap();
        assert_eq!(m.reference, 1);
        assert!((m.pixels_per_unit - 20.0).abs() < 1e-12);
        assert_eq!((m.measurements[0].from, m.measurements[0].to), (1, 0));
        assert!((m.measurements[0].metric_distance - 10.0).abs() < 1e-12);
    }

    #[test]
    fn empty_region_is_reference_not_found() {
        let circles = vec![circle(100.0, 100.0, 40.0, 90), circle(300.0, 100.0, 20.0, 70)];
        let selector = ReferenceSelector::InRegion {
            x: 0.0,
            y: 200.0,
            width: 50.0,
            height: 50.0,
        };
        assert_eq!(
            measure_frame(circles, &ScaleReference::new(2.5).unwrap(), &selector),
            Err(MeasureError::ReferenceNotFound)
        );
    }

    #[test]
    fn invalid_sizes_are_rejected() {
        assert!(ScaleReference::new(0.0).is_err());
        assert!(ScaleReference::new(Real::NAN).is_err());
        let reference = ScaleReference::new(1.0).unwrap();
        assert_eq!(
            pixels_per_unit(-3.0, &reference),
            Err(MeasureError::InvalidRadius(-3.0))
        );
    }
}
