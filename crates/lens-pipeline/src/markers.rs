//! Circular marker detection on (undistorted) frames.

use image::imageops::grayscale;
use image::{GrayImage, RgbImage};
use lens_core::{Pt2, Real};
use lens_imgproc::{gaussian_blur, hough_circles, HoughCircle, HoughCircleParams, ImgprocError};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedCircle {
    /// Centre in pixels.
    pub center: Pt2,
    /// Radius in pixels.
    pub radius: Real,
    pub votes: u32,
}

impl From<HoughCircle> for DetectedCircle {
    fn from(c: HoughCircle) -> Self {
        Self {
            center: Pt2::new(c.x as Real, c.y as Real),
            radius: c.radius as Real,
            votes: c.votes,
        }
    }
}

impl DetectedCircle {
    pub fn to_hough(&self) -> HoughCircle {
        HoughCircle {
            x: self.center.x as f32,
            y: self.center.y as f32,
            radius: self.radius as f32,
            votes: self.votes,
        }
    }
}

/// Grayscale conversion, Gaussian smoothing, then Hough gradient search.
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    blur_kernel: usize,
    blur_sigma: f32,
    hough: HoughCircleParams,
}

impl Default for MarkerDetector {
    fn default() -> Self {
        Self::from_config(&DetectorConfig::default())
    }
}

impl MarkerDetector {
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            blur_kernel: config.blur_kernel,
            blur_sigma: config.blur_sigma,
            hough: config.hough_params(),
        }
    }

    pub fn hough_params(&self) -> &HoughCircleParams {
        &self.hough
    }

    /// Circles in strength order; an empty list when there are none.
    pub fn detect(&self, frame: &RgbImage) -> Result<Vec<DetectedCircle>, ImgprocError> {
        self.detect_gray(&grayscale(frame))
    }

    pub fn detect_gray(&self, gray: &GrayImage) -> Result<Vec<DetectedCircle>, ImgprocError> {
        let smooth = gaussian_blur(gray, self.blur_kernel, self.blur_sigma)?;
        let circles: Vec<DetectedCircle> = hough_circles(&smooth, &self.hough)?
            .into_iter()
            .map(DetectedCircle::from)
            .collect();
        if circles.is_empty() {
            debug!("no circles detected");
        } else {
            debug!("{} circles detected", circles.len());
        }
        Ok(circles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_circle_mut;

    #[test]
    fn detects_drawn_markers_in_colour_frame() {
        let mut frame = RgbImage::from_pixel(400, 300, Rgb([240, 240, 240]));
        draw_filled_circle_mut(&mut frame, (100, 150), 40, Rgb([20, 20, 20]));
        draw_filled_circle_mut(&mut frame, (300, 150), 25, Rgb([20, 20, 20]));
        let circles = MarkerDetector::default().detect(&frame).unwrap();
        assert!(circles.len() >= 2, "{circles:?}");
        for (x, r) in [(100.0, 40.0), (300.0, 25.0)] {
            assert!(
                circles.iter().any(|c| (c.center.x - x).abs() < 2.0
                    && (c.center.y - 150.0).abs() < 2.0
                    && (c.radius - r).abs() < 2.5),
                "missing marker at x = {x}: {circles:?}"
            );
        }
    }

    #[test]
    fn saturated_marker_is_found_through_luma() {
        let mut frame = RgbImage::from_pixel(300, 200, Rgb([255, 255, 255]));
        draw_filled_circle_mut(&mut frame, (150, 100), 35, Rgb([255, 0, 0]));
        assert_eq!(grayscale(&frame).get_pixel(150, 100)[0], 54);

        let circles = MarkerDetector::default().detect(&frame).unwrap();
        let first = circles.first().expect("red marker");
        assert!((first.center.x - 150.0).abs() < 2.0 && (first.center.y - 100.0).abs() < 2.0);
        assert!((first.radius - 35.0).abs() < 2.5, "{first:?}");
    }

    #[test]
    fn plain_frame_has_no_markers() {
        let frame = RgbImage::from_pixel(120, 90, Rgb([90, 90, 90]));
        assert!(MarkerDetector::default().detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn even_blur_kernel_is_rejected() {
        let detector = MarkerDetector::from_config(&DetectorConfig {
            blur_kernel: 4,
            ..DetectorConfig::default()
        });
        assert!(detector.detect(&RgbImage::new(32, 32)).is_err());
    }
}
