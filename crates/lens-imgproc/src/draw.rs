//! Overlay drawing for measurement output frames.

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use log::warn;

use crate::hough::HoughCircle;

static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub outline: Rgb<u8>,
    pub reference: Rgb<u8>,
    pub centre: Rgb<u8>,
    pub line: Rgb<u8>,
    pub label: Rgb<u8>,
    pub centre_radius: i32,
    /// Label glyph height in pixels.
    pub label_scale: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            outline: Rgb([0, 255, 0]),
            reference: Rgb([255, 200, 0]),
            centre: Rgb([255, 0, 0]),
            line: Rgb([0, 128, 255]),
            label: Rgb([255, 255, 255]),
            centre_radius: 2,
            label_scale: 18.0,
        }
    }
}

fn to_i32(p: (f32, f32)) -> (i32, i32) {
    (p.0.round() as i32, p.1.round() as i32)
}

/// Outline every circle and dot its centre; `reference` gets its own colour.
pub fn draw_circles(img: &mut RgbImage, circles: &[HoughCircle], reference: Option<usize>, style: &OverlayStyle) {
    for (i, c) in circles.iter().enumerate() {
        let colour = if Some(i) == reference {
            style.reference
        } else {
            style.outline
        };
        let r = c.radius.round() as i32;
        draw_hollow_circle_mut(img, to_i32(c.center()), r, colour);
        if Some(i) == reference {
            draw_hollow_circle_mut(img, to_i32(c.center()), r + 1, colour);
        }
        draw_filled_circle_mut(img, to_i32(c.center()), style.centre_radius, style.centre);
    }
}

/// Segment between two centres with a dot marking its midpoint and an
/// optional `label` (usually the metric distance) centred just above it.
pub fn draw_measurement(
    img: &mut RgbImage,
    from: (f32, f32),
    to: (f32, f32),
    label: Option<&str>,
    style: &OverlayStyle,
) {
    draw_line_segment_mut(img, from, to, style.line);
    let mid = ((from.0 + to.0) * 0.5, (from.1 + to.1) * 0.5);
    let (mx, my) = to_i32(mid);
    draw_filled_circle_mut(img, (mx, my), style.centre_radius + 1, style.line);

    let Some(text) = label.filter(|t| !t.is_empty()) else {
        return;
    };
    let font = match FontRef::try_from_slice(LABEL_FONT) {
        Ok(font) => font,
        Err(e) => {
            warn!("label font unusable: {e}");
            return;
        }
    };
    let scale = PxScale::from(style.label_scale);
    let (w, h) = text_size(scale, &font, text);
    let x = mx - w as i32 / 2;
    let y = my - h as i32 - style.centre_radius - 4;
    draw_text_mut(img, style.label, x, y, scale, &font, text);
}
