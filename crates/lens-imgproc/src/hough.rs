//! Hough gradient circle detection.
//!
//! Edge pixels from Canny vote along their Sobel gradient direction (both
//! ways) for every radius in range; centre candidates are accumulator local
//! maxima, and each surviving centre gets its radius from the distance
//! distribution of edge pixels around it.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{validate_image_size, ImgprocError, Result};

const VOTE_CHUNK: usize = 2048;

/// A detected circle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoughCircle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Accumulator votes at the centre cell.
    pub votes: u32,
}

impl HoughCircle {
    pub fn center(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughCircleParams {
    /// Inverse accumulator resolution (1.0 = image resolution); at least 1.
    pub dp: f32,
    /// Minimum distance between accepted centres.
    pub min_dist: f32,
    /// Canny high threshold; the low threshold is half of it.
    pub param1: f32,
    /// Vote threshold for centres and radius support.
    pub param2: u32,
    pub min_radius: f32,
    /// `<= 0` means the larger image dimension.
    pub max_radius: f32,
    pub max_circles: Option<usize>,
}

impl Default for HoughCircleParams {
    fn default() -> Self {
        Self {
            dp: 1.2,
            min_dist: 30.0,
            param1: 50.0,
            param2: 30,
            min_radius: 10.0,
            max_radius: 100.0,
            max_circles: None,
        }
    }
}

impl HoughCircleParams {
    fn radius_range(&self, width: u32, height: u32) -> Result<(f32, f32)> {
        if !(self.dp.is_finite() && self.dp >= 1.0) {
            return Err(ImgprocError::InvalidParameter(format!(
                "dp must be at least 1, got {}",
                self.dp
            )));
        }
        if !(self.min_dist.is_finite() && self.min_dist >= 0.0) {
            return Err(ImgprocError::InvalidParameter(format!(
                "min_dist must be non-negative, got {}",
                self.min_dist
            )));
        }
        if !(self.param1.is_finite() && self.param1 > 0.0) {
            return Err(ImgprocError::InvalidParameter(format!(
                "param1 must be positive, got {}",
                self.param1
            )));
        }
        let min_r = self.min_radius.max(0.0);
        let max_r = if self.max_radius <= 0.0 {
            width.max(height) as f32
        } else {
            self.max_radius
        };
        if !(min_r.is_finite() && max_r.is_finite()) || min_r > max_r {
            return Err(ImgprocError::InvalidParameter(format!(
                "radius range [{min_r}, {max_r}] is empty"
            )));
        }
        Ok((min_r, max_r))
    }
}

struct EdgePoint {
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
}

fn collect_edges(gray: &GrayImage, canny_high: f32) -> Vec<EdgePoint> {
    let edges = canny(gray, canny_high * 0.5, canny_high);
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let mut points = Vec::new();
    for (x, y, e) in edges.enumerate_pixels() {
        if e[0] == 0 {
            continue;
        }
        let sx = gx.get_pixel(x, y)[0] as f32;
        let sy = gy.get_pixel(x, y)[0] as f32;
        let mag = (sx * sx + sy * sy).sqrt();
        if mag <= f32::EPSILON {
            continue;
        }
        points.push(EdgePoint {
            x: x as f32,
            y: y as f32,
            dx: sx / mag,
            dy: sy / mag,
        });
    }
    points
}

struct Accumulator {
    width: usize,
    height: usize,
    votes: Vec<u32>,
}

impl Accumulator {
    fn at(&self, x: usize, y: usize) -> u32 {
        self.votes[y * self.width + x]
    }
}

fn accumulate(points: &[EdgePoint], acc_w: usize, acc_h: usize, dp: f32, min_r: f32, max_r: f32) -> Accumulator {
    let inv_dp = 1.0 / dp;
    let r_lo = min_r.ceil() as i32;
    let r_hi = max_r.floor() as i32;
    let votes = points
        .par_chunks(VOTE_CHUNK)
        .map(|chunk| {
            let mut local = vec![0u32; acc_w * acc_h];
            for p in chunk {
                for sign in [1.0f32, -1.0] {
                    let mut last = usize::MAX;
                    for r in r_lo..=r_hi {
                        let cx = (p.x + 0.5 + sign * p.dx * r as f32) * inv_dp;
                        let cy = (p.y + 0.5 + sign * p.dy * r as f32) * inv_dp;
                        if cx < 0.0 || cy < 0.0 {
                            break;
                        }
                        let (ix, iy) = (cx as usize, cy as usize);
                        if ix >= acc_w || iy >= acc_h {
                            break;
                        }
                        let idx = iy * acc_w + ix;
                        if idx != last {
                            local[idx] += 1;
                            last = idx;
                        }
                    }
                }
            }
            local
        })
        .reduce(
            || vec![0u32; acc_w * acc_h],
            |mut a, b| {
                a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                a
            },
        );
    Accumulator {
        width: acc_w,
        height: acc_h,
        votes,
    }
}

/// Local maxima above `threshold`, strongest first, ties in raster order.
fn centre_candidates(acc: &Accumulator, threshold: u32) -> Vec<(usize, usize, u32)> {
    let mut out = Vec::new();
    for y in 1..acc.height.saturating_sub(1) {
        for x in 1..acc.width.saturating_sub(1) {
            let v = acc.at(x, y);
            if v > threshold
                && v > acc.at(x - 1, y)
                && v >= acc.at(x + 1, y)
                && v > acc.at(x, y - 1)
                && v >= acc.at(x, y + 1)
            {
                out.push((x, y, v));
            }
        }
    }
    out.sort_by(|a, b| b.2.cmp(&a.2).then((a.1, a.0).cmp(&(b.1, b.0))));
    out
}

/// Vote-weighted centroid of the 3x3 cell neighbourhood, in pixels.
fn refine_centre(acc: &Accumulator, x: usize, y: usize, dp: f32) -> (f32, f32) {
    let (mut sx, mut sy, mut sw) = (0.0f32, 0.0f32, 0.0f32);
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            let w = acc.at(nx, ny) as f32;
            sx += w * (nx as f32 + 0.5);
            sy += w * (ny as f32 + 0.5);
            sw += w;
        }
    }
    // Edge pixel centres sit at +0.5 in the vote frame.
    ((sx / sw) * dp - 0.5, (sy / sw) * dp - 0.5)
}

/// Radius with the best support-to-radius ratio, if its support beats `threshold`.
fn estimate_radius(
    points: &[EdgePoint],
    cx: f32,
    cy: f32,
    min_r: f32,
    max_r: f32,
    bin: f32,
    threshold: u32,
) -> Option<(f32, usize)> {
    let mut dist: Vec<f32> = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .filter(|d| *d >= min_r && *d <= max_r)
        .collect();
    if dist.is_empty() {
        return None;
    }
    dist.sort_by(f32::total_cmp);

    let mut best: Option<(f32, usize)> = None;
    let mut start = 0;
    for j in 1..=dist.len() {
        if j < dist.len() && dist[j] - dist[start] <= bin {
            continue;
        }
        let count = j - start;
        let r = dist[(start + j - 1) / 2];
        let better = match best {
            None => true,
            Some((br, bc)) => (count as f32) * br > (bc as f32) * r,
        };
        if better && r > 0.0 {
            best = Some((r, count));
        }
        start = j;
    }
    best.filter(|(_, count)| *count > threshold as usize)
}

/// Detect circles in a (pre-smoothed) grayscale image, strongest first.
///
/// An image without circles yields an empty list.
pub fn hough_circles(gray: &GrayImage, params: &HoughCircleParams) -> Result<Vec<HoughCircle>> {
    validate_image_size(gray.width(), gray.height())?;
    let (min_r, max_r) = params.radius_range(gray.width(), gray.height())?;
    let dp = params.dp;

    let points = collect_edges(gray, params.param1);
    if points.is_empty() {
        debug!("hough: no edge pixels");
        return Ok(Vec::new());
    }

    let acc_w = (gray.width() as f32 / dp).ceil() as usize + 1;
    let acc_h = (gray.height() as f32 / dp).ceil() as usize + 1;
    let acc = accumulate(&points, acc_w, acc_h, dp, min_r, max_r);
    let candidates = centre_candidates(&acc, params.param2);
    debug!(
        "hough: {} edge pixels, {} centre candidates",
        points.len(),
        candidates.len()
    );

    let min_dist_sq = params.min_dist * params.min_dist;
    let bin = dp;
    let mut circles: Vec<HoughCircle> = Vec::new();
    for (ix, iy, votes) in candidates {
        if params.max_circles.is_some_and(|m| circles.len() >= m) {
            break;
        }
        let (cx, cy) = refine_centre(&acc, ix, iy, dp);
        let too_close = circles
            .iter()
            .any(|c| (c.x - cx).powi(2) + (c.y - cy).powi(2) < min_dist_sq);
        if too_close {
            continue;
        }
        if let Some((radius, _)) = estimate_radius(&points, cx, cy, min_r, max_r, bin, params.param2) {
            circles.push(HoughCircle {
                x: cx,
                y: cy,
                radius,
                votes,
            });
        }
    }
    Ok(circles)
}
