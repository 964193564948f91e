//! Chessboard inner-corner detection.
//!
//! Saddle points of the smoothed intensity surface are X-junction
//! candidates. The strongest `rows * cols` of them span the board; the
//! quadrilateral of their convex hull fixes a homography from grid indices
//! to pixels, which is used to assign every grid node to a candidate. The
//! assigned corners are then refined to sub-pixel accuracy.

use image::GrayImage;
use lens_core::{from_homogeneous, Mat3, Pt2, Real, Vec3};
use lens_linear::dlt_homography;
use log::debug;
use nalgebra::{Matrix2, Vector2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::blur::{gaussian_blur_f32, to_float, GrayFloatImage};
use crate::{validate_image_size, ImgprocError, Result};

const MAX_HULL_VERTICES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Inner corners per column.
    pub rows: usize,
    /// Inner corners per row.
    pub cols: usize,
    pub blur_ksize: usize,
    pub blur_sigma: f32,
    pub nms_radius: usize,
    /// Candidates below this fraction of the peak saddle response are dropped.
    pub min_response_ratio: f32,
    /// Assignment tolerance as a fraction of the smallest projected square side.
    pub match_tolerance: f64,
    pub subpix_iters: usize,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            rows: 7,
            cols: 7,
            blur_ksize: 7,
            blur_sigma: 1.5,
            nms_radius: 3,
            min_response_ratio: 0.1,
            match_tolerance: 0.3,
            subpix_iters: 20,
        }
    }
}

impl ChessboardParams {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.rows < 2 || self.cols < 2 {
            return Err(ImgprocError::InvalidParameter(format!(
                "chessboard needs at least 2x2 inner corners, got {}x{}",
                self.rows, self.cols
            )));
        }
        if !(self.match_tolerance > 0.0 && self.match_tolerance < 0.5) {
            return Err(ImgprocError::InvalidParameter(format!(
                "match_tolerance must be in (0, 0.5), got {}",
                self.match_tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    x: f64,
    y: f64,
    score: f32,
}

/// `Ixy^2 - Ixx * Iyy`, positive at saddle points.
fn saddle_response(img: &GrayFloatImage) -> Vec<f32> {
    let w = img.width() as usize;
    let h = img.height() as usize;
    let px = img.as_raw();
    let mut out = vec![0.0f32; w * h];
    if w < 3 || h < 3 {
        return out;
    }
    out.par_chunks_mut(w)
        .enumerate()
        .skip(1)
        .take(h - 2)
        .for_each(|(y, row)| {
            let at = |x: usize, y: usize| px[y * w + x];
            for x in 1..w - 1 {
                let c = at(x, y);
                let ixx = at(x + 1, y) - 2.0 * c + at(x - 1, y);
                let iyy = at(x, y + 1) - 2.0 * c + at(x, y - 1);
                let ixy = 0.25
                    * (at(x + 1, y + 1) - at(x + 1, y - 1) - at(x - 1, y + 1) + at(x - 1, y - 1));
                row[x] = ixy * ixy - ixx * iyy;
            }
        });
    out
}

fn local_maxima(resp: &[f32], w: usize, h: usize, radius: usize, ratio: f32) -> Vec<Candidate> {
    let peak = resp.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return Vec::new();
    }
    let threshold = peak * ratio;
    let r = radius.max(1);
    let mut out = Vec::new();
    for y in r..h.saturating_sub(r) {
        'px: for x in r..w.saturating_sub(r) {
            let v = resp[y * w + x];
            if v <= threshold {
                continue;
            }
            for ny in y - r..=y + r {
                for nx in x - r..=x + r {
                    let n = resp[ny * w + nx];
                    // Raster-order tie break keeps one pixel per plateau.
                    if n > v || (n == v && (ny, nx) < (y, x)) {
                        continue 'px;
                    }
                }
            }
            out.push(Candidate {
                x: x as f64,
                y: y as f64,
                score: v,
            });
        }
    }
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    out
}

fn cross(o: &Pt2, a: &Pt2, b: &Pt2) -> Real {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Andrew's monotone chain; collinear points are not hull vertices.
fn convex_hull(points: &[Pt2]) -> Vec<Pt2> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }
    let mut hull = half_hull(pts.iter());
    hull.extend(half_hull(pts.iter().rev()));
    hull
}

fn half_hull<'a>(points: impl Iterator<Item = &'a Pt2>) -> Vec<Pt2> {
    let mut chain: Vec<Pt2> = Vec::new();
    for p in points {
        while chain.len() >= 2 && cross(&chain[chain.len() - 2], &chain[chain.len() - 1], p) <= 0.0 {
            chain.pop();
        }
        chain.push(*p);
    }
    chain.pop();
    chain
}

fn quad_area(q: [&Pt2; 4]) -> Real {
    let mut s = 0.0;
    for i in 0..4 {
        let (a, b) = (q[i], q[(i + 1) % 4]);
        s += a.x * b.y - b.x * a.y;
    }
    0.5 * s.abs()
}

/// Four hull vertices (kept in hull order) spanning the largest quadrilateral.
fn largest_quad(hull: &[Pt2]) -> Option<[Pt2; 4]> {
    let n = hull.len();
    if !(4..=MAX_HULL_VERTICES).contains(&n) {
        return None;
    }
    let mut best: Option<([Pt2; 4], Real)> = None;
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                for l in k + 1..n {
                    let area = quad_area([&hull[i], &hull[j], &hull[k], &hull[l]]);
                    if best.map_or(true, |(_, a)| area > a) {
                        best = Some(([hull[i], hull[j], hull[k], hull[l]], area));
                    }
                }
            }
        }
    }
    best.map(|(q, _)| q)
}

fn project(h: &Mat3, c: usize, r: usize) -> Option<Pt2> {
    from_homogeneous(&(h * Vec3::new(c as Real, r as Real, 1.0)))
}

struct GridFit {
    corners: Vec<Pt2>,
}

/// Assign every grid node to a distinct candidate near its projection.
fn match_grid(h: &Mat3, rows: usize, cols: usize, cands: &[Candidate], tol_ratio: f64) -> Option<Vec<Pt2>> {
    let mut projected = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            projected.push(project(h, c, r)?);
        }
    }
    let mut min_side = Real::INFINITY;
    for r in 0..rows {
        for c in 0..cols {
            let p = projected[r * cols + c];
            if c + 1 < cols {
                min_side = min_side.min((projected[r * cols + c + 1] - p).norm());
            }
            if r + 1 < rows {
                min_side = min_side.min((projected[(r + 1) * cols + c] - p).norm());
            }
        }
    }
    if !(min_side.is_finite() && min_side > 1.0) {
        return None;
    }
    let tol_sq = (tol_ratio * min_side).powi(2);

    let mut used = vec![false; cands.len()];
    let mut matched = Vec::with_capacity(projected.len());
    for p in &projected {
        let mut best: Option<(usize, Real)> = None;
        for (i, cand) in cands.iter().enumerate() {
            let d = (cand.x - p.x).powi(2) + (cand.y - p.y).powi(2);
            if d <= tol_sq && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        let (i, _) = best?;
        if used[i] {
            return None;
        }
        used[i] = true;
        matched.push(Pt2::new(cands[i].x, cands[i].y));
    }
    Some(matched)
}

fn grid_points(rows: usize, cols: usize) -> Vec<Pt2> {
    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| Pt2::new(c as Real, r as Real)))
        .collect()
}

fn fit_assignment(
    quad: &[Pt2; 4],
    offset: usize,
    reversed: bool,
    params: &ChessboardParams,
    cands: &[Candidate],
) -> Option<GridFit> {
    let (rows, cols) = (params.rows, params.cols);
    let ideal = [
        Pt2::new(0.0, 0.0),
        Pt2::new((cols - 1) as Real, 0.0),
        Pt2::new((cols - 1) as Real, (rows - 1) as Real),
        Pt2::new(0.0, (rows - 1) as Real),
    ];
    let image: Vec<Pt2> = (0..4)
        .map(|i| {
            let k = if reversed { (offset + 4 - i) % 4 } else { (offset + i) % 4 };
            quad[k]
        })
        .collect();
    let h = dlt_homography(&ideal, &image).ok()?;

    // Columns must run to the right of rows in image orientation.
    let o = project(&h, 0, 0)?;
    let a = project(&h, 1, 0)? - o;
    let b = project(&h, 0, 1)? - o;
    if a.x * b.y - a.y * b.x <= 0.0 {
        return None;
    }

    let first = match_grid(&h, rows, cols, cands, params.match_tolerance)?;
    let grid = grid_points(rows, cols);
    let refit = dlt_homography(&grid, &first).ok()?;
    let corners = match_grid(&refit, rows, cols, cands, params.match_tolerance)?;
    Some(GridFit { corners })
}

/// Iterative gradient-orthogonality refinement over a Gaussian-weighted window.
fn refine_corners(img: &GrayFloatImage, corners: &mut [Pt2], win: i64, iters: usize) {
    let w = img.width() as i64;
    let h = img.height() as i64;
    let px = img.as_raw();
    let at = |x: i64, y: i64| px[(y * w + x) as usize] as f64;
    let sigma2 = 2.0 * (win as f64 * 0.5).powi(2).max(0.5);

    corners.par_iter_mut().for_each(|p| {
        let start = *p;
        let mut c = *p;
        for _ in 0..iters {
            let (cx, cy) = (c.x.round() as i64, c.y.round() as i64);
            let mut a = Matrix2::<f64>::zeros();
            let mut rhs = Vector2::<f64>::zeros();
            for y in cy - win..=cy + win {
                for x in cx - win..=cx + win {
                    if x < 1 || y < 1 || x >= w - 1 || y >= h - 1 {
                        continue;
                    }
                    let gx = 0.5 * (at(x + 1, y) - at(x - 1, y));
                    let gy = 0.5 * (at(x, y + 1) - at(x, y - 1));
                    let d2 = (x as f64 - c.x).powi(2) + (y as f64 - c.y).powi(2);
                    let wgt = (-d2 / sigma2).exp();
                    let g = Vector2::new(gx, gy);
                    let ggt = g * g.transpose() * wgt;
                    a += ggt;
                    rhs += ggt * Vector2::new(x as f64, y as f64);
                }
            }
            let Some(inv) = a.try_inverse() else {
                break;
            };
            let next = inv * rhs;
            let next = Pt2::new(next.x, next.y);
            let shift = (next - c).norm();
            c = next;
            if shift < 1e-3 {
                break;
            }
        }
        if c.x.is_finite() && c.y.is_finite() && (c - start).norm() <= win as f64 {
            *p = c;
        }
    });
}

/// Locate the inner corners of a `rows x cols` chessboard.
///
/// Returns the corners in row-major grid order with grid (0, 0) nearest the
/// image origin, or `None` if the full board is not visible.
pub fn find_chessboard_corners(gray: &GrayImage, params: &ChessboardParams) -> Result<Option<Vec<Pt2>>> {
    params.validate()?;
    validate_image_size(gray.width(), gray.height())?;
    let need = params.rows * params.cols;

    let smooth = gaussian_blur_f32(&to_float(gray), params.blur_ksize, params.blur_sigma)?;
    let (w, h) = (smooth.width() as usize, smooth.height() as usize);
    let response = saddle_response(&smooth);
    let cands = local_maxima(&response, w, h, params.nms_radius, params.min_response_ratio);
    if cands.len() < need {
        debug!("chessboard: {} candidates, need {need}", cands.len());
        return Ok(None);
    }

    let strongest: Vec<Pt2> = cands[..need].iter().map(|c| Pt2::new(c.x, c.y)).collect();
    let hull = convex_hull(&strongest);
    let Some(quad) = largest_quad(&hull) else {
        debug!("chessboard: hull with {} vertices has no usable quad", hull.len());
        return Ok(None);
    };

    let mut best: Option<GridFit> = None;
    for offset in 0..4 {
        for reversed in [false, true] {
            let Some(fit) = fit_assignment(&quad, offset, reversed, params, &cands) else {
                continue;
            };
            let key = |f: &GridFit| f.corners[0].x + f.corners[0].y;
            if best.as_ref().map_or(true, |b| key(&fit) < key(b)) {
                best = Some(fit);
            }
        }
    }
    let Some(GridFit { mut corners }) = best else {
        debug!("chessboard: no consistent grid assignment");
        return Ok(None);
    };

    let side = corners
        .windows(2)
        .take(params.cols - 1)
        .map(|p| (p[1] - p[0]).norm())
        .fold(Real::INFINITY, Real::min);
    let win = ((side * 0.25) as i64).clamp(2, 5);
    refine_corners(&smooth, &mut corners, win, params.subpix_iters);
    Ok(Some(corners))
}
