//! Inverse-map resampling with bilinear interpolation.

use image::imageops::replace;
use image::{ImageBuffer, Pixel};
use imageproc::geometric_transformations::{warp_into_with, Interpolation};
use rayon::prelude::*;

use crate::{validate_image_size, ImgprocError, Result};

/// Per-output-pixel source coordinates, row-major.
///
/// `map_x[y * width + x]`/`map_y[..]` give the (sub-pixel) source location
/// sampled for output pixel `(x, y)`. Building the table once per resolution
/// keeps the camera model out of the per-frame path.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapTable {
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl RemapTable {
    pub fn new(width: u32, height: u32, map_x: Vec<f32>, map_y: Vec<f32>) -> Result<Self> {
        validate_image_size(width, height)?;
        let n = width as usize * height as usize;
        if map_x.len() != n || map_y.len() != n {
            return Err(ImgprocError::DimensionMismatch(format!(
                "maps must have {n} entries, got {} and {}",
                map_x.len(),
                map_y.len()
            )));
        }
        Ok(Self {
            width,
            height,
            map_x,
            map_y,
        })
    }

    /// Build a table by evaluating `f(x, y) -> (src_x, src_y)` for every
    /// output pixel, in parallel over rows.
    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Result<Self>
    where
        F: Fn(u32, u32) -> (f32, f32) + Sync,
    {
        validate_image_size(width, height)?;
        let w = width as usize;
        let n = w * height as usize;
        let mut map_x = vec![0.0f32; n];
        let mut map_y = vec![0.0f32; n];
        map_x
            .par_chunks_mut(w)
            .zip(map_y.par_chunks_mut(w))
            .enumerate()
            .for_each(|(y, (row_x, row_y))| {
                for x in 0..w {
                    let (sx, sy) = f(x as u32, y as u32);
                    row_x[x] = sx;
                    row_y[x] = sy;
                }
            });
        Self::new(width, height, map_x, map_y)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Resample `src` through `table`; neighbours outside `src` read as `background`.
///
/// Works for any 8-bit pixel type. The output has the table's dimensions.
pub fn remap<P>(src: &ImageBuffer<P, Vec<u8>>, table: &RemapTable, background: P) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    // Sampled with a one pixel `background` frame so taps on the last row and
    // column stay inside the interpolated area.
    let mut padded = ImageBuffer::from_pixel(src.width() + 2, src.height() + 2, background);
    replace(&mut padded, src, 1, 1);

    let width = table.width as usize;
    let mut out = ImageBuffer::from_pixel(table.width, table.height, background);
    warp_into_with(
        &padded,
        |x, y| {
            let i = y as usize * width + x as usize;
            (table.map_x[i] + 1.0, table.map_y[i] + 1.0)
        },
        Interpolation::Bilinear,
        background,
        &mut out,
    );
    out
}
