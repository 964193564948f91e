//! Lens undistortion of whole frames.

use image::{ImageBuffer, Pixel};
use lens_core::{distort_to_pixel, pixel_to_normalized, CalibrationResult, ImageSize, Pt2};
use lens_imgproc::{remap, RemapTable};
use log::debug;

/// Precomputed undistortion map for one frame resolution.
///
/// Output pixel `(u, v)` samples the raw frame where the camera model says
/// the ideal ray through `(u, v)` actually lands. Samples that fall outside
/// the raw frame are black.
#[derive(Debug, Clone)]
pub struct Undistorter {
    table: RemapTable,
}

impl Undistorter {
    pub fn new(result: &CalibrationResult, size: ImageSize) -> Result<Self, lens_imgproc::ImgprocError> {
        let k = *result.intrinsics();
        let dist = *result.distortion();
        let table = RemapTable::from_fn(size.width, size.height, |x, y| {
            let n = pixel_to_normalized(Pt2::new(x as f64, y as f64), &k);
            let src = distort_to_pixel(n, &k, &dist);
            (src.x as f32, src.y as f32)
        })?;
        debug!("undistortion map built for {}x{}", size.width, size.height);
        Ok(Self { table })
    }

    /// Map for the resolution the camera was calibrated at.
    pub fn for_calibration(result: &CalibrationResult) -> Result<Self, lens_imgproc::ImgprocError> {
        Self::new(result, result.image_size())
    }

    pub fn image_size(&self) -> ImageSize {
        ImageSize::new(self.table.width(), self.table.height())
    }

    /// Undistort one frame (grayscale, RGB or any other 8-bit pixel type).
    ///
    /// The output always has the map's resolution.
    pub fn apply<P>(&self, frame: &ImageBuffer<P, Vec<u8>>) -> ImageBuffer<P, Vec<u8>>
    where
        P: Pixel<Subpixel = u8> + Send + Sync,
    {
        let black = *P::from_slice(&[0u8; 4][..P::CHANNEL_COUNT as usize]);
        remap(frame, &self.table, black)
    }
}
