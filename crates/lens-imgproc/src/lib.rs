//! Image-processing kernels used by the capture and measurement pipelines.
//!
//! All kernels operate on `image` crate buffers (`GrayImage`, `RgbImage`).
//! Filtering, edge detection, Sobel gradients and resampling come from
//! `imageproc`; the voting and grid fitting stages parallelise with rayon.

pub mod blur;
pub mod chessboard;
pub mod draw;
pub mod hough;
pub mod remap;

pub use blur::{gaussian_blur, gaussian_kernel_1d, GrayFloatImage};
pub use chessboard::{find_chessboard_corners, ChessboardParams};
pub use draw::{draw_circles, draw_measurement, OverlayStyle};
pub use hough::{hough_circles, HoughCircle, HoughCircleParams};
pub use remap::{remap, RemapTable};

pub type Result<T> = std::result::Result<T, ImgprocError>;

#[derive(Debug, thiserror::Error)]
pub enum ImgprocError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}

pub fn validate_image_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(ImgprocError::DimensionMismatch(
            "image dimensions must be non-zero".into(),
        ));
    }
    Ok(())
}
