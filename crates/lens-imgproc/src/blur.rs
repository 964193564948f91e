//! Gaussian smoothing with OpenCV-style kernel sizing.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;
use imageproc::map::map_colors;

use crate::{validate_image_size, ImgprocError, Result};

/// Single-channel `f32` image used for intermediate results.
pub type GrayFloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Normalised 1D Gaussian taps.
///
/// `size` must be odd. A non-positive `sigma` is derived from the size the
/// way OpenCV does: `0.3 * ((size - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel_1d(sigma: f32, size: usize) -> Result<Vec<f32>> {
    if size == 0 || size % 2 == 0 {
        return Err(ImgprocError::InvalidParameter(format!(
            "gaussian kernel size must be odd, got {size}"
        )));
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (size / 2) as f32;
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    Ok(kernel)
}

pub fn to_float(image: &GrayImage) -> GrayFloatImage {
    map_colors(image, |p| Luma([p[0] as f32]))
}

/// Gaussian blur of a float image with a square `ksize x ksize` kernel.
///
/// Samples past the border repeat the edge pixel.
pub fn gaussian_blur_f32(src: &GrayFloatImage, ksize: usize, sigma: f32) -> Result<GrayFloatImage> {
    validate_image_size(src.width(), src.height())?;
    let k = gaussian_kernel_1d(sigma, ksize)?;
    Ok(separable_filter_equal(src, &k))
}

/// Gaussian blur of an 8-bit image; results are rounded back to `u8`.
pub fn gaussian_blur(src: &GrayImage, ksize: usize, sigma: f32) -> Result<GrayImage> {
    let blurred = gaussian_blur_f32(&to_float(src), ksize, sigma)?;
    Ok(map_colors(&blurred, |p| Luma([p[0].round().clamp(0.0, 255.0) as u8])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel_1d(2.0, 9).unwrap();
        assert_eq!(k.len(), 9);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        for i in 0..4 {
            assert!((k[i] - k[8 - i]).abs() < 1e-7);
        }
        assert!(k[4] > k[3]);
    }

    #[test]
    fn non_positive_sigma_follows_kernel_size() {
        let derived = gaussian_kernel_1d(0.0, 7).unwrap();
        let explicit = gaussian_kernel_1d(1.4, 7).unwrap();
        for (a, b) in derived.iter().zip(&explicit) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn even_kernel_size_is_rejected() {
        assert!(gaussian_kernel_1d(1.0, 4).is_err());
        assert!(gaussian_blur(&GrayImage::new(8, 8), 0, 1.0).is_err());
        assert!(gaussian_blur(&GrayImage::new(0, 8), 5, 1.0).is_err());
    }

    #[test]
    fn blur_preserves_flat_images_and_smooths_steps() {
        let flat = GrayImage::from_pixel(20, 10, Luma([77]));
        assert_eq!(gaussian_blur(&flat, 9, 2.0).unwrap(), flat);

        let step = GrayImage::from_fn(20, 5, |x, _| Luma([if x < 10 { 0 } else { 200 }]));
        let out = gaussian_blur(&step, 5, 1.0).unwrap();
        let a = out.get_pixel(9, 2)[0];
        let b = out.get_pixel(10, 2)[0];
        assert!(a > 0 && a < 100, "a={a}");
        assert!(b > 100 && b < 200, "b={b}");
        assert_eq!(out.get_pixel(0, 2)[0], 0);
        assert_eq!(out.get_pixel(19, 2)[0], 200);
    }

    #[test]
    fn kernel_wider_than_image_repeats_edges() {
        let img = GrayImage::from_fn(3, 3, |x, _| Luma([if x == 0 { 90 } else { 30 }]));
        let out = gaussian_blur(&img, 9, 2.0).unwrap();
        assert_eq!(out.dimensions(), (3, 3));
        assert!(out.get_pixel(0, 1)[0] > out.get_pixel(2, 1)[0]);
    }
}
