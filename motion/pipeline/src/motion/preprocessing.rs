//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::MotionError;
use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{GrayImage, RgbImage};
use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::prelude::ParallelSliceMut;

pub const DEFAULT_ANALYSIS_WIDTH: u32 = 500;
pub const DEFAULT_BLUR_KERNEL: u32 = 21;

/// Normalizes camera frames into the single-channel, blurred representation that the
/// background model and the detector work on.
pub struct Preprocessor {
    target_width: u32,
    kernel: Vec<f32>,
    resizer: Resizer,
}

impl Preprocessor {
    /// `blur_kernel` must be odd; 1 disables the blur.
    pub fn new(target_width: u32, blur_kernel: u32) -> Self {
        Preprocessor {
            target_width,
            kernel: gaussian_kernel(blur_kernel, 0.0),
            resizer: Resizer::new(),
        }
    }

    /// Resize (keeping the aspect ratio), convert to grayscale and blur.
    pub fn prepare(&mut self, raw: &RgbImage) -> Result<GrayImage, MotionError> {
        let resized = self.resize(raw)?;
        Ok(self.analysis_frame(&resized))
    }

    /// Resized color frame. This is what gets annotated and persisted.
    pub fn resize(&mut self, raw: &RgbImage) -> Result<RgbImage, MotionError> {
        resize_to_width(&mut self.resizer, raw, self.target_width)
    }

    pub fn analysis_frame(&self, resized: &RgbImage) -> GrayImage {
        let gray = grayscale(resized);
        if self.kernel.len() <= 1 {
            return gray;
        }
        imageproc::filter::separable_filter_equal(&gray, &self.kernel)
    }
}

/// One-shot `Preprocessor::prepare` with the default blur.
pub fn prepare(raw: &RgbImage, target_width: u32) -> Result<GrayImage, MotionError> {
    Preprocessor::new(target_width, DEFAULT_BLUR_KERNEL).prepare(raw)
}

/// Scales `src` to `target_width`, the height follows the source aspect ratio.
pub fn resize_to_width(
    resizer: &mut Resizer,
    src: &RgbImage,
    target_width: u32,
) -> Result<RgbImage, MotionError> {
    let (src_width, src_height) = src.dimensions();
    if src_width == 0 || src_height == 0 || target_width == 0 {
        return Err(MotionError::EmptyFrame);
    }

    let target_height = scaled_height(src_width, src_height, target_width);
    if (src_width, src_height) == (target_width, target_height) {
        return Ok(src.clone());
    }

    let src_image = Image::from_vec_u8(src_width, src_height, src.to_vec(), PixelType::U8x3)
        .map_err(|e| MotionError::Resize(e.to_string()))?;
    let mut dst_image = Image::new(target_width, target_height, PixelType::U8x3);

    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )
        .map_err(|e| MotionError::Resize(e.to_string()))?;

    RgbImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| MotionError::Resize("resized buffer has the wrong length".into()))
}

pub(crate) fn scaled_height(src_width: u32, src_height: u32, target_width: u32) -> u32 {
    let height = (src_height as f64 * target_width as f64 / src_width as f64).round() as u32;
    height.max(1)
}

/// ITU-R BT.601 luma in 14-bit fixed point, matching OpenCV's `COLOR_RGB2GRAY`.
pub fn grayscale(rgb: &RgbImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const SHIFT: u32 = 14;

    let (width, height) = rgb.dimensions();
    let rgb_pixels = rgb.as_raw();
    let mut gray_pixels = vec![0u8; (width * height) as usize];

    gray_pixels
        .par_chunks_mut(1024) // Process in chunks to reduce scheduling overhead.
        .enumerate()
        .for_each(|(chunk_index, gray_chunk)| {
            let start = chunk_index * 1024;
            for (i, pixel) in gray_chunk.iter_mut().enumerate() {
                let base = (start + i) * 3;
                let r = rgb_pixels[base] as u32;
                let g = rgb_pixels[base + 1] as u32;
                let b = rgb_pixels[base + 2] as u32;
                let y = (r * R + g * G + b * B + (1 << (SHIFT - 1))) >> SHIFT;
                *pixel = y.min(255) as u8;
            }
        });

    GrayImage::from_raw(width, height, gray_pixels).unwrap_or_else(|| GrayImage::new(width, height))
}

/// 1D Gaussian taps. A non-positive sigma is derived from the kernel size:
/// sigma = 0.3 * ((size - 1) * 0.5 - 1) + 0.8
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0];
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (size as f32 - 1.0) / 2.0;
    let taps: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = taps.iter().sum();

    taps.into_iter().map(|t| t / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(21, 0.0);
        assert_eq!(kernel.len(), 21);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        for i in 0..10 {
            assert!((kernel[i] - kernel[20 - i]).abs() < 1e-7);
        }
        assert!(kernel[10] > kernel[9]);
        assert_eq!(gaussian_kernel(1, 0.0), vec![1.0]);
    }

    #[test]
    fn grayscale_uses_bt601_weights() {
        let mut rgb = RgbImage::new(4, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 255, 0]));
        rgb.put_pixel(2, 0, Rgb([0, 0, 255]));
        rgb.put_pixel(3, 0, Rgb([200, 200, 200]));

        let gray = grayscale(&rgb);
        assert_eq!(gray.get_pixel(0, 0), &Luma([76]));
        assert_eq!(gray.get_pixel(1, 0), &Luma([150]));
        assert_eq!(gray.get_pixel(2, 0), &Luma([29]));
        assert_eq!(gray.get_pixel(3, 0), &Luma([200]));
    }

    #[test]
    fn resize_keeps_aspect_ratio() {
        let mut resizer = Resizer::new();
        let src = RgbImage::from_pixel(1000, 750, Rgb([10, 20, 30]));
        let out = resize_to_width(&mut resizer, &src, 500).unwrap();
        assert_eq!(out.dimensions(), (500, 375));
        assert_eq!(out.get_pixel(250, 200), &Rgb([10, 20, 30]));

        assert_eq!(scaled_height(640, 480, 500), 375);
        assert_eq!(scaled_height(1920, 1080, 500), 281);
        assert_eq!(scaled_height(5000, 1, 10), 1);
    }

    #[test]
    fn prepare_produces_blurred_analysis_frame() {
        let mut pre = Preprocessor::new(100, 21);
        let mut src = RgbImage::from_pixel(100, 80, Rgb([0, 0, 0]));
        for y in 30..50 {
            for x in 40..60 {
                src.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let analysis = pre.prepare(&src).unwrap();
        assert_eq!(analysis.dimensions(), (100, 80));
        // The edge of the block is softened, the far background stays black.
        let edge = analysis.get_pixel(40, 40)[0];
        assert!(edge > 0 && edge < 255, "edge value {}", edge);
        assert_eq!(analysis.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn flat_frame_survives_blur_unchanged() {
        let mut pre = Preprocessor::new(64, 21);
        let src = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));
        let analysis = pre.prepare(&src).unwrap();
        assert!(analysis.pixels().all(|p| (p[0] as i32 - 90).abs() <= 1));
    }

    #[test]
    fn one_shot_prepare_downscales() {
        let src = RgbImage::from_pixel(1000, 750, Rgb([50, 50, 50]));
        let analysis = prepare(&src, DEFAULT_ANALYSIS_WIDTH).unwrap();
        assert_eq!(analysis.dimensions(), (500, 375));
        assert!((analysis.get_pixel(250, 180)[0] as i32 - 50).abs() <= 1);
    }

    #[test]
    fn zero_sized_frame_is_rejected() {
        let mut pre = Preprocessor::new(500, 21);
        assert!(matches!(
            pre.prepare(&RgbImage::new(0, 0)),
            Err(MotionError::EmptyFrame)
        ));
    }
}
