//! Frame differencing against the background model and contour based region filtering
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::MotionError;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::point::Point;
use ndarray::{Array2, ArrayView2, Zip};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

pub const DEFAULT_DELTA_THRESHOLD: u8 = 5;
pub const DEFAULT_MIN_AREA: u32 = 5000;
pub const DEFAULT_DILATE_ITERATIONS: u8 = 2;

/// Bounding box of one changed area, plus the area enclosed by its outer contour.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub area: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub motion_detected: bool,
    pub regions: Vec<MotionRegion>,
    /// Pixels above the delta threshold before dilation.
    pub changed_pixels: usize,
}

/// Thresholds for turning a frame/background delta into motion regions.
#[derive(Clone, Debug)]
pub struct MotionDetector {
    delta_threshold: u8,
    min_area: u32,
    dilate_iterations: u8,
}

impl MotionDetector {
    pub fn new(delta_threshold: u8, min_area: u32, dilate_iterations: u8) -> Self {
        MotionDetector {
            delta_threshold,
            min_area,
            dilate_iterations,
        }
    }

    pub fn detect(
        &self,
        analysis: &GrayImage,
        baseline: &Array2<f32>,
    ) -> Result<DetectionResult, MotionError> {
        let mask = delta_mask(analysis, baseline, self.delta_threshold)?;
        let changed_pixels = mask.as_raw().par_iter().filter(|&&p| p == 255).count();
        if changed_pixels == 0 {
            return Ok(DetectionResult::default());
        }

        // Merge neighbouring changed pixels and close small gaps. An L-infinity
        // radius of k is the same as k passes of a 3x3 square element.
        let mask = if self.dilate_iterations > 0 {
            imageproc::morphology::dilate(&mask, Norm::LInf, self.dilate_iterations)
        } else {
            mask
        };

        let regions = external_regions(&mask, self.min_area);
        debug!(
            "{} changed pixels, {} region(s) of at least {} px",
            changed_pixels,
            regions.len(),
            self.min_area
        );

        Ok(DetectionResult {
            motion_detected: !regions.is_empty(),
            regions,
            changed_pixels,
        })
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        MotionDetector::new(
            DEFAULT_DELTA_THRESHOLD,
            DEFAULT_MIN_AREA,
            DEFAULT_DILATE_ITERATIONS,
        )
    }
}

/// One-shot detection with the default dilation.
pub fn detect(
    analysis: &GrayImage,
    baseline: &Array2<f32>,
    delta_threshold: u8,
    min_area: u32,
) -> Result<DetectionResult, MotionError> {
    MotionDetector::new(delta_threshold, min_area, DEFAULT_DILATE_ITERATIONS)
        .detect(analysis, baseline)
}

/// Binary mask: 255 where |frame - baseline| > threshold, 0 elsewhere.
/// The baseline is rounded and saturated to 8 bit before the difference is taken.
pub fn delta_mask(
    frame: &GrayImage,
    baseline: &Array2<f32>,
    threshold: u8,
) -> Result<GrayImage, MotionError> {
    let (width, height) = frame.dimensions();
    let (rows, cols) = baseline.dim();
    if (cols as u32, rows as u32) != (width, height) {
        return Err(MotionError::DimensionMismatch {
            expected: (cols as u32, rows as u32),
            actual: (width, height),
        });
    }

    let frame_view = ArrayView2::from_shape((height as usize, width as usize), frame.as_raw())
        .map_err(|_| MotionError::EmptyFrame)?;

    let mut mask = Array2::<u8>::zeros((height as usize, width as usize));
    Zip::from(&mut mask)
        .and(&frame_view)
        .and(baseline)
        .par_for_each(|m, &px, &bg| {
            let bg = bg.round().clamp(0.0, 255.0) as u8;
            *m = if px.abs_diff(bg) > threshold { 255 } else { 0 };
        });

    let (out_vec, _) = mask.into_raw_vec_and_offset();
    GrayImage::from_raw(width, height, out_vec).ok_or(MotionError::EmptyFrame)
}

/// Outer contours of the mask that enclose at least `min_area` pixels.
pub fn external_regions(mask: &GrayImage, min_area: u32) -> Vec<MotionRegion> {
    let contours: Vec<Contour<i32>> = find_contours(mask);

    contours
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter_map(|c| {
            let area = contour_area(&c.points);
            if area < min_area as f64 {
                return None;
            }
            bounding_rect(&c.points).map(|(x, y, width, height)| MotionRegion {
                x,
                y,
                width,
                height,
                area,
            })
        })
        .collect()
}

/// Shoelace area of a closed polygon.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();

    twice_area.abs() as f64 / 2.0
}

fn bounding_rect(points: &[Point<i32>]) -> Option<(u32, u32, u32, u32)> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;

    Some((
        min_x.max(0) as u32,
        min_y.max(0) as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}
