//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::MotionError;
use image::GrayImage;
use ndarray::{Array2, Zip};

pub const DEFAULT_ALPHA: f32 = 0.5;

/// Lifecycle of the baseline. It is seeded by the first frame and never reset afterwards.
#[derive(Clone, Debug)]
enum BackgroundState {
    Uninitialized,
    Active { baseline: Array2<f32> },
}

/// Result of feeding one analysis frame to the model.
#[derive(Debug)]
pub enum BackgroundUpdate<'a> {
    /// The frame became the baseline. There is nothing to compare against yet.
    Seeded,
    Updated(&'a Array2<f32>),
}

/// Running exponentially-weighted average of the scene, so that gradual lighting
/// changes (the sun going up and down) are absorbed into the baseline instead of
/// being reported as motion.
#[derive(Clone, Debug)]
pub struct BackgroundModel {
    alpha: f32,
    state: BackgroundState,
}

impl BackgroundModel {
    pub fn new(alpha: f32) -> Self {
        BackgroundModel {
            alpha,
            state: BackgroundState::Uninitialized,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, BackgroundState::Active { .. })
    }

    /// (width, height) of the baseline once seeded.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.state {
            BackgroundState::Uninitialized => None,
            BackgroundState::Active { baseline } => {
                let (rows, cols) = baseline.dim();
                Some((cols as u32, rows as u32))
            }
        }
    }

    /// Seed on the first call, otherwise blend the frame into the baseline in place:
    /// baseline = alpha * frame + (1 - alpha) * baseline
    pub fn update(&mut self, frame: &GrayImage) -> Result<BackgroundUpdate<'_>, MotionError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(MotionError::EmptyFrame);
        }

        let frame_array = to_array(frame)?;

        if !self.is_initialized() {
            debug!("Seeding background model at {}x{}", width, height);
            self.state = BackgroundState::Active {
                baseline: frame_array,
            };
            return Ok(BackgroundUpdate::Seeded);
        }

        if let BackgroundState::Active { baseline } = &mut self.state {
            let (rows, cols) = baseline.dim();
            if (cols as u32, rows as u32) != (width, height) {
                return Err(MotionError::DimensionMismatch {
                    expected: (cols as u32, rows as u32),
                    actual: (width, height),
                });
            }

            let alpha = self.alpha;
            Zip::from(&mut *baseline)
                .and(&frame_array)
                .par_for_each(|bg, &fa| {
                    *bg = fa * alpha + *bg * (1.0 - alpha);
                });

            return Ok(BackgroundUpdate::Updated(baseline));
        }

        Ok(BackgroundUpdate::Seeded)
    }

    /// Baseline rounded and saturated to 8 bit, the form the detector differences against.
    pub fn baseline_image(&self) -> Option<GrayImage> {
        match &self.state {
            BackgroundState::Uninitialized => None,
            BackgroundState::Active { baseline } => Some(baseline_to_image(baseline)),
        }
    }
}

impl Default for BackgroundModel {
    fn default() -> Self {
        BackgroundModel::new(DEFAULT_ALPHA)
    }
}

fn to_array(frame: &GrayImage) -> Result<Array2<f32>, MotionError> {
    let (width, height) = frame.dimensions();
    let frame_vec: Vec<f32> = frame.as_raw().iter().map(|&p| p as f32).collect();
    // An `ImageBuffer` always holds exactly width * height samples.
    Array2::from_shape_vec((height as usize, width as usize), frame_vec)
        .map_err(|_| MotionError::EmptyFrame)
}

pub(crate) fn baseline_to_image(baseline: &Array2<f32>) -> GrayImage {
    let (rows, cols) = baseline.dim();
    // Iterating in logical order keeps this correct for non-standard layouts.
    let data: Vec<u8> = baseline
        .iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    GrayImage::from_raw(cols as u32, rows as u32, data)
        .unwrap_or_else(|| GrayImage::new(cols as u32, rows as u32))
}
