//! SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::Error;
use chrono::{DateTime, Local};
use image::RgbImage;

/// One captured frame and the moment it was taken.
pub struct Frame {
    pub index: usize,
    pub timestamp: DateTime<Local>,
    pub image: RgbImage,
}

pub trait FrameSource {
    /// `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, Error>;
    fn get_name(&self) -> String;
}
