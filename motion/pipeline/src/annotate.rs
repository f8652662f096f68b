//! Overlays drawn on the frames that get displayed and persisted.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::motion::detector::MotionRegion;
use chrono::{DateTime, Local};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

pub const TEXT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const REGION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const GLYPH_SIZE: i64 = 8;

pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%A %d %B %Y %I:%M:%S%p").to_string()
}

/// Room status in the top left corner, the capture time in the bottom left.
pub fn annotate(frame: &mut RgbImage, status: &str, timestamp: &DateTime<Local>) {
    let height = frame.height() as i64;
    draw_text(frame, 10, 20, &format!("Room Status: {}", status), TEXT_COLOR);
    draw_text(frame, 10, height - 10, &format_timestamp(timestamp), TEXT_COLOR);
}

/// Two pixel wide box around every region.
pub fn draw_regions(frame: &mut RgbImage, regions: &[MotionRegion]) {
    for region in regions {
        if region.width == 0 || region.height == 0 {
            continue;
        }
        let outer = Rect::at(region.x as i32, region.y as i32).of_size(region.width, region.height);
        draw_hollow_rect_mut(frame, outer, REGION_COLOR);

        if region.width > 2 && region.height > 2 {
            let inner = Rect::at(region.x as i32 + 1, region.y as i32 + 1)
                .of_size(region.width - 2, region.height - 2);
            draw_hollow_rect_mut(frame, inner, REGION_COLOR);
        }
    }
}

/// `(x, baseline)` is the bottom left corner of the first glyph. Pixels outside the
/// frame are skipped, characters without a glyph advance the cursor only.
pub fn draw_text(frame: &mut RgbImage, x: i64, baseline: i64, text: &str, color: Rgb<u8>) {
    let (width, height) = (frame.width() as i64, frame.height() as i64);
    let top = baseline - GLYPH_SIZE;

    for (i, ch) in text.chars().enumerate() {
        let left = x + i as i64 * GLYPH_SIZE;
        if left >= width {
            break;
        }
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };

        for (row, &bits) in glyph.iter().enumerate() {
            let py = top + row as i64;
            if py < 0 || py >= height {
                continue;
            }
            // Bit 0 is the leftmost pixel of the row.
            for col in 0..GLYPH_SIZE {
                let px = left + col;
                if (bits >> col as u32) & 1 == 1 && px >= 0 && px < width {
                    frame.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}
