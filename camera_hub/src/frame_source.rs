//! Replays a directory of still frames as if they came from the camera.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::traits::{Frame, FrameSource};
use anyhow::{Context, Error};
use chrono::{DateTime, Local, TimeDelta};
use std::fs;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Frames are taken in file name order. Their timestamps are synthesized from the
/// configured frame rate, starting once the camera warm-up has passed, so a replay
/// always yields the same decisions.
pub struct DirectoryFrameSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    first_frame_at: DateTime<Local>,
    fps: u32,
}

impl DirectoryFrameSource {
    pub fn open<P: AsRef<Path>>(
        dir: P,
        started_at: DateTime<Local>,
        warmup: TimeDelta,
        fps: u32,
    ) -> Result<Self, Error> {
        let dir = dir.as_ref();
        if fps == 0 {
            anyhow::bail!("Frame rate must be greater than zero");
        }

        let mut files = Vec::new();
        for entry in
            fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_frame_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        debug!("Found {} frame(s) in {}", files.len(), dir.display());

        Ok(DirectoryFrameSource {
            dir: dir.to_path_buf(),
            files,
            next: 0,
            first_frame_at: started_at + warmup,
            fps,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn timestamp_of(&self, index: usize) -> DateTime<Local> {
        self.first_frame_at + TimeDelta::microseconds(index as i64 * 1_000_000 / self.fps as i64)
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            FRAME_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("Failed to decode frame {}", path.display()))?
            .to_rgb8();

        let index = self.next;
        self.next += 1;
        Ok(Some(Frame {
            index,
            timestamp: self.timestamp_of(index),
            image,
        }))
    }

    fn get_name(&self) -> String {
        self.dir.display().to_string()
    }
}
