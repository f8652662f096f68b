//! Destinations for still images and motion clips.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Persists a single annotated frame.
pub trait StillSink {
    fn save(&mut self, frame: &RgbImage, stem: &str) -> io::Result<()>;
}

/// An open clip. `finish` flushes and closes it, consuming the handle so nothing
/// can be written afterwards.
pub trait VideoSink {
    fn write(&mut self, frame: &RgbImage) -> io::Result<()>;
    fn finish(self) -> io::Result<()>;
}

/// Opens a new clip for every recording session.
pub trait VideoSinkFactory {
    type Sink: VideoSink;

    fn open(&mut self, stem: &str, dimensions: (u32, u32), fps: u32) -> io::Result<Self::Sink>;
}

/// File stem shared by the still and the clip of one event, e.g. `2024-06-01T120000`.
/// The resolution is one second; the file writers below add a `-N` suffix when an
/// artifact with the same stem already exists.
pub fn artifact_stem(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y-%m-%dT%H%M%S").to_string()
}

/// `<dir>/<stem>.<ext>`, or the first free `<dir>/<stem>-N.<ext>`.
fn unused_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let path = dir.join(format!("{stem}.{ext}"));
    if !path.exists() {
        return path;
    }
    (1u32..)
        .map(|n| dir.join(format!("{stem}-{n}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(path)
}

fn encode_jpeg<W: Write>(out: W, frame: &RgbImage, quality: u8) -> io::Result<()> {
    let mut encoder = JpegEncoder::new_with_quality(out, quality);
    encoder
        .encode(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(io::Error::other)
}

/// Writes `<dir>/<stem>.jpg`, never overwriting an earlier still.
pub struct JpegStillWriter {
    dir: PathBuf,
    quality: u8,
}

impl JpegStillWriter {
    pub fn new<P: AsRef<Path>>(dir: P, quality: u8) -> Self {
        JpegStillWriter {
            dir: dir.as_ref().to_path_buf(),
            quality,
        }
    }

    pub fn path_for(&self, stem: &str) -> PathBuf {
        unused_path(&self.dir, stem, "jpg")
    }
}

impl StillSink for JpegStillWriter {
    fn save(&mut self, frame: &RgbImage, stem: &str) -> io::Result<()> {
        let path = self.path_for(stem);
        let mut out = BufWriter::new(File::create(&path)?);
        encode_jpeg(&mut out, frame, self.quality)?;
        out.flush()?;
        debug!("Saved still {}", path.display());
        Ok(())
    }
}

/// Opens `<dir>/<stem>.mjpeg` clips, never overwriting an earlier clip.
pub struct MjpegClipWriter {
    dir: PathBuf,
    quality: u8,
}

impl MjpegClipWriter {
    pub fn new<P: AsRef<Path>>(dir: P, quality: u8) -> Self {
        MjpegClipWriter {
            dir: dir.as_ref().to_path_buf(),
            quality,
        }
    }

    pub fn path_for(&self, stem: &str) -> PathBuf {
        unused_path(&self.dir, stem, "mjpeg")
    }
}

impl VideoSinkFactory for MjpegClipWriter {
    type Sink = MjpegClip;

    fn open(&mut self, stem: &str, dimensions: (u32, u32), fps: u32) -> io::Result<MjpegClip> {
        let path = self.path_for(stem);
        let file = File::create(&path)?;
        debug!(
            "Opened clip {} ({}x{} @ {} fps)",
            path.display(),
            dimensions.0,
            dimensions.1,
            fps
        );
        Ok(MjpegClip {
            out: BufWriter::new(file),
            path,
            dimensions,
            quality: self.quality,
            frames: 0,
        })
    }
}

/// Motion-JPEG stream: every frame is a complete JPEG, back to back. The frame rate
/// is not stored in the stream, players have to be told (e.g. `ffplay -framerate`).
pub struct MjpegClip {
    out: BufWriter<File>,
    path: PathBuf,
    dimensions: (u32, u32),
    quality: u8,
    frames: u64,
}

impl MjpegClip {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl VideoSink for MjpegClip {
    fn write(&mut self, frame: &RgbImage) -> io::Result<()> {
        if frame.dimensions() != self.dimensions {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame is {:?} but the clip was opened at {:?}",
                    frame.dimensions(),
                    self.dimensions
                ),
            ));
        }
        encode_jpeg(&mut self.out, frame, self.quality)?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        debug!("Closed clip {} after {} frames", self.path.display(), self.frames);
        Ok(())
    }
}
