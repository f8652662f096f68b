//! Lifecycle of the motion clip: open on trigger, count frames down, close.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{MotionError, SinkOp};
use crate::sinks::{VideoSink, VideoSinkFactory};
use image::RgbImage;
use std::io;

/// One open clip. Every regular exit finalizes it and reports the close result.
/// Dropping an unfinalized session (a panic unwinding through the controller)
/// still closes the sink.
pub struct RecordingSession<S: VideoSink> {
    sink: Option<S>,
    stem: String,
    frames_remaining: u64,
    frames_written: u64,
}

impl<S: VideoSink> RecordingSession<S> {
    fn new(sink: S, stem: &str, frames: u64) -> Self {
        RecordingSession {
            sink: Some(sink),
            stem: stem.to_string(),
            frames_remaining: frames,
            frames_written: 0,
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn frames_remaining(&self) -> u64 {
        self.frames_remaining
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn write(&mut self, frame: &RgbImage) -> io::Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| io::Error::other("recording sink already closed"))?;
        sink.write(frame)?;
        self.frames_written += 1;
        self.frames_remaining = self.frames_remaining.saturating_sub(1);
        Ok(())
    }

    fn finalize(mut self) -> io::Result<()> {
        match self.sink.take() {
            Some(sink) => sink.finish(),
            None => Ok(()),
        }
    }
}

impl<S: VideoSink> Drop for RecordingSession<S> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            let _ = sink.finish();
        }
    }
}

/// What happened to the recording during one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordingStatus {
    /// Stem of the clip opened on this frame.
    pub started: Option<String>,
    /// Stem of the clip completed on this frame.
    pub finished: Option<String>,
    /// Frames still owed to the active clip, 0 when nothing is recording.
    pub frames_remaining: u64,
}

impl RecordingStatus {
    pub fn is_active(&self) -> bool {
        self.frames_remaining > 0
    }
}

/// Owns at most one recording session. Start requests while a clip is being
/// written are ignored; they neither interrupt nor queue another clip.
pub struct RecordingController<F: VideoSinkFactory> {
    factory: F,
    fps: u32,
    length_seconds: u32,
    session: Option<RecordingSession<F::Sink>>,
}

impl<F: VideoSinkFactory> RecordingController<F> {
    pub fn new(factory: F, fps: u32, length_seconds: u32) -> Self {
        RecordingController {
            factory,
            fps,
            length_seconds,
            session: None,
        }
    }

    pub fn frames_per_clip(&self) -> u64 {
        self.fps as u64 * self.length_seconds as u64
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn frames_remaining(&self) -> u64 {
        self.session
            .as_ref()
            .map(|s| s.frames_remaining())
            .unwrap_or(0)
    }

    /// Called once per frame. Opens a clip when asked to and none is active, then
    /// feeds the frame to the active clip and closes it when its countdown hits zero.
    /// A failing sink aborts the session so that a later trigger can start afresh.
    /// A write failure also closes the clip, and a failed close is returned next
    /// to the write failure.
    pub fn tick(
        &mut self,
        start_requested: bool,
        frame: &RgbImage,
        stem: &str,
    ) -> Result<RecordingStatus, Vec<MotionError>> {
        let mut status = RecordingStatus::default();

        if start_requested && self.session.is_none() {
            let frames = self.frames_per_clip();
            if frames > 0 {
                let dimensions = frame.dimensions();
                let sink = self
                    .factory
                    .open(stem, dimensions, self.fps)
                    .map_err(|e| vec![MotionError::sink(SinkOp::VideoOpen, e)])?;
                debug!("Recording {} started, {} frames to go", stem, frames);
                self.session = Some(RecordingSession::new(sink, stem, frames));
                status.started = Some(stem.to_string());
            }
        }

        let Some(session) = self.session.as_mut() else {
            return Ok(status);
        };

        if let Err(e) = session.write(frame) {
            let mut failures = vec![MotionError::sink(SinkOp::VideoWrite, e)];
            if let Some(aborted) = self.session.take() {
                debug!("Recording {} aborted", aborted.stem());
                if let Err(e) = aborted.finalize() {
                    failures.push(MotionError::sink(SinkOp::VideoClose, e));
                }
            }
            return Err(failures);
        }

        if session.frames_remaining() > 0 {
            status.frames_remaining = session.frames_remaining();
            return Ok(status);
        }

        if let Some(done) = self.session.take() {
            let stem = done.stem().to_string();
            debug!("Recording {} finished after {} frames", stem, done.frames_written());
            done.finalize()
                .map_err(|e| vec![MotionError::sink(SinkOp::VideoClose, e)])?;
            status.finished = Some(stem);
        }

        Ok(status)
    }

    /// Closes the active clip early. Returns its stem, if there was one.
    pub fn drain(&mut self) -> Result<Option<String>, MotionError> {
        match self.session.take() {
            Some(session) => {
                let stem = session.stem().to_string();
                debug!(
                    "Draining recording {} with {} frames left",
                    stem,
                    session.frames_remaining()
                );
                session
                    .finalize()
                    .map_err(|e| MotionError::sink(SinkOp::VideoClose, e))?;
                Ok(Some(stem))
            }
            None => Ok(None),
        }
    }
}
