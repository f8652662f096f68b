//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::annotate::{annotate, draw_regions};
use crate::config::MotionConfig;
use crate::error::{MotionError, SinkOp};
use crate::logic::debounce::{Decision, Debouncer};
use crate::logic::recording::{RecordingController, RecordingStatus};
use crate::motion::background::{BackgroundModel, BackgroundUpdate};
use crate::motion::detector::{DetectionResult, MotionDetector};
use crate::motion::preprocessing::Preprocessor;
use crate::sinks::{artifact_stem, StillSink, VideoSinkFactory};
use chrono::{DateTime, Local};
use image::RgbImage;

pub const STATUS_MOTION: &str = "Motion";
pub const STATUS_NO_MOTION: &str = "No movement";

/// Everything that happened while processing one frame.
#[derive(Debug)]
pub struct FrameReport {
    pub timestamp: DateTime<Local>,
    /// Stem any artifact started on this frame is named after.
    pub stem: String,
    /// The frame had no pixels. Nothing was analyzed and no state changed.
    pub skipped: bool,
    /// Absent on skipped frames and on the frame that seeded the background model.
    pub detection: Option<DetectionResult>,
    pub decision: Decision,
    pub status: &'static str,
    /// The resized frame with status, timestamp and region overlays.
    pub annotated: RgbImage,
    pub still_saved: Option<String>,
    pub recording: RecordingStatus,
    /// Sink failures of this frame. Each failure is reported here once and only once.
    pub failures: Vec<MotionError>,
}

impl FrameReport {
    pub fn seeded_background(&self) -> bool {
        !self.skipped && self.detection.is_none()
    }

    pub fn motion_detected(&self) -> bool {
        self.detection
            .as_ref()
            .map(|d| d.motion_detected)
            .unwrap_or(false)
    }
}

/// Owns all per-stream state: background model, debounce counters and the
/// recording session. Frames must be fed one at a time, in capture order.
pub struct MotionPipeline<S: StillSink, F: VideoSinkFactory> {
    config: MotionConfig,
    preprocessor: Preprocessor,
    background: BackgroundModel,
    detector: MotionDetector,
    debouncer: Debouncer,
    recorder: RecordingController<F>,
    still_sink: S,
    frames_processed: u64,
}

impl<S: StillSink, F: VideoSinkFactory> MotionPipeline<S, F> {
    /// `started_at` counts as the last save, so the first still can only happen
    /// once the minimum gap has passed.
    pub fn new(
        config: MotionConfig,
        started_at: DateTime<Local>,
        still_sink: S,
        video_sinks: F,
    ) -> Result<Self, MotionError> {
        config.validate()?;

        Ok(MotionPipeline {
            preprocessor: Preprocessor::new(config.analysis_width, config.blur_kernel),
            background: BackgroundModel::new(config.background_alpha),
            detector: MotionDetector::new(
                config.delta_thresh,
                config.min_area,
                config.dilate_iterations,
            ),
            debouncer: Debouncer::new(config.min_gap(), config.min_motion_frames, started_at),
            recorder: RecordingController::new(
                video_sinks,
                config.fps,
                config.video_length_in_seconds,
            ),
            still_sink,
            frames_processed: 0,
            config,
        })
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }

    pub fn recorder(&self) -> &RecordingController<F> {
        &self.recorder
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_active()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Runs one frame through the pipeline. Sink failures are collected in the
    /// report; errors returned here mean the input itself is unusable. A frame
    /// without pixels is not an error: its report is marked `skipped` and the
    /// background, debounce and recording state stay as they were.
    pub fn process(
        &mut self,
        frame: &RgbImage,
        timestamp: DateTime<Local>,
    ) -> Result<FrameReport, MotionError> {
        if frame.width() == 0 || frame.height() == 0 {
            debug!("Skipping empty frame at {}", timestamp);
            return Ok(FrameReport {
                timestamp,
                stem: artifact_stem(&timestamp),
                skipped: true,
                detection: None,
                decision: Decision::None,
                status: STATUS_NO_MOTION,
                annotated: RgbImage::new(0, 0),
                still_saved: None,
                recording: RecordingStatus {
                    frames_remaining: self.recorder.frames_remaining(),
                    ..RecordingStatus::default()
                },
                failures: Vec::new(),
            });
        }

        let mut annotated = self.preprocessor.resize(frame)?;
        let analysis = self.preprocessor.analysis_frame(&annotated);
        let stem = artifact_stem(&timestamp);
        self.frames_processed += 1;

        let detection = match self.background.update(&analysis)? {
            BackgroundUpdate::Seeded => None,
            BackgroundUpdate::Updated(baseline) => Some(self.detector.detect(&analysis, baseline)?),
        };

        let Some(detection) = detection else {
            debug!("Background seeded at {}", stem);
            annotate(&mut annotated, STATUS_NO_MOTION, &timestamp);
            return Ok(FrameReport {
                timestamp,
                stem,
                skipped: false,
                detection: None,
                decision: Decision::None,
                status: STATUS_NO_MOTION,
                annotated,
                still_saved: None,
                recording: RecordingStatus::default(),
                failures: Vec::new(),
            });
        };

        let status = if detection.motion_detected {
            STATUS_MOTION
        } else {
            STATUS_NO_MOTION
        };
        draw_regions(&mut annotated, &detection.regions);
        annotate(&mut annotated, status, &timestamp);

        let can_start_recording = self.config.save_video && !self.recorder.is_active();
        let decision =
            self.debouncer
                .evaluate(detection.motion_detected, timestamp, can_start_recording);

        let mut failures = Vec::new();
        let mut still_saved = None;
        if decision.saves_still() && self.config.save_image {
            match self.still_sink.save(&annotated, &stem) {
                Ok(()) => still_saved = Some(stem.clone()),
                Err(e) => failures.push(MotionError::sink(SinkOp::StillSave, e)),
            }
        }

        let recording = match self
            .recorder
            .tick(decision.starts_recording(), &annotated, &stem)
        {
            Ok(recording) => recording,
            Err(errors) => {
                failures.extend(errors);
                RecordingStatus::default()
            }
        };

        if decision != Decision::None {
            debug!(
                "Frame {} decided {} with {} region(s)",
                stem,
                decision,
                detection.regions.len()
            );
        }

        Ok(FrameReport {
            timestamp,
            stem,
            skipped: false,
            detection: Some(detection),
            decision,
            status,
            annotated,
            still_saved,
            recording,
            failures,
        })
    }

    /// Finalizes an open recording. Call once the frame source is exhausted.
    pub fn drain(&mut self) -> Result<Option<String>, MotionError> {
        self.recorder.drain()
    }
}
