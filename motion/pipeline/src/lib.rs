//! Background-subtraction motion detection with debounced still and clip recording.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

pub mod annotate;
pub mod config;
pub mod error;
pub mod logic;
pub mod motion;
pub mod sinks;

pub use config::MotionConfig;
pub use error::{MotionError, SinkOp};
pub use logic::debounce::Decision;
pub use logic::pipeline::{FrameReport, MotionPipeline};
pub use logic::recording::RecordingStatus;
pub use motion::detector::{DetectionResult, MotionRegion};
pub use sinks::{JpegStillWriter, MjpegClipWriter, StillSink, VideoSink, VideoSinkFactory};
