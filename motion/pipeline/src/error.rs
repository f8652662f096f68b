//! Error types shared by the motion pipeline
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::io;
use thiserror::Error;

/// Which persistence operation a sink failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOp {
    StillSave,
    VideoOpen,
    VideoWrite,
    VideoClose,
}

impl SinkOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkOp::StillSave => "still_save",
            SinkOp::VideoOpen => "video_open",
            SinkOp::VideoWrite => "video_write",
            SinkOp::VideoClose => "video_close",
        }
    }
}

impl fmt::Display for SinkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("frame is {actual:?} but the background model is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("frame has zero width or height")]
    EmptyFrame,

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("{op} failed: {source}")]
    Sink {
        op: SinkOp,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MotionError {
    pub(crate) fn sink(op: SinkOp, source: io::Error) -> Self {
        MotionError::Sink { op, source }
    }

    /// Sink failures only abort the affected save or recording; everything else
    /// means the frame source or the configuration cannot be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MotionError::Sink { .. })
    }

    pub fn sink_op(&self) -> Option<SinkOp> {
        match self {
            MotionError::Sink { op, .. } => Some(*op),
            _ => None,
        }
    }
}
