//! Turns the per-frame motion signal into rate-limited save decisions
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Local, TimeDelta};
use std::fmt;

/// What the pipeline should persist for the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    None,
    SaveStill,
    /// Still save and recording start happen on the same frame.
    SaveStillAndRecord,
}

impl Decision {
    pub fn saves_still(&self) -> bool {
        !matches!(self, Decision::None)
    }

    pub fn starts_recording(&self) -> bool {
        matches!(self, Decision::SaveStillAndRecord)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::None => "none",
            Decision::SaveStill => "save_still",
            Decision::SaveStillAndRecord => "save_still_and_record",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the debouncer currently is in its save cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DebouncePhase {
    /// No motion frames counted yet.
    Idle,
    /// Counting consecutive motion frames towards a save.
    Accumulating,
    /// Inside the minimum gap after the last save.
    CoolingDown,
}

impl DebouncePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebouncePhase::Idle => "Idle",
            DebouncePhase::Accumulating => "Accumulating",
            DebouncePhase::CoolingDown => "CoolingDown",
        }
    }
}

impl fmt::Display for DebouncePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Two-stage gate: a minimum time gap since the last save, then a number of
/// consecutive motion frames. Single-frame flicker never saves, while the worst
/// case save latency stays bounded by the gap plus the frame count.
#[derive(Clone, Debug)]
pub struct Debouncer {
    min_gap: TimeDelta,
    min_consecutive_frames: u32,
    last_saved: DateTime<Local>,
    consecutive_motion_frames: u32,
}

impl Debouncer {
    /// `started_at` acts as the first "last save", so nothing is saved during the
    /// first gap after start-up.
    pub fn new(min_gap: TimeDelta, min_consecutive_frames: u32, started_at: DateTime<Local>) -> Self {
        Debouncer {
            min_gap,
            min_consecutive_frames,
            last_saved: started_at,
            consecutive_motion_frames: 0,
        }
    }

    pub fn last_saved(&self) -> DateTime<Local> {
        self.last_saved
    }

    pub fn consecutive_motion_frames(&self) -> u32 {
        self.consecutive_motion_frames
    }

    pub fn phase(&self, now: DateTime<Local>) -> DebouncePhase {
        if self.within_gap(now) {
            DebouncePhase::CoolingDown
        } else if self.consecutive_motion_frames > 0 {
            DebouncePhase::Accumulating
        } else {
            DebouncePhase::Idle
        }
    }

    /// `can_start_recording` is false while a recording is already running (or
    /// recording is disabled); the still save is gated independently of it.
    pub fn evaluate(
        &mut self,
        motion_detected: bool,
        timestamp: DateTime<Local>,
        can_start_recording: bool,
    ) -> Decision {
        if !motion_detected {
            self.consecutive_motion_frames = 0;
            return Decision::None;
        }

        // Motion inside the gap is not counted towards the next burst.
        if self.within_gap(timestamp) {
            return Decision::None;
        }

        self.consecutive_motion_frames += 1;
        if self.consecutive_motion_frames < self.min_consecutive_frames {
            return Decision::None;
        }

        debug!(
            "Save triggered after {} consecutive motion frames",
            self.consecutive_motion_frames
        );
        self.consecutive_motion_frames = 0;
        self.last_saved = timestamp;

        if can_start_recording {
            Decision::SaveStillAndRecord
        } else {
            Decision::SaveStill
        }
    }

    // A clock that went backwards also counts as inside the gap.
    fn within_gap(&self, timestamp: DateTime<Local>) -> bool {
        timestamp.signed_duration_since(self.last_saved) < self.min_gap
    }
}
