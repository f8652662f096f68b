//! JSON-lines journal of motion events.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{Context, Error};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry<'a> {
    BackgroundSeeded {
        ts: String,
        width: u32,
        height: u32,
    },
    StillSaved {
        ts: String,
        stem: &'a str,
        regions: usize,
    },
    RecordingStarted {
        ts: String,
        stem: &'a str,
        frames: u64,
    },
    RecordingFinished {
        ts: String,
        stem: &'a str,
        // Closed before the countdown ran out, at end of input.
        early: bool,
    },
    SinkFailure {
        ts: String,
        op: &'a str,
        error: String,
    },
    Summary {
        frames: u64,
        motion_frames: u64,
        stills: u64,
        recordings: u64,
        failures: u64,
    },
}

/// Appends one JSON object per line. A journal opened without a path swallows
/// every entry.
pub struct Journal {
    log: Option<File>,
}

impl Journal {
    pub fn open(path: Option<&Path>) -> Result<Self, Error> {
        let log = match path {
            Some(path) => Some(
                OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(path)
                    .with_context(|| format!("Failed to open journal {}", path.display()))?,
            ),
            None => None,
        };
        Ok(Journal { log })
    }

    pub fn write(&mut self, entry: &JournalEntry) -> Result<(), Error> {
        if let Some(log) = &mut self.log {
            let line = serde_json::to_string(entry)?;
            writeln!(log, "{line}")?;
        }
        Ok(())
    }
}
