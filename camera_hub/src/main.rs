//! Pi surveillance hub.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

use anyhow::{Context, Error};
use docopt::Docopt;
use pi_surveillance_motion::{
    FrameReport, JpegStillWriter, MjpegClipWriter, MotionConfig, MotionPipeline, StillSink,
    VideoSinkFactory,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;

mod frame_source;
use crate::frame_source::DirectoryFrameSource;
mod journal;
use crate::journal::{Journal, JournalEntry};
mod traits;
use crate::traits::FrameSource;

const USAGE: &str = "
Pi surveillance hub: runs motion detection over a sequence of frames and saves stills and clips of motion events.

Usage:
  pi-surveillance-hub --conf <file> --frames <dir> [--journal <file>]
  pi-surveillance-hub (--version | -v)
  pi-surveillance-hub (--help | -h)

Options:
    --conf <file>       Motion configuration (YAML or JSON)
    --frames <dir>      Directory of frames, processed in file name order
    --journal <file>    Append one JSON line per event to this file
    --version, -v       Show version
    --help, -h          Show help
";

#[derive(Debug, Clone, Deserialize)]
struct Args {
    flag_conf: String,
    flag_frames: String,
    flag_journal: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RunSummary {
    frames: u64,
    motion_frames: u64,
    stills: u64,
    recordings: u64,
    failures: u64,
}

impl RunSummary {
    fn entry(&self) -> JournalEntry<'static> {
        JournalEntry::Summary {
            frames: self.frames,
            motion_frames: self.motion_frames,
            stills: self.stills,
            recordings: self.recordings,
            failures: self.failures,
        }
    }
}

fn main() -> Result<(), Error> {
    let version = env!("CARGO_PKG_NAME").to_string() + ", version: " + env!("CARGO_PKG_VERSION");
    env_logger::init();

    let args: Args = Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let config = MotionConfig::load(&args.flag_conf)
        .with_context(|| format!("Failed to load configuration {}", args.flag_conf))?;

    if config.show_video {
        warn!("show_video is set but the hub has no display, frames are not shown");
    }
    if config.save_image {
        fs::create_dir_all(&config.image_dir)
            .with_context(|| format!("Failed to create {}", config.image_dir.display()))?;
    }
    if config.save_video {
        fs::create_dir_all(&config.video_dir)
            .with_context(|| format!("Failed to create {}", config.video_dir.display()))?;
    }

    let started_at = chrono::Local::now();
    let mut source =
        DirectoryFrameSource::open(&args.flag_frames, started_at, config.warmup(), config.fps)?;
    info!(
        "Replaying {} frame(s) from {} at {} fps",
        source.len(),
        source.get_name(),
        config.fps
    );
    if source.is_empty() {
        warn!("No frames found in {}", source.get_name());
    }

    let mut journal = Journal::open(args.flag_journal.as_deref().map(Path::new))?;
    let still_sink = JpegStillWriter::new(&config.image_dir, config.jpeg_quality);
    let video_sinks = MjpegClipWriter::new(&config.video_dir, config.jpeg_quality);
    let mut pipeline = MotionPipeline::new(config, started_at, still_sink, video_sinks)?;

    let summary = run(&mut pipeline, &mut source, &mut journal)?;
    journal.write(&summary.entry())?;

    info!(
        "Processed {} frame(s): {} with motion, {} still(s), {} recording(s), {} failure(s)",
        summary.frames, summary.motion_frames, summary.stills, summary.recordings, summary.failures
    );
    Ok(())
}

/// Feeds every frame of `source` through the pipeline. Sink failures are logged
/// and the run goes on, as do empty frames. A frame the pipeline rejects ends
/// the run. The open recording is closed either way.
fn run<S, F, C>(
    pipeline: &mut MotionPipeline<S, F>,
    source: &mut C,
    journal: &mut Journal,
) -> Result<RunSummary, Error>
where
    S: StillSink,
    F: VideoSinkFactory,
    C: FrameSource,
{
    let mut summary = RunSummary::default();
    let resolution = pipeline.config().resolution;

    let outcome: Result<(), Error> = loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };

        if frame.index == 0 && frame.image.dimensions() != (resolution[0], resolution[1]) {
            warn!(
                "Frames are {:?} but the configured resolution is {:?}",
                frame.image.dimensions(),
                resolution
            );
        }

        match pipeline.process(&frame.image, frame.timestamp) {
            Ok(report) => record(&report, &mut summary, journal, pipeline.config())?,
            Err(e) => {
                break Err(Error::new(e).context(format!("Frame {} was rejected", frame.index)))
            }
        }
    };

    match pipeline.drain() {
        Ok(Some(stem)) => {
            info!("Closed recording {} at end of input", stem);
            summary.recordings += 1;
            journal.write(&JournalEntry::RecordingFinished {
                ts: chrono::Local::now().to_rfc3339(),
                stem: &stem,
                early: true,
            })?;
        }
        Ok(None) => {}
        Err(e) => {
            error!("Failed to close recording: {}", e);
            summary.failures += 1;
            journal.write(&JournalEntry::SinkFailure {
                ts: chrono::Local::now().to_rfc3339(),
                op: e.sink_op().map(|op| op.as_str()).unwrap_or("unknown"),
                error: e.to_string(),
            })?;
        }
    }

    outcome?;
    Ok(summary)
}

fn record(
    report: &FrameReport,
    summary: &mut RunSummary,
    journal: &mut Journal,
    config: &MotionConfig,
) -> Result<(), Error> {
    let ts = report.timestamp.to_rfc3339();
    summary.frames += 1;

    if report.skipped {
        warn!("Frame {} has no pixels, skipped", report.stem);
        return Ok(());
    }

    if report.seeded_background() {
        let (width, height) = report.annotated.dimensions();
        info!("Background model seeded at {}x{}", width, height);
        journal.write(&JournalEntry::BackgroundSeeded {
            ts: ts.clone(),
            width,
            height,
        })?;
    }
    if report.motion_detected() {
        summary.motion_frames += 1;
    }

    if let Some(stem) = &report.still_saved {
        info!("Saved still {}", stem);
        summary.stills += 1;
        journal.write(&JournalEntry::StillSaved {
            ts: ts.clone(),
            stem,
            regions: report
                .detection
                .as_ref()
                .map(|d| d.regions.len())
                .unwrap_or(0),
        })?;
    }

    if let Some(stem) = &report.recording.started {
        info!("Started recording {}", stem);
        journal.write(&JournalEntry::RecordingStarted {
            ts: ts.clone(),
            stem,
            frames: config.frames_per_clip(),
        })?;
    }
    if let Some(stem) = &report.recording.finished {
        info!("Finished recording {}", stem);
        summary.recordings += 1;
        journal.write(&JournalEntry::RecordingFinished {
            ts: ts.clone(),
            stem,
            early: false,
        })?;
    }

    for failure in &report.failures {
        error!("Frame {}: {}", report.stem, failure);
        summary.failures += 1;
        journal.write(&JournalEntry::SinkFailure {
            ts: ts.clone(),
            op: failure.sink_op().map(|op| op.as_str()).unwrap_or("unknown"),
            error: failure.to_string(),
        })?;
    }

    Ok(())
}
