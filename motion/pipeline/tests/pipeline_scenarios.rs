//! End-to-end runs of the motion pipeline over synthetic frame sequences.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Local, TimeDelta, TimeZone};
use image::{Rgb, RgbImage};
use pi_surveillance_motion::{
    Decision, JpegStillWriter, MjpegClipWriter, MotionConfig, MotionPipeline, SinkOp, StillSink,
    VideoSink, VideoSinkFactory,
};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

const WIDTH: u32 = 500;
const HEIGHT: u32 = 375;
const FPS: u32 = 16;

#[derive(Default, Debug)]
struct Log {
    stills: Vec<String>,
    opened: Vec<String>,
    frames: Vec<String>,
    closed: Vec<String>,
}

#[derive(Clone, Default)]
struct Stills(Rc<RefCell<Log>>);

impl StillSink for Stills {
    fn save(&mut self, _frame: &RgbImage, stem: &str) -> io::Result<()> {
        self.0.borrow_mut().stills.push(stem.to_string());
        Ok(())
    }
}

/// Fails the first `failing_opens` open calls, then behaves.
#[derive(Clone, Default)]
struct Clips {
    log: Rc<RefCell<Log>>,
    failing_opens: Rc<RefCell<u32>>,
}

struct Clip {
    stem: String,
    log: Rc<RefCell<Log>>,
}

impl VideoSinkFactory for Clips {
    type Sink = Clip;

    fn open(&mut self, stem: &str, _dimensions: (u32, u32), _fps: u32) -> io::Result<Clip> {
        let mut failing = self.failing_opens.borrow_mut();
        if *failing > 0 {
            *failing -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "encoder unavailable"));
        }
        self.log.borrow_mut().opened.push(stem.to_string());
        Ok(Clip {
            stem: stem.to_string(),
            log: self.log.clone(),
        })
    }
}

impl VideoSink for Clip {
    fn write(&mut self, _frame: &RgbImage) -> io::Result<()> {
        self.log.borrow_mut().frames.push(self.stem.clone());
        Ok(())
    }

    fn finish(self) -> io::Result<()> {
        self.log.borrow_mut().closed.push(self.stem.clone());
        Ok(())
    }
}

fn scenario_config() -> MotionConfig {
    MotionConfig {
        resolution: [WIDTH, HEIGHT],
        fps: FPS,
        delta_thresh: 25,
        min_area: 500,
        min_gap_between_images_in_seconds: 5.0,
        min_motion_frames: 8,
        video_length_in_seconds: 10,
        save_image: true,
        save_video: true,
        ..MotionConfig::default()
    }
}

fn t0() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Frame `i` of a 16 fps stream that starts ten seconds after the pipeline.
fn frame_time(i: u32) -> DateTime<Local> {
    t0() + TimeDelta::seconds(10) + TimeDelta::milliseconds(i as i64 * 1000 / FPS as i64)
}

fn frame_with_block(x0: u32, y0: u32, size: u32) -> RgbImage {
    let mut frame = RgbImage::new(WIDTH, HEIGHT);
    for y in y0..y0 + size {
        for x in x0..x0 + size {
            frame.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    frame
}

#[test]
fn moving_block_saves_once_and_records() {
    let stills = Stills::default();
    let clips = Clips {
        log: stills.0.clone(),
        ..Default::default()
    };
    let log = stills.0.clone();
    let mut pipeline = MotionPipeline::new(scenario_config(), t0(), stills, clips).unwrap();

    let seed = pipeline.process(&RgbImage::new(WIDTH, HEIGHT), frame_time(0)).unwrap();
    assert!(seed.seeded_background());
    assert_eq!(seed.decision, Decision::None);

    let mut decisions = Vec::new();
    for i in 1..=20 {
        let frame = frame_with_block(40 + (i - 1) * 20, 170, 30);
        let report = pipeline.process(&frame, frame_time(i)).unwrap();
        assert!(report.motion_detected(), "frame {} had no motion", i);
        assert!(report.failures.is_empty());
        decisions.push(report.decision);
    }

    assert!(decisions[..7].iter().all(|d| *d == Decision::None));
    assert_eq!(decisions[7], Decision::SaveStillAndRecord);
    assert!(decisions[8..].iter().all(|d| *d == Decision::None));

    let log = log.borrow();
    let stem = "2024-06-01T120010";
    assert_eq!(log.stills, vec![stem.to_string()]);
    assert_eq!(log.opened, vec![stem.to_string()]);
    assert_eq!(log.frames.len(), 13);
    assert!(log.closed.is_empty());
    assert_eq!(pipeline.recorder().frames_remaining(), 160 - 13);
}

#[test]
fn small_block_is_never_motion() {
    let stills = Stills::default();
    let log = stills.0.clone();
    let mut pipeline =
        MotionPipeline::new(scenario_config(), t0(), stills, Clips::default()).unwrap();

    pipeline.process(&RgbImage::new(WIDTH, HEIGHT), frame_time(0)).unwrap();

    let spots = [(40, 40), (140, 150), (240, 260), (340, 40), (440, 150), (40, 260)];
    for i in 1..=60u32 {
        let (x, y) = spots[i as usize % spots.len()];
        let report = pipeline
            .process(&frame_with_block(x, y, 10), frame_time(i))
            .unwrap();
        assert!(!report.motion_detected(), "frame {} detected motion", i);
        assert_eq!(report.decision, Decision::None);
    }

    assert!(log.borrow().stills.is_empty());
    assert!(!pipeline.is_recording());
}

#[test]
fn at_most_one_recording_at_a_time() {
    let config = MotionConfig {
        min_gap_between_images_in_seconds: 0.5,
        min_motion_frames: 2,
        video_length_in_seconds: 2,
        ..scenario_config()
    };
    let stills = Stills::default();
    let log = stills.0.clone();
    let clips = Clips {
        log: log.clone(),
        ..Default::default()
    };
    let mut pipeline = MotionPipeline::new(config, t0(), stills, clips).unwrap();
    pipeline.process(&RgbImage::new(WIDTH, HEIGHT), frame_time(0)).unwrap();

    let mut starts = 0;
    let mut remaining_before = 0u64;
    for i in 1..=120u32 {
        // A block bouncing back and forth keeps the scene busy.
        let step = i % 40;
        let x = if step < 20 { 20 + step * 20 } else { 20 + (40 - step) * 20 };
        let report = pipeline
            .process(&frame_with_block(x, 170, 30), frame_time(i))
            .unwrap();

        if report.recording.started.is_some() {
            assert_eq!(remaining_before, 0, "started while recording");
            starts += 1;
        } else if remaining_before > 0 {
            // The countdown only ever moves by one frame.
            assert_eq!(report.recording.frames_remaining, remaining_before - 1);
        }
        remaining_before = report.recording.frames_remaining;
    }

    let log = log.borrow();
    assert!(starts >= 2);
    assert_eq!(log.opened.len(), starts);
    assert!(log.stills.len() > starts);
    assert!(log.closed.len() >= starts - 1);
}

#[test]
fn failed_open_is_reported_once_and_next_trigger_retries() {
    let config = MotionConfig {
        min_gap_between_images_in_seconds: 1.0,
        min_motion_frames: 2,
        video_length_in_seconds: 1,
        ..scenario_config()
    };
    let stills = Stills::default();
    let log = stills.0.clone();
    let clips = Clips {
        log: log.clone(),
        failing_opens: Rc::new(RefCell::new(1)),
    };
    let mut pipeline = MotionPipeline::new(config, t0(), stills, clips).unwrap();
    pipeline.process(&RgbImage::new(WIDTH, HEIGHT), frame_time(0)).unwrap();

    let mut failures = Vec::new();
    let mut started = Vec::new();
    for i in 1..=30u32 {
        let step = i % 40;
        let x = if step < 20 { 20 + step * 20 } else { 20 + (40 - step) * 20 };
        let report = pipeline
            .process(&frame_with_block(x, 170, 30), frame_time(i))
            .unwrap();
        for failure in &report.failures {
            failures.push((i, failure.sink_op()));
        }
        if let Some(stem) = report.recording.started {
            started.push(i);
            assert!(!stem.is_empty());
        }
    }

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].1, Some(SinkOp::VideoOpen));
    assert_eq!(log.borrow().opened.len(), 1);
    assert!(started[0] > failures[0].0);
    // The still of the failed trigger was still saved.
    assert!(log.borrow().stills.len() >= 2);
}

#[test]
fn files_land_on_disk() {
    let images = tempfile::tempdir().unwrap();
    let videos = tempfile::tempdir().unwrap();
    let config = scenario_config();
    let mut pipeline = MotionPipeline::new(
        config,
        t0(),
        JpegStillWriter::new(images.path(), 90),
        MjpegClipWriter::new(videos.path(), 90),
    )
    .unwrap();

    pipeline.process(&RgbImage::new(WIDTH, HEIGHT), frame_time(0)).unwrap();
    for i in 1..=20 {
        let frame = frame_with_block(40 + (i - 1) * 20, 170, 30);
        pipeline.process(&frame, frame_time(i)).unwrap();
    }
    assert_eq!(pipeline.drain().unwrap().as_deref(), Some("2024-06-01T120010"));
    assert!(!pipeline.is_recording());

    let still = image::open(images.path().join("2024-06-01T120010.jpg"))
        .unwrap()
        .to_rgb8();
    assert_eq!(still.dimensions(), (WIDTH, HEIGHT));

    let clip = std::fs::read(videos.path().join("2024-06-01T120010.mjpeg")).unwrap();
    let frames = clip
        .windows(2)
        .filter(|w| w[0] == 0xFF && w[1] == 0xD8)
        .count();
    assert_eq!(frames, 13);
}
