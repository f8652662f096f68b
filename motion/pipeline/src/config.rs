//! Motion pipeline configuration, loaded from a YAML (or JSON) file.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::MotionError;
use crate::motion::background::DEFAULT_ALPHA;
use crate::motion::detector::DEFAULT_DILATE_ITERATIONS;
use crate::motion::preprocessing::{DEFAULT_ANALYSIS_WIDTH, DEFAULT_BLUR_KERNEL};
use crate::sinks::DEFAULT_JPEG_QUALITY;
use chrono::TimeDelta;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MotionConfig {
    /// Capture resolution requested from the camera, `[width, height]`.
    pub resolution: [u32; 2],
    pub fps: u32,
    pub delta_thresh: u8,
    pub min_area: u32,
    pub min_gap_between_images_in_seconds: f64,
    pub min_motion_frames: u32,
    pub video_length_in_seconds: u32,
    pub save_image: bool,
    pub save_video: bool,
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
    #[serde(default = "default_video_dir")]
    pub video_dir: PathBuf,
    #[serde(default)]
    pub show_video: bool,
    #[serde(default)]
    pub camera_warmup_time: f64,

    #[serde(default = "default_analysis_width")]
    pub analysis_width: u32,
    #[serde(default = "default_blur_kernel")]
    pub blur_kernel: u32,
    #[serde(default = "default_background_alpha")]
    pub background_alpha: f32,
    #[serde(default = "default_dilate_iterations")]
    pub dilate_iterations: u8,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_video_dir() -> PathBuf {
    PathBuf::from("videos")
}

fn default_analysis_width() -> u32 {
    DEFAULT_ANALYSIS_WIDTH
}

fn default_blur_kernel() -> u32 {
    DEFAULT_BLUR_KERNEL
}

fn default_background_alpha() -> f32 {
    DEFAULT_ALPHA
}

fn default_dilate_iterations() -> u8 {
    DEFAULT_DILATE_ITERATIONS
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            resolution: [640, 480],
            fps: 16,
            delta_thresh: 5,
            min_area: 5000,
            min_gap_between_images_in_seconds: 3.0,
            min_motion_frames: 8,
            video_length_in_seconds: 10,
            save_image: true,
            save_video: true,
            image_dir: default_image_dir(),
            video_dir: default_video_dir(),
            show_video: false,
            camera_warmup_time: 2.5,
            analysis_width: DEFAULT_ANALYSIS_WIDTH,
            blur_kernel: DEFAULT_BLUR_KERNEL,
            background_alpha: DEFAULT_ALPHA,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl MotionConfig {
    /// Reads and validates a configuration file. JSON files are accepted as well
    /// since every JSON document is also valid YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MotionError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| MotionError::Config(format!("{}: {}", path.display(), e)))?;
        let config: MotionConfig = serde_yml::from_reader(file)
            .map_err(|e| MotionError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, MotionError> {
        let config: MotionConfig =
            serde_yml::from_str(text).map_err(|e| MotionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MotionError> {
        if self.fps == 0 {
            return Err(MotionError::Config("fps must be greater than zero".into()));
        }
        if self.analysis_width == 0 {
            return Err(MotionError::Config(
                "analysis_width must be greater than zero".into(),
            ));
        }
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return Err(MotionError::Config(format!(
                "blur_kernel must be odd, got {}",
                self.blur_kernel
            )));
        }
        if !(self.background_alpha > 0.0 && self.background_alpha <= 1.0) {
            return Err(MotionError::Config(format!(
                "background_alpha must be in (0, 1], got {}",
                self.background_alpha
            )));
        }
        if self.min_motion_frames == 0 {
            return Err(MotionError::Config(
                "min_motion_frames must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(MotionError::Config(format!(
                "jpeg_quality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if !self.min_gap_between_images_in_seconds.is_finite()
            || self.min_gap_between_images_in_seconds < 0.0
        {
            return Err(MotionError::Config(
                "min_gap_between_images_in_seconds must be a non-negative number".into(),
            ));
        }
        if !self.camera_warmup_time.is_finite() || self.camera_warmup_time < 0.0 {
            return Err(MotionError::Config(
                "camera_warmup_time must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    pub fn min_gap(&self) -> TimeDelta {
        TimeDelta::milliseconds((self.min_gap_between_images_in_seconds * 1000.0).round() as i64)
    }

    pub fn warmup(&self) -> TimeDelta {
        TimeDelta::milliseconds((self.camera_warmup_time * 1000.0).round() as i64)
    }

    pub fn frames_per_clip(&self) -> u64 {
        self.fps as u64 * self.video_length_in_seconds as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const JSON: &str = r#"{
        "show_video": false,
        "min_upload_seconds": 3.0,
        "min_motion_frames": 8,
        "camera_warmup_time": 2.5,
        "delta_thresh": 5,
        "resolution": [640, 480],
        "fps": 16,
        "min_area": 5000,
        "save_image": true,
        "image_dir": "/home/pi/images",
        "save_video": true,
        "video_dir": "/home/pi/videos",
        "video_length_in_seconds": 10,
        "min_gap_between_images_in_seconds": 3
    }"#;

    #[test]
    fn parses_json_config_with_defaults_for_extras() {
        let config = MotionConfig::parse(JSON).unwrap();
        assert_eq!(config.resolution, [640, 480]);
        assert_eq!(config.fps, 16);
        assert_eq!(config.min_gap(), TimeDelta::seconds(3));
        assert_eq!(config.warmup(), TimeDelta::milliseconds(2500));
        assert_eq!(config.frames_per_clip(), 160);
        assert_eq!(config.image_dir, PathBuf::from("/home/pi/images"));
        assert_eq!(config.analysis_width, 500);
        assert_eq!(config.blur_kernel, 21);
        assert_eq!(config.background_alpha, 0.5);
        assert_eq!(config.dilate_iterations, 2);
        assert_eq!(config.jpeg_quality, 90);
    }

    #[test]
    fn loads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "resolution: [320, 240]\n\
             fps: 8\n\
             delta_thresh: 25\n\
             min_area: 500\n\
             min_gap_between_images_in_seconds: 5\n\
             min_motion_frames: 8\n\
             video_length_in_seconds: 10\n\
             save_image: false\n\
             save_video: true\n\
             blur_kernel: 11"
        )
        .unwrap();

        let config = MotionConfig::load(file.path()).unwrap();
        assert_eq!(config.fps, 8);
        assert_eq!(config.delta_thresh, 25);
        assert!(!config.save_image);
        assert_eq!(config.blur_kernel, 11);
        assert_eq!(config.video_dir, PathBuf::from("videos"));
        assert_eq!(config.camera_warmup_time, 0.0);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MotionConfig::load(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, MotionError::Config(_)));
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let err = MotionConfig::parse("fps: 16\n").unwrap_err();
        assert!(matches!(err, MotionError::Config(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cases: Vec<Box<dyn Fn(&mut MotionConfig)>> = vec![
            Box::new(|c| c.fps = 0),
            Box::new(|c| c.analysis_width = 0),
            Box::new(|c| c.blur_kernel = 0),
            Box::new(|c| c.blur_kernel = 20),
            Box::new(|c| c.background_alpha = 0.0),
            Box::new(|c| c.background_alpha = 1.5),
            Box::new(|c| c.min_motion_frames = 0),
            Box::new(|c| c.jpeg_quality = 0),
            Box::new(|c| c.jpeg_quality = 101),
            Box::new(|c| c.min_gap_between_images_in_seconds = -1.0),
        ];

        for (i, break_it) in cases.iter().enumerate() {
            let mut config = MotionConfig::default();
            break_it(&mut config);
            assert!(config.validate().is_err(), "case {} passed validation", i);
        }
        assert!(MotionConfig::default().validate().is_ok());
    }
}
