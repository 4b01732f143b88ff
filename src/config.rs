use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::orchestrator::{PipelineSettings, DEFAULT_QUEUE_DEPTH};
use crate::status::WATCHDOG_PORT;
use crate::storage::{
    DEFAULT_EXTENSION, DEFAULT_MAX_FILE_SIZE, DEFAULT_SAFETY_MARGIN, DEFAULT_STORAGE_DIR,
};

pub const MIN_FRAME_RATE: u32 = 1;
pub const MAX_FRAME_RATE: u32 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid framerate {0}, must be between 1 and 60")]
    FrameRate(u32),
    #[error("{0} must not be zero")]
    Zero(&'static str),
}

/// Recorder settings. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DashcamConfig {
    pub frame_rate: u32,

    // Capture device.
    pub device: String,
    pub input_format: String,
    pub video_size: String,
    pub pixel_format: String,

    // Encoder.
    pub encoder: String,
    pub bit_rate: usize,
    pub gop_size: u32,
    pub max_b_frames: usize,

    // Storage.
    pub storage_dir: PathBuf,
    pub max_file_size: u64,
    pub safety_margin: u64,
    pub extension: String,

    pub queue_depth: usize,
    pub watchdog: bool,
    pub watchdog_port: u16,
}

impl Default for DashcamConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            device: "/dev/video0".to_string(),
            input_format: "v4l2".to_string(),
            video_size: "1920x1080".to_string(),
            pixel_format: "mjpeg".to_string(),
            encoder: "h264_v4l2m2m".to_string(),
            bit_rate: 350_000,
            gop_size: 10,
            max_b_frames: 1,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            extension: DEFAULT_EXTENSION.to_string(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            watchdog: true,
            watchdog_port: WATCHDOG_PORT,
        }
    }
}

impl DashcamConfig {
    /// Reads a JSON config file, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&self.frame_rate) {
            return Err(ConfigError::FrameRate(self.frame_rate));
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::Zero("max_file_size"));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Zero("queue_depth"));
        }
        Ok(())
    }

    /// `(width, height)` parsed from `video_size`, e.g. `1920x1080`.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let (w, h) = self.video_size.split_once('x')?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            frame_rate: self.frame_rate,
            queue_depth: self.queue_depth,
        }
    }
}
