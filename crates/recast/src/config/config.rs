//! Configuration management for recast.
//!
//! Handles loading and saving TOML configuration files with cross-platform
//! paths, validation, and atomic write operations.

use crate::{
    AppError, AppResult,
    config::{AudioConfig, BehaviourConfig, CaptureConfig, OutputConfig, TargetConfig},
};

use std::{
    fs,
    io::Write,
    panic::Location,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use directories::ProjectDirs;
use error_location::ErrorLocation;
use recast_core::{AudioRequest, SessionRequest, VideoRequest, resolve_frame_rate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

const MIN_SAMPLE_RATE: u32 = 8_000;
const MAX_SAMPLE_RATE: u32 = 192_000;
const FILE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Main configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Screen recording settings.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Microphone settings.
    #[serde(default)]
    pub audio: AudioConfig,
    /// Output location and encoding.
    #[serde(default)]
    pub output: OutputConfig,
    /// Application behavior settings.
    #[serde(default)]
    pub behavior: BehaviourConfig,
}

/// File names for one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// MP4 written by the video loop.
    pub video: PathBuf,
    /// WAV written by the audio loop.
    pub audio: PathBuf,
}

impl Config {
    /// Load configuration from the platform config dir, creating a default
    /// file if none exists.
    #[track_caller]
    #[instrument]
    pub fn load() -> AppResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `config_path`, creating it with defaults if
    /// missing. The loaded file is validated.
    #[track_caller]
    #[instrument]
    pub fn load_from(config_path: &Path) -> AppResult<Self> {
        if !config_path.exists() {
            info!(config_path = ?config_path, "No config found, creating default");
            let config = Config::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(config_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to read config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        config.validate()?;

        info!(config_path = ?config_path, "Configuration loaded");

        Ok(config)
    }

    /// Reject values the capture loops cannot honour.
    #[track_caller]
    pub fn validate(&self) -> AppResult<()> {
        if let Some(fps) = self.capture.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(Self::invalid(format!(
                    "capture.fps must be a positive number, got {fps}"
                )));
            }
        }

        if let TargetConfig::Region { width, height, .. } = self.capture.target {
            if width == 0 || height == 0 {
                return Err(Self::invalid(format!(
                    "capture.target region must be non-empty, got {width}x{height}"
                )));
            }
        }

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.audio.sample_rate) {
            return Err(Self::invalid(format!(
                "audio.sample_rate must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE}, got {}",
                self.audio.sample_rate
            )));
        }

        if !(1..=2).contains(&self.audio.channels) {
            return Err(Self::invalid(format!(
                "audio.channels must be 1 or 2, got {}",
                self.audio.channels
            )));
        }

        Ok(())
    }

    /// Save configuration to `config_path` using atomic write pattern.
    ///
    /// Writes to a temporary file first, then renames to prevent corruption
    /// if the process crashes during the write.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn save_to(&self, config_path: &Path) -> AppResult<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                debug!(config_dir = ?parent, "Created config directory");
            }
        }

        let temp_path = config_path.with_extension("toml.tmp");

        let mut temp_file = fs::File::create(&temp_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to create temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(|e| AppError::ConfigError {
                reason: format!("Failed to write temp config file: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        temp_file.sync_all().map_err(|e| AppError::ConfigError {
            reason: format!("Failed to sync temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        fs::rename(&temp_path, config_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to rename temp config to final: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!(config_path = ?config_path, "Configuration saved (atomic write)");

        Ok(())
    }

    /// Timestamped output file names for a recording started at `now`.
    pub fn output_paths(&self, now: DateTime<Local>) -> OutputPaths {
        let stamp = now.format(FILE_STAMP_FORMAT);
        let dir = &self.output.directory;

        OutputPaths {
            video: dir.join(format!("video_{stamp}.mp4")),
            audio: dir.join(format!("audio_{stamp}.wav")),
        }
    }

    /// PNG path for a screenshot taken at `now`, creating the output directory.
    #[track_caller]
    pub fn screenshot_path(&self, now: DateTime<Local>) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.output.directory)?;
        let stamp = now.format(FILE_STAMP_FORMAT);
        Ok(self.output.directory.join(format!("screenshot_{stamp}.png")))
    }

    /// Build the core session request, creating the output directory.
    ///
    /// `detected_fps` is the display refresh rate, used when the config
    /// leaves `capture.fps` unset.
    #[track_caller]
    #[instrument(skip(self, paths))]
    pub fn session_request(
        &self,
        paths: &OutputPaths,
        detected_fps: Option<f64>,
    ) -> AppResult<SessionRequest> {
        if !self.output.directory.exists() {
            fs::create_dir_all(&self.output.directory)?;
            info!(directory = ?self.output.directory, "Created output directory");
        }

        let video = VideoRequest {
            target: self.capture.target.to_target(),
            fps: resolve_frame_rate(self.capture.fps, detected_fps),
            cursor: self.capture.cursor,
            webcam: self.capture.webcam,
            catch_up_limit: (self.capture.catch_up_limit > 0).then_some(self.capture.catch_up_limit),
            output: paths.video.clone(),
        };

        let audio = self.audio.microphone.then(|| AudioRequest {
            output: paths.audio.clone(),
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
        });

        Ok(SessionRequest {
            video: Some(video),
            audio,
        })
    }

    /// Directory for rolling log files.
    pub fn log_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "recast", "Recast").map(|dirs| dirs.data_dir().join("logs"))
    }

    #[track_caller]
    fn config_path() -> AppResult<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("com", "recast", "Recast").ok_or_else(|| AppError::ConfigError {
                reason: "Failed to get config directory".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    #[track_caller]
    fn invalid(reason: String) -> AppError {
        AppError::ConfigError {
            reason,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
