//! Configuration management for the crowd-cast OBS control layer

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::{AudioConfig, VideoConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Engine startup settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Video settings used wherever a reset request leaves a value unspecified
    #[serde(default)]
    pub video: VideoConfig,

    /// Audio settings used wherever a reset request leaves a value unspecified
    #[serde(default)]
    pub audio: AudioConfig,

    /// Which encoders, output and service a streaming session creates
    #[serde(default)]
    pub output: OutputConfig,

    /// Background job pool
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Log file settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Locale passed to the engine for module strings
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Module config storage directory (none by default)
    #[serde(default)]
    pub module_config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_video_encoder_id")]
    pub video_encoder_id: String,

    #[serde(default = "default_audio_encoder_id")]
    pub audio_encoder_id: String,

    #[serde(default = "default_output_id")]
    pub output_id: String,

    #[serde(default = "default_service_id")]
    pub service_id: String,

    /// Output track the audio encoder is attached to
    #[serde(default)]
    pub audio_track_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Upper bound on threads running job bodies
    #[serde(default = "default_max_blocking_threads")]
    pub max_blocking_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log files older than this are deleted at startup
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

// Default value functions
fn default_locale() -> String {
    "en-US".to_string()
}

fn default_video_encoder_id() -> String {
    "com.apple.videotoolbox.videoencoder.h264.gva".to_string()
}

fn default_audio_encoder_id() -> String {
    "adv_stream_aac".to_string()
}

fn default_output_id() -> String {
    "rtmp_output".to_string()
}

fn default_service_id() -> String {
    "rtmp_common".to_string()
}

fn default_max_blocking_threads() -> usize {
    512 // tokio's own default
}

fn default_retention_days() -> u64 {
    7
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            module_config_path: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            video_encoder_id: default_video_encoder_id(),
            audio_encoder_id: default_audio_encoder_id(),
            output_id: default_output_id(),
            service_id: default_service_id(),
            audio_track_index: 0,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_blocking_threads: default_max_blocking_threads(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "crowd-cast", "obsapi")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
