//! Configuration file handling for camera-engine.
//!
//! Loads configuration from `<config dir>/camera-engine/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::{interval_for_fps, CaptureConfig, FitMode};

/// Template written by `camera-engine config init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# camera-engine configuration

[camera]
# Camera device index
device_id = 0
# Output resolution; device frames are scaled to this size
width = 640
height = 480
# Target frame rate
fps = 30
# Mirror horizontally (selfie mode)
mirror = false
# How device frames are fitted: "stretch" or "letterbox"
fit = "stretch"
"#;

/// Configuration file structure for camera-engine.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraSection,
}

/// The `[camera]` table.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CameraSection {
    #[serde(default)]
    pub device_id: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub mirror: bool,
    #[serde(default)]
    pub fit: Option<String>,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            device_id: CaptureConfig::DEFAULT_DEVICE_INDEX,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            mirror: false,
            fit: None,
        }
    }
}

fn default_width() -> u32 {
    CaptureConfig::DEFAULT_WIDTH
}

fn default_height() -> u32 {
    CaptureConfig::DEFAULT_HEIGHT
}

fn default_fps() -> f64 {
    CaptureConfig::DEFAULT_FPS
}

impl CameraSection {
    /// Build the engine settings, replacing out-of-range values with defaults.
    pub fn capture_config(&self) -> CaptureConfig {
        let defaults = CaptureConfig::default();

        let width = if self.width > 0 {
            self.width
        } else {
            log::warn!("camera.width must be positive, using {}", defaults.width);
            defaults.width
        };
        let height = if self.height > 0 {
            self.height
        } else {
            log::warn!("camera.height must be positive, using {}", defaults.height);
            defaults.height
        };
        let fps = if interval_for_fps(self.fps).is_some() {
            self.fps
        } else {
            log::warn!(
                "camera.fps = {} is not a usable frame rate, using {}",
                self.fps,
                defaults.target_fps
            );
            defaults.target_fps
        };
        let fit = match self.fit.as_deref() {
            None => FitMode::default(),
            Some(name) => FitMode::from_name(name).unwrap_or_else(|| {
                log::warn!("Unknown camera.fit '{}', using {}", name, FitMode::default());
                FitMode::default()
            }),
        };

        CaptureConfig {
            device_index: self.device_id,
            width,
            height,
            target_fps: fps,
            fit,
            mirror: self.mirror,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            Self::parse(&content).map_err(|e| ConfigError::Parse { path, source: e })
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Load configuration, falling back to defaults on any error.
    ///
    /// Startup never fails because of a bad config file; the problem is logged.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            log::warn!("{}; using default configuration", e);
            Config::default()
        })
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Engine settings derived from the `[camera]` table.
    pub fn capture_config(&self) -> CaptureConfig {
        self.camera.capture_config()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("camera-engine").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/camera-engine/config.toml")
        })
}
