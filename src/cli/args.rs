//! CLI argument parsing with clap.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use camera_engine::camera::{CameraError, CaptureConfig};

use super::enums::{Backend, Fit};

/// Paced camera acquisition from the command line
#[derive(Parser, Debug)]
#[command(name = "camera-engine")]
#[command(version, about = "Camera acquisition engine", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Device backend
    #[arg(long, short, global = true, value_enum, default_value_t = Backend::Auto)]
    pub backend: Backend,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture frames and print live statistics until Ctrl+C
    Run(RunArgs),
    /// Check whether the configured camera opens and show what it negotiates
    Probe {
        /// Print device info as JSON
        #[arg(long)]
        json: bool,
    },
    /// List camera indices that can be opened
    ListCameras {
        /// Number of indices to probe, starting at 0
        #[arg(long, default_value = "8")]
        max: u32,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Overrides for the `[camera]` config table.
#[derive(ClapArgs, Debug, Default)]
pub struct RunArgs {
    /// Stop after this many seconds
    #[arg(long, short)]
    pub duration: Option<u64>,

    /// Camera device index
    #[arg(long)]
    pub device: Option<u32>,

    /// Output resolution (WIDTHxHEIGHT)
    #[arg(long, short, value_parser = parse_resolution)]
    pub resolution: Option<(u32, u32)>,

    /// Target frame rate
    #[arg(long, value_parser = parse_fps)]
    pub fps: Option<f64>,

    /// Mirror horizontally
    #[arg(long)]
    pub mirror: bool,

    /// Fit mode for frames of a different size
    #[arg(long, value_enum)]
    pub fit: Option<Fit>,
}

impl RunArgs {
    /// Apply command-line overrides on top of the file configuration.
    pub fn apply(&self, base: CaptureConfig) -> Result<CaptureConfig, CameraError> {
        let (width, height) = self.resolution.unwrap_or((base.width, base.height));
        let config = CaptureConfig::new(
            self.device.unwrap_or(base.device_index),
            width,
            height,
            self.fps.unwrap_or(base.target_fps),
        )?;

        Ok(config
            .with_fit(self.fit.map(Into::into).unwrap_or(base.fit))
            .with_mirror(self.mirror || base.mirror))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

/// Parse and validate resolution (WIDTHxHEIGHT format)
fn parse_resolution(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s.split_once('x').ok_or_else(|| {
        format!(
            "Invalid resolution format '{}'. Use WIDTHxHEIGHT (e.g., 640x480)",
            s
        )
    })?;
    let width: u32 = w
        .parse()
        .map_err(|_| format!("Invalid width '{}' in resolution", w))?;
    let height: u32 = h
        .parse()
        .map_err(|_| format!("Invalid height '{}' in resolution", h))?;
    if width == 0 || height == 0 {
        return Err("Resolution width and height must be greater than 0".to_string());
    }
    if width > 7680 || height > 4320 {
        return Err("Resolution exceeds maximum supported (7680x4320)".to_string());
    }
    Ok((width, height))
}

/// Parse and validate frame rate (0-240 fps, exclusive of 0)
fn parse_fps(s: &str) -> Result<f64, String> {
    let fps: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid frame rate", s))?;
    if !(fps > 0.0 && fps <= 240.0) {
        return Err(format!("Frame rate must be in (0, 240] fps, got {}", s));
    }
    Ok(fps)
}
