//! Camera types and data structures.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Bytes per pixel for every frame the engine produces (RGB).
pub const CHANNELS: usize = 3;

/// How a device frame is mapped onto the configured output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Scale each axis independently to the target size.
    #[default]
    Stretch,
    /// Preserve aspect ratio, pad the remainder with black.
    Letterbox,
}

impl FitMode {
    /// Parse a fit mode name as it appears in config files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "stretch" => Some(FitMode::Stretch),
            "letterbox" => Some(FitMode::Letterbox),
            _ => None,
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMode::Stretch => write!(f, "stretch"),
            FitMode::Letterbox => write!(f, "letterbox"),
        }
    }
}

/// Immutable acquisition settings, fixed at engine construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Device index passed to the backend
    pub device_index: u32,
    /// Output frame width in pixels
    pub width: u32,
    /// Output frame height in pixels
    pub height: u32,
    /// Target acquisition rate
    pub target_fps: f64,
    /// Mapping from device resolution to output resolution
    pub fit: FitMode,
    /// Mirror horizontally (selfie mode)
    pub mirror: bool,
}

impl CaptureConfig {
    pub const DEFAULT_DEVICE_INDEX: u32 = 0;
    pub const DEFAULT_WIDTH: u32 = 640;
    pub const DEFAULT_HEIGHT: u32 = 480;
    pub const DEFAULT_FPS: f64 = 30.0;

    /// Create a validated configuration.
    ///
    /// # Errors
    /// * `CameraError::InvalidConfig` - zero width/height or a non-positive frame rate
    pub fn new(
        device_index: u32,
        width: u32,
        height: u32,
        target_fps: f64,
    ) -> Result<Self, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidConfig(format!(
                "resolution must be non-zero, got {}x{}",
                width, height
            )));
        }
        if interval_for_fps(target_fps).is_none() {
            return Err(CameraError::InvalidConfig(format!(
                "target fps must be positive and give a representable frame interval, got {}",
                target_fps
            )));
        }

        Ok(Self {
            device_index,
            width,
            height,
            target_fps,
            fit: FitMode::default(),
            mirror: false,
        })
    }

    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Time budget for one loop iteration.
    ///
    /// Saturates to `Duration::MAX` for rates that [`CaptureConfig::new`]
    /// would reject, such as a zero or vanishingly small `target_fps`.
    pub fn frame_interval(&self) -> Duration {
        interval_for_fps(self.target_fps).unwrap_or(Duration::MAX)
    }
}

/// Frame period for `fps`, or `None` if the rate is not positive or the
/// period does not fit in a `Duration`.
pub fn interval_for_fps(fps: f64) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps).ok()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: Self::DEFAULT_DEVICE_INDEX,
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            target_fps: Self::DEFAULT_FPS,
            fit: FitMode::default(),
            mirror: false,
        }
    }
}

/// Pixel format of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// RGB format (3 bytes per pixel)
    Rgb,
}

/// A captured camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data in RGB format, row-major
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
    /// Per-device frame counter, starting at 0
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Build a frame, rejecting buffers that don't cover `width x height` RGB pixels.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self, CameraError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(CameraError::MalformedFrame {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
            format: FrameFormat::Rgb,
            sequence,
            timestamp: Instant::now(),
        })
    }

    /// A black frame of the given size.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; width as usize * height as usize * CHANNELS],
            width,
            height,
            format: FrameFormat::Rgb,
            sequence: 0,
            timestamp: Instant::now(),
        }
    }

    /// Get the number of bytes per pixel (3 for RGB).
    pub fn bytes_per_pixel(&self) -> usize {
        match self.format {
            FrameFormat::Rgb => CHANNELS,
        }
    }

    /// True when the buffer holds exactly `width x height` pixels.
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * self.bytes_per_pixel()
    }

    /// RGB value at `(x, y)`, or `None` when out of bounds.
    #[cfg(test)]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let px = self.data.get(offset..offset + CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }
}

/// Lifecycle state of the capture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Stopped => write!(f, "stopped"),
            RunState::Running => write!(f, "running"),
        }
    }
}

/// Values the device actually negotiated for the running session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub is_opened: bool,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}x{} @ {:.1} fps ({})",
            self.device_index,
            self.width,
            self.height,
            self.fps,
            if self.is_opened { "open" } else { "closed" }
        )
    }
}

/// Counters maintained by the acquisition loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    /// Frames published as the current frame
    pub frames_captured: u64,
    /// Frame consumer invocations that returned an error or panicked
    pub consumer_failures: u64,
    /// Publish time of the most recent frame
    pub last_frame_at: Option<Instant>,
}

/// Error returned by a frame consumer.
pub type ConsumerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// Backend could not open the device
    #[error("Camera device {0} is not available")]
    DeviceUnavailable(u32),
    /// Backend-specific open failure
    #[error("Failed to open camera: {0}")]
    OpenFailed(String),
    /// Start called while a session is running
    #[error("Capture thread is already running")]
    AlreadyRunning,
    /// A previous acquisition thread was abandoned and has not exited yet
    #[error("Previous capture thread is still shutting down")]
    SessionDraining,
    /// A frame read failed mid-session
    #[error("Failed to read frame: {0}")]
    ReadFailed(String),
    /// Device produced a buffer of the wrong size
    #[error("Malformed {width}x{height} frame: expected {expected} bytes, got {actual}")]
    MalformedFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    /// Rejected capture settings
    #[error("Invalid capture configuration: {0}")]
    InvalidConfig(String),
    /// OS refused to spawn the acquisition thread
    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.device_index, 0);
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 480);
        assert_eq!(config.target_fps, 30.0);
        assert_eq!(config.fit, FitMode::Stretch);
        assert!(!config.mirror);
    }

    #[test]
    fn test_capture_config_rejects_zero_resolution() {
        assert!(matches!(
            CaptureConfig::new(0, 0, 480, 30.0),
            Err(CameraError::InvalidConfig(_))
        ));
        assert!(matches!(
            CaptureConfig::new(0, 640, 0, 30.0),
            Err(CameraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_capture_config_rejects_bad_fps() {
        for fps in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(CaptureConfig::new(0, 640, 480, fps).is_err(), "fps {}", fps);
        }
    }

    #[test]
    fn test_frame_interval() {
        let config = CaptureConfig::new(0, 64, 48, 10.0).unwrap();
        assert_eq!(config.frame_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_capture_config_rejects_unrepresentable_interval() {
        // 1 / 1e-20 seconds overflows Duration
        assert!(matches!(
            CaptureConfig::new(0, 32, 24, 1e-20),
            Err(CameraError::InvalidConfig(_))
        ));
        assert!(interval_for_fps(1e-20).is_none());
        assert_eq!(interval_for_fps(4.0), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_frame_interval_saturates_for_unchecked_fields() {
        let mut config = CaptureConfig::default();
        for fps in [1e-20, 0.0, -3.0, f64::NAN] {
            config.target_fps = fps;
            assert_eq!(config.frame_interval(), Duration::MAX, "fps {}", fps);
        }
    }

    #[test]
    fn test_fit_mode_from_name() {
        assert_eq!(FitMode::from_name("stretch"), Some(FitMode::Stretch));
        assert_eq!(FitMode::from_name("Letterbox"), Some(FitMode::Letterbox));
        assert_eq!(FitMode::from_name("crop"), None);
    }

    #[test]
    fn test_frame_new_rejects_short_buffer() {
        let err = Frame::new(vec![0; 5], 2, 1, 0).unwrap_err();
        match err {
            CameraError::MalformedFrame {
                expected, actual, ..
            } => {
                assert_eq!(expected, 6);
                assert_eq!(actual, 5);
            }
            other => panic!("Expected MalformedFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_pixel_access() {
        let frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, 7).unwrap();
        assert!(frame.is_complete());
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.pixel(1, 0), Some([4, 5, 6]));
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.bytes_per_pixel(), 3);
    }

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            device_index: 1,
            width: 640,
            height: 480,
            fps: 30.0,
            is_opened: true,
        };
        assert_eq!(format!("{}", info), "[1] 640x480 @ 30.0 fps (open)");
    }

    #[test]
    fn test_camera_error_display() {
        assert_eq!(
            format!("{}", CameraError::DeviceUnavailable(3)),
            "Camera device 3 is not available"
        );
        assert_eq!(
            format!("{}", CameraError::AlreadyRunning),
            "Capture thread is already running"
        );
        assert_eq!(
            format!("{}", CameraError::ReadFailed("eof".to_string())),
            "Failed to read frame: eof"
        );
    }
}
