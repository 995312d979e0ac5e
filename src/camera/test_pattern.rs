//! Simulated camera that renders scrolling colour bars.
//!
//! Used when no physical camera is present, and in tests. The handle behaves
//! like real hardware where it matters to the engine: requested settings are
//! clamped silently, and `read()` blocks until the next frame is due.

use std::thread;
use std::time::{Duration, Instant};

use super::device::{DeviceBackend, DeviceHandle};
use super::types::{CameraError, Frame, CHANNELS};

/// Largest resolution the simulated sensor delivers.
pub const MAX_WIDTH: u32 = 1920;
pub const MAX_HEIGHT: u32 = 1080;
/// Frame rate range the simulated sensor supports.
pub const MIN_FPS: f64 = 1.0;
pub const MAX_FPS: f64 = 60.0;

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Backend producing [`TestPatternHandle`]s for indices below `device_count`.
#[derive(Debug, Clone)]
pub struct TestPatternBackend {
    device_count: u32,
}

impl TestPatternBackend {
    /// A backend with a single simulated camera at index 0.
    pub fn new() -> Self {
        Self { device_count: 1 }
    }

    /// A backend with `count` simulated cameras.
    pub fn with_devices(count: u32) -> Self {
        Self {
            device_count: count,
        }
    }
}

impl Default for TestPatternBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for TestPatternBackend {
    fn name(&self) -> &str {
        "test-pattern"
    }

    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, CameraError> {
        if index >= self.device_count {
            return Err(CameraError::DeviceUnavailable(index));
        }
        Ok(Box::new(TestPatternHandle::new()))
    }
}

/// An open simulated camera.
#[derive(Debug)]
pub struct TestPatternHandle {
    width: u32,
    height: u32,
    fps: f64,
    opened: bool,
    sequence: u64,
    next_due: Option<Instant>,
}

impl TestPatternHandle {
    fn new() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            opened: true,
            sequence: 0,
            next_due: None,
        }
    }

    fn render(&self) -> Vec<u8> {
        let (width, height) = (self.width as usize, self.height as usize);
        let bar_width = (width / BARS.len()).max(1);
        // Scroll one pixel per frame so consecutive frames differ
        let shift = self.sequence as usize % width;

        let mut row = Vec::with_capacity(width * CHANNELS);
        for x in 0..width {
            let bar = ((x + shift) / bar_width) % BARS.len();
            row.extend_from_slice(&BARS[bar]);
        }

        row.repeat(height)
    }
}

impl DeviceHandle for TestPatternHandle {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn configure(&mut self, width: u32, height: u32, fps: f64) -> Result<(), CameraError> {
        self.width = width.clamp(1, MAX_WIDTH);
        self.height = height.clamp(1, MAX_HEIGHT);
        if fps.is_finite() {
            self.fps = fps.clamp(MIN_FPS, MAX_FPS);
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CameraError> {
        if !self.opened {
            return Err(CameraError::ReadFailed("device released".to_string()));
        }

        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + Duration::from_secs_f64(1.0 / self.fps));

        let frame = Frame::new(self.render(), self.width, self.height, self.sequence)?;
        self.sequence += 1;
        Ok(frame)
    }

    fn negotiated(&self) -> (u32, u32, f64) {
        (self.width, self.height, self.fps)
    }

    fn release(&mut self) {
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_opens_only_known_indices() {
        let backend = TestPatternBackend::with_devices(2);
        assert!(backend.open(0).is_ok());
        assert!(backend.open(1).is_ok());
        assert!(matches!(
            backend.open(2),
            Err(CameraError::DeviceUnavailable(2))
        ));
    }

    #[test]
    fn test_configure_clamps_silently() {
        let mut handle = TestPatternHandle::new();
        assert!(handle.configure(4000, 3000, 240.0).is_ok());
        assert_eq!(handle.negotiated(), (MAX_WIDTH, MAX_HEIGHT, MAX_FPS));
    }

    #[test]
    fn test_read_produces_complete_frames() {
        let mut handle = TestPatternHandle::new();
        handle.configure(16, 4, 60.0).unwrap();

        let first = handle.read().unwrap();
        let second = handle.read().unwrap();
        assert!(first.is_complete());
        assert_eq!((first.width, first.height), (16, 4));
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_ne!(first.data, second.data, "pattern should scroll");
    }

    #[test]
    fn test_read_paced_at_negotiated_rate() {
        let mut handle = TestPatternHandle::new();
        handle.configure(8, 8, 20.0).unwrap();

        let start = Instant::now();
        for _ in 0..3 {
            handle.read().unwrap();
        }
        // First read is immediate, the next two wait ~50ms each
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn test_read_after_release_fails() {
        let mut handle = TestPatternHandle::new();
        handle.release();
        assert!(!handle.is_opened());
        assert!(matches!(handle.read(), Err(CameraError::ReadFailed(_))));
    }
}
