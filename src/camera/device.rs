//! Device handle abstraction and backend selection.

use std::sync::Arc;

use super::types::{CameraError, Frame};

/// An open video source.
///
/// Handles are created by a [`DeviceBackend`] and are owned by exactly one
/// acquisition thread at a time, hence `Send` but not `Sync`.
pub trait DeviceHandle: Send {
    /// Whether the underlying device is actually open.
    fn is_opened(&self) -> bool;

    /// Request a resolution and frame rate.
    ///
    /// Best-effort: devices may clamp or ignore values. Callers read back the
    /// result with [`DeviceHandle::negotiated`].
    fn configure(&mut self, width: u32, height: u32, fps: f64) -> Result<(), CameraError>;

    /// Block until the next frame is available.
    fn read(&mut self) -> Result<Frame, CameraError>;

    /// Resolution and frame rate the device is currently delivering.
    fn negotiated(&self) -> (u32, u32, f64);

    /// Close the device. Reads after release fail.
    fn release(&mut self);
}

/// Factory for device handles, addressed by integer index.
pub trait DeviceBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Open the device at `index`.
    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, CameraError>;
}

impl<B: DeviceBackend + ?Sized> DeviceBackend for Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, CameraError> {
        (**self).open(index)
    }
}

impl<B: DeviceBackend + ?Sized> DeviceBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, CameraError> {
        (**self).open(index)
    }
}

/// Open a device and verify it reports itself open.
///
/// A handle that opens but reports "not opened" is released and dropped here,
/// so callers never hold a dead handle.
pub fn open_checked(
    backend: &dyn DeviceBackend,
    index: u32,
) -> Result<Box<dyn DeviceHandle>, CameraError> {
    let mut handle = backend.open(index)?;
    if !handle.is_opened() {
        handle.release();
        return Err(CameraError::DeviceUnavailable(index));
    }
    Ok(handle)
}

/// Backend that tries a primary source and falls back to a secondary one.
///
/// Typical use is a physical camera backend with a test-pattern fallback for
/// machines without a camera.
pub struct FallbackBackend<P, F> {
    primary: P,
    fallback: F,
}

impl<P: DeviceBackend, F: DeviceBackend> FallbackBackend<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: DeviceBackend, F: DeviceBackend> DeviceBackend for FallbackBackend<P, F> {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, CameraError> {
        match open_checked(&self.primary, index) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                log::warn!(
                    "{} could not open device {} ({}), using {}",
                    self.primary.name(),
                    index,
                    e,
                    self.fallback.name()
                );
                self.fallback.open(index)
            }
        }
    }
}

/// Probe device indices `0..max_index` and return those that open.
///
/// Each probed device is released immediately.
pub fn scan_devices(backend: &dyn DeviceBackend, max_index: u32) -> Vec<u32> {
    (0..max_index)
        .filter(|&index| match open_checked(backend, index) {
            Ok(mut handle) => {
                handle.release();
                true
            }
            Err(e) => {
                log::debug!("device {} unavailable: {}", index, e);
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubHandle {
        opened: bool,
        releases: Arc<AtomicUsize>,
    }

    impl DeviceHandle for StubHandle {
        fn is_opened(&self) -> bool {
            self.opened
        }

        fn configure(&mut self, _: u32, _: u32, _: f64) -> Result<(), CameraError> {
            Ok(())
        }

        fn read(&mut self) -> Result<Frame, CameraError> {
            Ok(Frame::black(2, 2))
        }

        fn negotiated(&self) -> (u32, u32, f64) {
            (2, 2, 30.0)
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Opens only the listed indices; others report "not opened".
    struct StubBackend {
        name: &'static str,
        present: Vec<u32>,
        releases: Arc<AtomicUsize>,
    }

    impl StubBackend {
        fn new(name: &'static str, present: Vec<u32>) -> Self {
            Self {
                name,
                present,
                releases: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl DeviceBackend for StubBackend {
        fn name(&self) -> &str {
            self.name
        }

        fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, CameraError> {
            Ok(Box::new(StubHandle {
                opened: self.present.contains(&index),
                releases: Arc::clone(&self.releases),
            }))
        }
    }

    #[test]
    fn test_open_checked_releases_unopened_handle() {
        let backend = StubBackend::new("stub", vec![]);
        let result = open_checked(&backend, 0);
        assert!(matches!(result, Err(CameraError::DeviceUnavailable(0))));
        assert_eq!(backend.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scan_devices_lists_present_indices() {
        let backend = StubBackend::new("stub", vec![0, 2]);
        assert_eq!(scan_devices(&backend, 4), vec![0, 2]);
        // Every probe releases, opened or not
        assert_eq!(backend.releases.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_fallback_backend_prefers_primary() {
        let primary = StubBackend::new("primary", vec![0]);
        let fallback = StubBackend::new("fallback", vec![0]);
        let fallback_releases = Arc::clone(&fallback.releases);
        let backend = FallbackBackend::new(primary, fallback);

        let handle = backend.open(0).unwrap();
        assert!(handle.is_opened());
        assert_eq!(backend.name(), "primary");
        assert_eq!(fallback_releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fallback_backend_uses_fallback_when_primary_missing() {
        let primary = StubBackend::new("primary", vec![]);
        let primary_releases = Arc::clone(&primary.releases);
        let backend = FallbackBackend::new(primary, StubBackend::new("fallback", vec![1]));

        let handle = backend.open(1).unwrap();
        assert!(handle.is_opened());
        // The dead primary handle was released, not leaked
        assert_eq!(primary_releases.load(Ordering::SeqCst), 1);
    }
}
