//! Camera acquisition module.
//!
//! This module provides a high-level API for camera capture:
//! - The acquisition engine via [`CaptureEngine`]
//! - Device backends via [`DeviceBackend`] and [`DeviceHandle`]
//! - A simulated camera via [`TestPatternBackend`]
//! - Configuration via [`CaptureConfig`]

mod capture;
mod capture_loop;
mod device;
mod frame_utils;
#[cfg(feature = "native")]
mod native_backend;
mod test_pattern;
mod types;

pub use capture::{CaptureEngine, DEFAULT_STOP_TIMEOUT};
pub use capture_loop::FrameConsumer;
pub use device::{open_checked, scan_devices, DeviceBackend, DeviceHandle, FallbackBackend};
pub use frame_utils::{fit_frame, mirror_horizontal};
#[cfg(feature = "native")]
pub use native_backend::{NativeBackend, NativeHandle};
pub use test_pattern::{TestPatternBackend, TestPatternHandle};
pub use types::{
    interval_for_fps, CameraError, CaptureConfig, CaptureStats, ConsumerError, DeviceInfo,
    FitMode, Frame, FrameFormat, RunState, CHANNELS,
};
