//! Physical camera backend (feature `native`).
//!
//! Uses nokhwa's platform capture API (V4L2, AVFoundation, Media Foundation)
//! and its decoders, so MJPEG, YUYV and NV12 cameras all deliver RGB frames.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType, Resolution,
};
use nokhwa::{query, Buffer, Camera};

use super::device::{DeviceBackend, DeviceHandle};
use super::types::{CameraError, Frame};

/// Backend for the cameras the operating system exposes.
#[derive(Debug, Default, Clone)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, CameraError> {
        let devices =
            query(ApiBackend::Auto).map_err(|e| CameraError::OpenFailed(e.to_string()))?;
        let known = devices
            .iter()
            .any(|d| d.index().as_index().ok() == Some(index));
        if !known {
            return Err(CameraError::DeviceUnavailable(index));
        }

        let camera = Camera::new(
            CameraIndex::Index(index),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        )
        .map_err(|e| CameraError::OpenFailed(format!("camera {}: {}", index, e)))?;

        Ok(Box::new(NativeHandle {
            index,
            camera: Some(camera),
            streaming: false,
            sequence: 0,
        }))
    }
}

/// Formats to try for a requested mode, in order of preference.
fn format_attempts(width: u32, height: u32, fps: u32) -> [RequestedFormat<'static>; 3] {
    let closest = |format: NokhwaFrameFormat| {
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(width, height),
            format,
            fps,
        )))
    };
    [
        // Native on macOS
        closest(NokhwaFrameFormat::NV12),
        // Supported by nearly every USB webcam
        closest(NokhwaFrameFormat::MJPEG),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    ]
}

/// Decode a raw camera buffer (MJPEG, YUYV, NV12, ...) to an RGB frame.
fn decode(buffer: &Buffer, sequence: u64) -> Result<Frame, CameraError> {
    let image = buffer.decode_image::<RgbFormat>().map_err(|e| {
        CameraError::ReadFailed(format!("decode {}: {}", buffer.source_frame_format(), e))
    })?;
    let (width, height) = (image.width(), image.height());
    Frame::new(image.into_raw(), width, height, sequence)
}

/// An open camera.
pub struct NativeHandle {
    index: u32,
    camera: Option<Camera>,
    /// The stream starts on first read, after configuration
    streaming: bool,
    sequence: u64,
}

impl NativeHandle {
    fn camera_mut(&mut self) -> Result<&mut Camera, CameraError> {
        self.camera
            .as_mut()
            .ok_or_else(|| CameraError::ReadFailed("device released".to_string()))
    }

    fn stop_stream(&mut self) {
        if !self.streaming {
            return;
        }
        self.streaming = false;
        if let Some(camera) = self.camera.as_mut() {
            if let Err(e) = camera.stop_stream() {
                log::debug!("Camera {} stop_stream: {}", self.index, e);
            }
        }
    }
}

impl DeviceHandle for NativeHandle {
    fn is_opened(&self) -> bool {
        self.camera.is_some()
    }

    fn configure(&mut self, width: u32, height: u32, fps: f64) -> Result<(), CameraError> {
        if self.camera.is_none() {
            return Err(CameraError::OpenFailed("device released".to_string()));
        }
        self.stop_stream();
        // Most drivers allow one open handle per device
        self.camera = None;

        let fps = fps.round().clamp(1.0, u32::MAX as f64) as u32;
        let mut last_error = None;
        for requested in format_attempts(width, height, fps) {
            match Camera::new(CameraIndex::Index(self.index), requested) {
                Ok(camera) => {
                    self.camera = Some(camera);
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no format accepted".to_string());
        // Reopen in whatever mode the driver picks so the session can continue
        self.camera = Some(
            Camera::new(
                CameraIndex::Index(self.index),
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            )
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?,
        );
        Err(CameraError::OpenFailed(format!(
            "{}x{} @ {} fps: {}",
            width, height, fps, reason
        )))
    }

    fn read(&mut self) -> Result<Frame, CameraError> {
        let index = self.index;
        let streaming = self.streaming;
        let camera = self.camera_mut()?;
        if !streaming {
            camera
                .open_stream()
                .map_err(|e| CameraError::ReadFailed(format!("camera {} stream: {}", index, e)))?;
            self.streaming = true;
        }

        let buffer = self
            .camera_mut()?
            .frame()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        let frame = decode(&buffer, self.sequence)?;
        self.sequence += 1;
        Ok(frame)
    }

    fn negotiated(&self) -> (u32, u32, f64) {
        match &self.camera {
            Some(camera) => {
                let resolution = camera.resolution();
                (
                    resolution.width(),
                    resolution.height(),
                    camera.frame_rate() as f64,
                )
            }
            None => (0, 0, 0.0),
        }
    }

    fn release(&mut self) {
        self.stop_stream();
        if self.camera.take().is_some() {
            log::debug!("Closed camera {}", self.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_yuyv_buffer() {
        // Black (Y=16) then white (Y=235), neutral chroma
        let buffer = Buffer::new(
            Resolution::new(2, 1),
            &[16, 128, 235, 128],
            NokhwaFrameFormat::YUYV,
        );
        let frame = decode(&buffer, 5).unwrap();
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.sequence, 5);
        assert!(frame.data[..3].iter().all(|&c| c < 30));
        assert!(frame.data[3..].iter().all(|&c| c > 225));
    }

    #[test]
    fn test_decode_corrupt_mjpeg_is_read_error() {
        let buffer = Buffer::new(
            Resolution::new(4, 4),
            &[0xFF, 0xD8, 0x00],
            NokhwaFrameFormat::MJPEG,
        );
        assert!(matches!(decode(&buffer, 0), Err(CameraError::ReadFailed(_))));
    }

    #[test]
    fn test_unknown_index_does_not_open() {
        assert!(NativeBackend::new().open(u32::MAX).is_err());
    }
}
