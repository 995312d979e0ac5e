//! CLI enum types for backend and fit options.

use clap::ValueEnum;

use camera_engine::camera::{CameraError, DeviceBackend, FitMode, TestPatternBackend};

/// Device backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    /// Physical camera when available, test pattern otherwise
    #[default]
    Auto,
    /// Simulated colour bars
    TestPattern,
    /// Physical camera without fallback (requires the `native` feature)
    Native,
}

impl Backend {
    /// Instantiate the selected backend.
    pub fn build(self) -> Result<Box<dyn DeviceBackend>, CameraError> {
        match self {
            #[cfg(feature = "native")]
            Backend::Auto => Ok(Box::new(camera_engine::camera::FallbackBackend::new(
                camera_engine::camera::NativeBackend::new(),
                TestPatternBackend::new(),
            ))),
            #[cfg(not(feature = "native"))]
            Backend::Auto => {
                log::debug!("Built without a physical camera backend, using test pattern");
                Ok(Box::new(TestPatternBackend::new()))
            }
            Backend::TestPattern => Ok(Box::new(TestPatternBackend::new())),
            #[cfg(feature = "native")]
            Backend::Native => Ok(Box::new(camera_engine::camera::NativeBackend::new())),
            #[cfg(not(feature = "native"))]
            Backend::Native => Err(CameraError::OpenFailed(
                "this build has no physical camera support (rebuild with --features native)"
                    .to_string(),
            )),
        }
    }
}

/// How device frames are fitted to the output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Fit {
    Stretch,
    Letterbox,
}

impl From<Fit> for FitMode {
    fn from(f: Fit) -> Self {
        match f {
            Fit::Stretch => FitMode::Stretch,
            Fit::Letterbox => FitMode::Letterbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_conversion() {
        assert_eq!(FitMode::from(Fit::Stretch), FitMode::Stretch);
        assert_eq!(FitMode::from(Fit::Letterbox), FitMode::Letterbox);
    }

    #[test]
    fn test_test_pattern_backend_build() {
        let backend = Backend::TestPattern.build().unwrap();
        assert_eq!(backend.name(), "test-pattern");
        assert!(backend.open(0).is_ok());
    }

    #[test]
    fn test_auto_backend_opens_device_zero() {
        // Falls back to the test pattern when no camera is attached
        let backend = Backend::Auto.build().unwrap();
        assert!(backend.open(0).is_ok());
    }

    #[cfg(not(feature = "native"))]
    #[test]
    fn test_native_backend_unavailable_without_feature() {
        assert!(matches!(
            Backend::Native.build(),
            Err(CameraError::OpenFailed(_))
        ));
    }
}
