//! Capture engine handle and public API.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::capture_loop::{lock, run_capture_loop, CaptureCommand, SessionGuard, SharedState};
use super::device::{open_checked, DeviceBackend};
use super::types::{
    CameraError, CaptureConfig, CaptureStats, ConsumerError, DeviceInfo, Frame, RunState,
};

/// How long `stop()` waits for the capture thread before abandoning it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// A running (or abandoned) capture thread.
struct Session {
    /// Channel to send commands to capture thread
    commands: Sender<CaptureCommand>,
    /// Disconnects when the capture thread has fully exited
    exited: Receiver<()>,
    thread: JoinHandle<()>,
}

impl Session {
    fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.exited.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    fn has_exited(&self) -> bool {
        !matches!(self.exited.try_recv(), Err(TryRecvError::Empty))
    }

    fn join(self) {
        if self.thread.join().is_err() {
            log::error!("Capture thread panicked");
        }
    }
}

#[derive(Default)]
struct Sessions {
    active: Option<Session>,
    /// Thread abandoned by a timed-out stop, still blocked in a read
    draining: Option<Session>,
}

impl Sessions {
    /// Join threads that have finished so a new session can start.
    ///
    /// Fails with `SessionDraining` while an earlier capture thread still owns
    /// a device.
    fn reap(&mut self, timeout: Duration) -> Result<(), CameraError> {
        if let Some(session) = self.draining.take() {
            if !session.has_exited() {
                self.draining = Some(session);
                return Err(CameraError::SessionDraining);
            }
            session.join();
        }

        // The loop ended on its own (device failure); it may still be releasing
        if let Some(session) = self.active.take() {
            if !session.wait(timeout) {
                self.draining = Some(session);
                return Err(CameraError::SessionDraining);
            }
            session.join();
        }

        Ok(())
    }
}

/// Camera acquisition engine.
///
/// Owns one capture device while running, acquires frames on a background
/// thread at the configured rate, and keeps the latest frame available to any
/// thread through [`CaptureEngine::get_current_frame`]. All methods take
/// `&self`, so the engine can be shared in an `Arc` between a control thread
/// and any number of readers.
///
/// A device read that never returns cannot be interrupted: `stop()` gives up
/// waiting after the stop timeout and reports `Stopped`, and the abandoned
/// thread releases the device once the read returns. `start()` fails with
/// [`CameraError::SessionDraining`] until then.
pub struct CaptureEngine {
    config: CaptureConfig,
    backend: Arc<dyn DeviceBackend>,
    shared: Arc<SharedState>,
    sessions: Mutex<Sessions>,
    stop_timeout: Duration,
}

impl std::fmt::Debug for CaptureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CaptureEngine {
    /// Create a stopped engine. Performs no I/O.
    pub fn new(config: CaptureConfig, backend: impl DeviceBackend + 'static) -> Self {
        Self {
            config,
            backend: Arc::new(backend),
            shared: Arc::new(SharedState::default()),
            sessions: Mutex::new(Sessions::default()),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Override how long `stop()` waits for the capture thread.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Get the capture settings.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Name of the device backend in use.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Open the device and start capturing frames in a background thread.
    ///
    /// Returns as soon as the thread is spawned; it does not wait for the
    /// first frame. Requested resolution and frame rate are best-effort.
    ///
    /// # Errors
    /// * `CameraError::AlreadyRunning` - If capture is already running
    /// * `CameraError::SessionDraining` - If an abandoned capture thread still holds a device
    /// * `CameraError::DeviceUnavailable` / `OpenFailed` - If the device cannot be opened
    /// * `CameraError::Spawn` - If the OS refuses to create the thread
    pub fn start(&self) -> Result<(), CameraError> {
        let mut sessions = lock(&self.sessions);
        if self.shared.is_running() {
            return Err(CameraError::AlreadyRunning);
        }
        sessions.reap(self.stop_timeout)?;

        let index = self.config.device_index;
        let mut device = open_checked(self.backend.as_ref(), index).map_err(|e| {
            log::warn!("Camera {} ({}) failed to open: {}", index, self.backend.name(), e);
            e
        })?;

        let requested = device.configure(
            self.config.width,
            self.config.height,
            self.config.target_fps,
        );
        if let Err(e) = requested {
            log::debug!("Camera {} ignored requested settings: {}", index, e);
        }
        let (width, height, fps) = device.negotiated();
        if (width, height) != (self.config.width, self.config.height) {
            log::info!(
                "Camera {} delivers {}x{}, frames will be scaled to {}x{}",
                index,
                width,
                height,
                self.config.width,
                self.config.height
            );
        }

        self.shared.begin_session(DeviceInfo {
            device_index: index,
            width,
            height,
            fps,
            is_opened: device.is_opened(),
        });

        // From here the guard owns the device; dropping it releases
        let guard = SessionGuard::new(device, index, Arc::clone(&self.shared));
        let (tx, rx) = mpsc::channel();
        let (exit_tx, exit_rx) = mpsc::channel::<()>();
        let config = self.config.clone();

        let thread = thread::Builder::new()
            .name(format!("capture-{}", index))
            .spawn(move || {
                let _exit = exit_tx;
                run_capture_loop(guard, config, rx);
            })
            .map_err(CameraError::Spawn)?;

        sessions.active = Some(Session {
            commands: tx,
            exited: exit_rx,
            thread,
        });
        log::info!("Camera {} started ({})", index, self.backend.name());
        Ok(())
    }

    /// Stop the capture thread.
    ///
    /// Signals the background thread and waits up to the stop timeout for it
    /// to exit. No-op when already stopped. The last frame stays readable.
    pub fn stop(&self) {
        let mut sessions = lock(&self.sessions);
        let Some(session) = sessions.active.take() else {
            return;
        };

        // Fails only if the loop already exited on its own
        let _ = session.commands.send(CaptureCommand::Stop);

        if session.wait(self.stop_timeout) {
            session.join();
            log::info!("Camera {} stopped", self.config.device_index);
        } else {
            log::warn!(
                "Capture thread for camera {} did not exit within {:?}; abandoning it until its read returns",
                self.config.device_index,
                self.stop_timeout
            );
            sessions.draining = Some(session);
        }

        self.shared.end_session();
    }

    /// Get the latest captured frame.
    ///
    /// Returns an independent copy, or `None` if no frame has been captured
    /// yet. Frames survive `stop()`.
    pub fn get_current_frame(&self) -> Option<Frame> {
        self.shared.current_frame()
    }

    /// Register or replace the per-frame callback.
    ///
    /// Runs on the capture thread; a slow consumer slows acquisition. Errors
    /// and panics are logged and counted, never fatal. The change applies from
    /// the next loop iteration.
    pub fn set_frame_consumer<F>(&self, consumer: F)
    where
        F: Fn(&Frame) -> Result<(), ConsumerError> + Send + Sync + 'static,
    {
        self.shared.set_consumer(Some(Arc::new(consumer)));
    }

    /// Remove the per-frame callback.
    pub fn clear_frame_consumer(&self) {
        self.shared.set_consumer(None);
    }

    /// Check whether the configured device can be opened.
    ///
    /// Opens and immediately releases the device. Probing the device of a
    /// running engine may fail on hardware that allows a single reader.
    pub fn is_available(&self) -> bool {
        match open_checked(self.backend.as_ref(), self.config.device_index) {
            Ok(mut device) => {
                device.release();
                true
            }
            Err(e) => {
                log::debug!("Camera {} unavailable: {}", self.config.device_index, e);
                false
            }
        }
    }

    /// Negotiated device settings while running, `None` when stopped.
    ///
    /// `is_opened` is refreshed from the handle after every read.
    pub fn get_device_info(&self) -> Option<DeviceInfo> {
        if !self.shared.is_running() {
            return None;
        }
        self.shared.device_info()
    }

    pub fn state(&self) -> RunState {
        if self.shared.is_running() {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    /// Check if the capture thread is currently running.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Frame and consumer-failure counters since construction.
    pub fn stats(&self) -> CaptureStats {
        self.shared.stats()
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
