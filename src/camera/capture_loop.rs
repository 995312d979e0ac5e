//! Background capture thread implementation.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::device::DeviceHandle;
use super::frame_utils::{fit_frame, mirror_horizontal};
use super::types::{CaptureConfig, CaptureStats, ConsumerError, DeviceInfo, Frame};

/// Callback invoked on the capture thread for every published frame.
pub type FrameConsumer = Arc<dyn Fn(&Frame) -> Result<(), ConsumerError> + Send + Sync>;

/// Commands sent to the capture thread.
pub(crate) enum CaptureCommand {
    Stop,
}

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section here replaces a value wholesale, so a poisoned
/// lock never guards a half-written state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the engine handle and its capture thread.
#[derive(Default)]
pub(crate) struct SharedState {
    /// Latest published frame
    frame: Mutex<Option<Frame>>,
    consumer: Mutex<Option<FrameConsumer>>,
    running: AtomicBool,
    device_info: Mutex<Option<DeviceInfo>>,
    stats: Mutex<CaptureStats>,
}

impl SharedState {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_session(&self, info: DeviceInfo) {
        *lock(&self.device_info) = Some(info);
        self.running.store(true, Ordering::SeqCst);
    }

    pub(crate) fn end_session(&self) {
        self.running.store(false, Ordering::SeqCst);
        *lock(&self.device_info) = None;
    }

    /// Replace the current frame. Readers see either the old or the new frame.
    fn publish(&self, frame: Frame) {
        *lock(&self.frame) = Some(frame);
        let mut stats = lock(&self.stats);
        stats.frames_captured += 1;
        stats.last_frame_at = Some(Instant::now());
    }

    pub(crate) fn current_frame(&self) -> Option<Frame> {
        lock(&self.frame).clone()
    }

    pub(crate) fn set_consumer(&self, consumer: Option<FrameConsumer>) {
        *lock(&self.consumer) = consumer;
    }

    fn consumer(&self) -> Option<FrameConsumer> {
        lock(&self.consumer).clone()
    }

    /// Refresh the open/closed status reported by the handle.
    fn set_device_open(&self, is_opened: bool) {
        if let Some(info) = lock(&self.device_info).as_mut() {
            info.is_opened = is_opened;
        }
    }

    pub(crate) fn device_info(&self) -> Option<DeviceInfo> {
        lock(&self.device_info).clone()
    }

    pub(crate) fn stats(&self) -> CaptureStats {
        *lock(&self.stats)
    }

    fn record_consumer_failure(&self) {
        lock(&self.stats).consumer_failures += 1;
    }
}

/// Owns the device for one session.
///
/// Dropping the guard releases the device exactly once and marks the session
/// stopped, on every exit path of the capture thread, panics included.
pub(crate) struct SessionGuard {
    device: Box<dyn DeviceHandle>,
    device_index: u32,
    shared: Arc<SharedState>,
}

impl SessionGuard {
    pub(crate) fn new(
        device: Box<dyn DeviceHandle>,
        device_index: u32,
        shared: Arc<SharedState>,
    ) -> Self {
        Self {
            device,
            device_index,
            shared,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.device.release();
        log::debug!("Released camera device {}", self.device_index);
        self.shared.end_session();
    }
}

/// Run the capture loop in a background thread.
///
/// Returns when a stop command arrives, the command channel closes, or the
/// device fails. A failed read ends the session; it is not retried.
pub(crate) fn run_capture_loop(
    mut session: SessionGuard,
    config: CaptureConfig,
    rx: Receiver<CaptureCommand>,
) {
    let interval = config.frame_interval();
    let index = config.device_index;
    log::info!(
        "Capture loop started on device {} ({}x{} @ {} fps)",
        index,
        config.width,
        config.height,
        config.target_fps
    );

    while !stop_requested(&rx) {
        let iteration_start = Instant::now();

        let read = session.device.read();
        session.shared.set_device_open(session.device.is_opened());

        let raw = match read {
            Ok(frame) if frame.is_complete() => frame,
            Ok(frame) => {
                log::error!(
                    "Device {} returned an incomplete {}x{} frame ({} bytes), ending capture session",
                    index,
                    frame.width,
                    frame.height,
                    frame.data.len()
                );
                break;
            }
            Err(e) => {
                log::error!("Device {} read failed, ending capture session: {}", index, e);
                break;
            }
        };

        // A read that outlived a stop request must not publish
        if stop_requested(&rx) {
            log::debug!("Discarding frame {} read after stop", raw.sequence);
            break;
        }

        let mut frame = fit_frame(raw, config.width, config.height, config.fit);
        if config.mirror {
            mirror_horizontal(&mut frame);
        }

        session.shared.publish(frame.clone());

        if let Some(consumer) = session.shared.consumer() {
            if !deliver(&consumer, &frame) {
                session.shared.record_consumer_failure();
            }
        }

        // Pace to the target rate; a stop command cuts the wait short
        if let Some(remaining) = interval.checked_sub(iteration_start.elapsed()) {
            match rx.recv_timeout(remaining) {
                Ok(CaptureCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    log::info!("Capture loop on device {} exited", index);
}

/// Check for commands (non-blocking).
fn stop_requested(rx: &Receiver<CaptureCommand>) -> bool {
    match rx.try_recv() {
        Ok(CaptureCommand::Stop) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

/// Invoke the consumer, isolating the loop from its errors and panics.
fn deliver(consumer: &FrameConsumer, frame: &Frame) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| consumer(frame))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::warn!("Frame consumer failed on frame {}: {}", frame.sequence, e);
            false
        }
        Err(payload) => {
            log::error!(
                "Frame consumer panicked on frame {}: {}",
                frame.sequence,
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
