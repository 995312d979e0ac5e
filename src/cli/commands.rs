//! Subcommand handlers for run, probe, list-cameras and config actions.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camera_engine::camera::{
    scan_devices, CameraError, CaptureConfig, CaptureEngine, DeviceBackend, Frame,
};
use camera_engine::config::{default_path, Config, DEFAULT_CONFIG_TOML};

use super::args::ConfigAction;

/// How often `run` samples the current frame, like a UI refresh timer.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const REPORT_INTERVAL: Duration = Duration::from_secs(1);
/// How long `probe` waits for a first frame.
const PROBE_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Global flag for handling Ctrl+C across the application
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler.
///
/// This should be called once at program startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

/// Average brightness of a frame (0-255).
fn mean_luma(frame: &Frame) -> f64 {
    let pixels = frame.data.len() / frame.bytes_per_pixel();
    if pixels == 0 {
        return 0.0;
    }
    let total: u64 = frame
        .data
        .chunks_exact(frame.bytes_per_pixel())
        .map(|px| (px[0] as u64 * 299 + px[1] as u64 * 587 + px[2] as u64 * 114) / 1000)
        .sum();
    total as f64 / pixels as f64
}

/// Capture until Ctrl+C, the optional duration elapses, or the device fails.
pub fn run(
    capture: CaptureConfig,
    backend: Box<dyn DeviceBackend>,
    duration: Option<Duration>,
) -> Result<(), CameraError> {
    let engine = CaptureEngine::new(capture, backend);

    let delivered = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&delivered);
    engine.set_frame_consumer(move |frame| {
        counter.fetch_add(1, Ordering::Relaxed);
        log::trace!("frame {} delivered", frame.sequence);
        Ok(())
    });

    engine.start()?;
    if let Some(info) = engine.get_device_info() {
        println!("Capturing from {} via {}", info, engine.backend_name());
    }

    let started = Instant::now();
    let mut last_report = started;
    let mut last_delivered = 0;

    loop {
        thread::sleep(POLL_INTERVAL);

        if ctrlc_received() {
            break;
        }
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        if !engine.is_running() {
            eprintln!("Capture stopped: camera read failed");
            break;
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            let total = delivered.load(Ordering::Relaxed);
            let rate = (total - last_delivered) as f64 / last_report.elapsed().as_secs_f64();
            last_report = Instant::now();
            last_delivered = total;

            match engine.get_current_frame() {
                Some(frame) => println!(
                    "{:>5.1}s  {:>6} frames  {:>5.1} fps  #{} {}x{} luma {:.0}",
                    started.elapsed().as_secs_f64(),
                    total,
                    rate,
                    frame.sequence,
                    frame.width,
                    frame.height,
                    mean_luma(&frame)
                ),
                None => println!(
                    "{:>5.1}s  waiting for first frame",
                    started.elapsed().as_secs_f64()
                ),
            }
        }
    }

    engine.stop();

    let stats = engine.stats();
    println!(
        "Captured {} frames in {:.1}s ({} consumer failures)",
        stats.frames_captured,
        started.elapsed().as_secs_f64(),
        stats.consumer_failures
    );
    if let Some(frame) = engine.get_current_frame() {
        println!("Last frame: #{} {}x{}", frame.sequence, frame.width, frame.height);
    }

    Ok(())
}

/// Open the configured camera briefly and report what it negotiates.
pub fn probe(
    capture: CaptureConfig,
    backend: Box<dyn DeviceBackend>,
    json: bool,
) -> Result<(), CameraError> {
    let index = capture.device_index;
    let engine = CaptureEngine::new(capture, backend);

    if !engine.is_available() {
        return Err(CameraError::DeviceUnavailable(index));
    }

    engine.start()?;
    let info = engine.get_device_info();

    let deadline = Instant::now() + PROBE_FRAME_TIMEOUT;
    while engine.get_current_frame().is_none() && engine.is_running() && Instant::now() < deadline
    {
        thread::sleep(Duration::from_millis(10));
    }
    let got_frame = engine.get_current_frame().is_some();
    engine.stop();

    let Some(info) = info else {
        return Err(CameraError::ReadFailed(
            "camera stopped during probe".to_string(),
        ));
    };

    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else {
        println!("Camera {} via {}", info, engine.backend_name());
        println!(
            "  First frame: {}",
            if got_frame { "received" } else { "none within 2s" }
        );
    }

    Ok(())
}

/// List openable cameras and print them to stdout.
pub fn list_cameras(backend: Box<dyn DeviceBackend>, max: u32) {
    let devices = scan_devices(&*backend, max);

    if devices.is_empty() {
        println!(
            "No cameras found ({} backend, indices 0-{}).",
            backend.name(),
            max.saturating_sub(1)
        );
        println!();
        println!("Make sure your camera is connected and permissions are granted.");
    } else {
        println!("Available cameras ({}):", backend.name());
        for index in devices {
            println!("  [{}]", index);
        }
        println!();
        println!("Use --device <index> or camera.device_id to select a camera.");
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>) {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            let capture = Config::load_or_default(Some(&config_path)).capture_config();
            println!("Current configuration:");
            println!("  Device: {}", capture.device_index);
            println!("  Resolution: {}x{}", capture.width, capture.height);
            println!("  FPS: {}", capture.target_fps);
            println!("  Fit: {}", capture.fit);
            println!("  Mirror: {}", if capture.mirror { "yes" } else { "no" });
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => {
            if config_path.exists() {
                eprintln!("Config file already exists: {}", config_path.display());
                eprintln!("Use 'camera-engine config show' to view current settings.");
                std::process::exit(1);
            }

            // Create parent directories if needed
            if let Some(parent) = config_path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("Error creating config directory: {}", e);
                    std::process::exit(1);
                }
            }

            if let Err(e) = std::fs::write(&config_path, DEFAULT_CONFIG_TOML) {
                eprintln!("Error writing config file: {}", e);
                std::process::exit(1);
            }

            println!("Created config file: {}", config_path.display());
        }
    }
}
