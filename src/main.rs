mod cli;

use std::time::Duration;

use camera_engine::camera::CameraError;
use camera_engine::config::Config;
use clap::Parser;
use cli::{Args, Command};

/// Initialise logging; `RUST_LOG` overrides the default `info` level.
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn exit_on_error(result: Result<(), CameraError>) {
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn main() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
    init_logging();

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref());

    match args.command {
        Command::Run(run_args) => {
            let capture = match run_args.apply(config.capture_config()) {
                Ok(capture) => capture,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(2);
                }
            };
            if let Err(e) = cli::setup_ctrlc_handler() {
                log::warn!("Failed to install Ctrl+C handler: {}", e);
            }
            let duration = run_args.duration.map(Duration::from_secs);
            exit_on_error(
                args.backend
                    .build()
                    .and_then(|backend| cli::run(capture, backend, duration)),
            );
        }
        Command::Probe { json } => {
            exit_on_error(
                args.backend
                    .build()
                    .and_then(|backend| cli::probe(config.capture_config(), backend, json)),
            );
        }
        Command::ListCameras { max } => {
            exit_on_error(
                args.backend
                    .build()
                    .map(|backend| cli::list_cameras(backend, max)),
            );
        }
        Command::Config { action } => {
            cli::handle_config_action(action, args.config.as_deref());
        }
    }
}
