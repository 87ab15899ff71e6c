//! Tire Size Scanner - reads the size code off a tire sidewall
//!
//! Opens the camera, captures a still, runs text recognition over it and
//! extracts the first size code of the form `205/55R16`.

mod analysis;
mod app;
mod camera;
mod capture;
mod config;
mod dashboard;
mod pipeline;
mod shared;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::ScannerApp;
use crate::camera::{
    CameraBackend, FacingMode, FfmpegCamera, SessionManager, StillImageCamera,
};
use crate::config::{AppConfig, CameraBackendKind, CameraSettings};
use crate::pipeline::PipelineSnapshot;
use crate::shared::SharedAppState;
use crate::vision::{RecognitionAdapter, TesseractCli};

/// Tire Size Scanner - capture a tire sidewall and read its size code
#[derive(Parser, Debug)]
#[command(name = "tire-scanner")]
#[command(about = "Reads the tire size code from a camera picture")]
struct Args {
    /// Which camera to open (overrides the configuration)
    #[arg(long, value_enum)]
    facing_mode: Option<FacingMode>,

    /// Configuration file (default: config.toml in the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use a still image instead of a live camera
    #[arg(long)]
    image: Option<PathBuf>,

    /// Video device to open, overriding the facing mode mapping
    #[arg(long)]
    device: Option<String>,

    /// Scan once without a window and print the result
    #[arg(long)]
    headless: bool,

    /// Print the final pipeline snapshot as JSON
    #[arg(long, requires = "headless")]
    json: bool,

    /// Seconds to wait for the first video frame in headless mode
    #[arg(long, default_value_t = 10)]
    ready_timeout_secs: u64,

    /// Log filter, e.g. `debug` or `tire_scanner=trace` (default: RUST_LOG or info)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log filter {:?}", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Tire scanner starting...");

    let config = load_or_create_config(args.config.as_deref());
    let facing = args.facing_mode.unwrap_or(config.camera.facing_mode);

    let sessions = Arc::new(SessionManager::new(build_camera(&config.camera, &args)));
    let engine = Arc::new(TesseractCli::new(config.recognition.tesseract_path.clone()));
    let recognizer = Arc::new(RecognitionAdapter::new(
        engine,
        Duration::from_secs(config.recognition.timeout_secs),
    ));
    info!(%facing, engine = recognizer.engine_name(), "Scanner configured");

    if args.headless {
        return run_headless(sessions, recognizer, facing, &args);
    }

    let (width, height) = (config.dashboard.window_width, config.dashboard.window_height);
    let shared_state = Arc::new(RwLock::new(SharedAppState::default()));
    let scanner = ScannerApp::start(shared_state, sessions, recognizer, facing)?;

    // Run the dashboard (blocking)
    if let Err(e) = dashboard::run_dashboard(scanner, width, height) {
        error!("Dashboard error: {}", e);
    }

    info!("Tire scanner shutdown complete");
    Ok(ExitCode::SUCCESS)
}

/// Load configuration from file or create default
fn load_or_create_config(explicit: Option<&Path>) -> AppConfig {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config::config_dir() {
            Ok(dir) => dir.join("config.toml"),
            Err(e) => {
                warn!("No configuration directory: {:#}", e);
                return AppConfig::default();
            }
        },
    };

    if path.exists() {
        match config::load_config(&path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                return config;
            }
            Err(e) => {
                warn!("Ignoring configuration: {:#}", e);
                return AppConfig::default();
            }
        }
    }

    let config = AppConfig::default();
    if explicit.is_some() {
        warn!("Configuration {:?} not found, using defaults", path);
    } else if let Err(e) = config::save_config(&config, &path) {
        warn!("Could not write default configuration: {:#}", e);
    } else {
        info!("Wrote default configuration to {:?}", path);
    }
    config
}

/// Pick the camera backend from the command line and configuration
fn build_camera(settings: &CameraSettings, args: &Args) -> Arc<dyn CameraBackend> {
    let still = args.image.clone().or_else(|| match settings.backend {
        CameraBackendKind::StillImage => settings.still_image.clone(),
        CameraBackendKind::Ffmpeg => None,
    });

    if let Some(path) = still {
        info!("Using still image {:?} as camera", path);
        return Arc::new(StillImageCamera::new(path));
    }

    if settings.backend == CameraBackendKind::StillImage {
        warn!("Still image camera configured without an image, using ffmpeg");
    }

    let camera = FfmpegCamera::new(settings);
    match &args.device {
        Some(device) => Arc::new(camera.with_device(device.clone())),
        None => Arc::new(camera),
    }
}

/// Scan once and print the result
fn run_headless(
    sessions: Arc<SessionManager>,
    recognizer: Arc<RecognitionAdapter>,
    facing: FacingMode,
    args: &Args,
) -> Result<ExitCode> {
    info!("Running in headless mode");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let snapshot = runtime.block_on(app::scan_once(
        sessions,
        recognizer,
        facing,
        Duration::from_secs(args.ready_timeout_secs),
    ));

    print_snapshot(&snapshot, args.json)?;

    Ok(if snapshot.tire_size().is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_snapshot(snapshot: &PipelineSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    match (snapshot.tire_size(), snapshot.error_message) {
        (Some(size), _) => {
            info!(dimensions = %size.dimensions(), "Tire size resolved");
            println!("Detected Tire Size: {}", size);
        }
        (None, Some(message)) => eprintln!("{}", message),
        (None, None) => eprintln!("Camera did not produce a picture. Please retry."),
    }
    Ok(())
}
