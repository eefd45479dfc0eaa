//! # Stereocast
//!
//! Publishes stereo frames into shared memory channels and inspects them.
//!
//! # Usage
//!
//! ```bash
//! # Publish a synthetic 720p60 stream on channel "synthetic0"
//! stereocast --config config/stereocast.toml publish
//!
//! # Same without a config file
//! stereocast publish --namespace synthetic0 --width 1280 --height 720 --fps 60
//!
//! # Follow a channel from another process
//! stereocast watch --namespace synthetic0 -v
//!
//! # Inspect and clean up
//! stereocast list --json
//! stereocast cleanup --namespace synthetic0
//! ```

mod commands;

use clap::{Args as ClapArgs, Parser, Subcommand};
use common::config::{ConfigError, LogLevel, StereocastConfig};
use common::shm::policy::AdmissionPolicy;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Stereocast - stereo camera frames over shared memory
#[derive(Parser, Debug)]
#[command(name = "stereocast")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Publish stereo camera frames to shared memory channels and inspect them")]
#[command(long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (stereocast.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs (and `list` results) in JSON format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a synthetic camera publisher until interrupted
    Publish(PublishArgs),
    /// Attach to a channel and report frame rate and latency
    Watch(WatchArgs),
    /// List channels found in /dev/shm
    List,
    /// Remove segments left behind by a publisher that died
    Cleanup {
        /// Channel namespace
        #[arg(short, long)]
        namespace: String,
    },
}

#[derive(ClapArgs, Debug, Default)]
struct PublishArgs {
    /// Channel namespace (overrides [publisher].namespace)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Image width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Image height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Frames per second
    #[arg(long)]
    fps: Option<f64>,

    /// Write admission policy: exclusive or legacy
    #[arg(long)]
    admission: Option<AdmissionPolicy>,

    /// Capture as fast as possible instead of at the nominal rate
    #[arg(long)]
    no_pace: bool,
}

#[derive(ClapArgs, Debug)]
struct WatchArgs {
    /// Channel namespace (defaults to [publisher].namespace)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Seconds to keep retrying while the channel does not exist yet
    #[arg(long, default_value_t = 10.0, value_name = "SECS")]
    attach_timeout: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("stereocast failed: {}", e);
        eprintln!("stereocast: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = resolve_config(&args);

    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);
    let config = config?;

    info!(
        "Stereocast v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    match args.command {
        Command::Publish(_) => commands::publish(&config)?,
        Command::Watch(watch) => {
            let namespace = watch
                .namespace
                .unwrap_or_else(|| config.publisher.namespace.clone());
            let attach_timeout = Duration::try_from_secs_f64(watch.attach_timeout)
                .map_err(|e| ConfigError::ValidationError(format!("--attach-timeout: {e}")))?;
            commands::watch(&namespace, &config.receiver, watch.frames, attach_timeout)?;
        }
        Command::List => commands::list(args.json)?,
        Command::Cleanup { namespace } => commands::cleanup(&namespace)?,
    }
    Ok(())
}

/// Load the config file (or defaults) and apply command line overrides.
fn resolve_config(args: &Args) -> Result<StereocastConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => StereocastConfig::load_validated(path)?,
        None => StereocastConfig::with_service_name("stereocast"),
    };

    if let Command::Publish(publish) = &args.command {
        apply_publish_overrides(&mut config, publish);
    }
    config.validate()?;
    Ok(config)
}

fn apply_publish_overrides(config: &mut StereocastConfig, publish: &PublishArgs) {
    if let Some(namespace) = &publish.namespace {
        config.publisher.namespace = namespace.clone();
    }
    if let Some(admission) = publish.admission {
        config.publisher.admission = admission;
    }
    if let Some(width) = publish.width {
        config.camera.width = width;
    }
    if let Some(height) = publish.height {
        config.camera.height = height;
    }
    if let Some(fps) = publish.fps {
        config.camera.fps = fps;
    }
    if publish.no_pace {
        config.camera.pace = false;
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
