//! Run the FlatSat sensor bridge from a JSON configuration file.
//!
//! Listens for the simulator's per-channel float streams, encodes each
//! enabled device's frames and sends them to the configured outputs. Logs a
//! quality summary every `--status-interval` seconds.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bridge::{Bridge, BridgeConfig};
use clap::{Parser, ValueEnum};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "FlatSat hardware-in-the-loop sensor bridge")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log verbosity
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Stop after this many seconds (runs until killed otherwise)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Seconds between status reports
    #[arg(long, default_value = "10")]
    status_interval: f64,
}

fn seconds(value: f64, what: &str) -> Result<Duration> {
    if !(value.is_finite() && value > 0.0) {
        bail!("{what} must be a positive number of seconds, got {value}");
    }
    Ok(Duration::from_secs_f64(value))
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(args.log_level))
        .with_target(false)
        .init();

    let status_interval = seconds(args.status_interval, "--status-interval")?;
    let duration = args.duration.map(|d| seconds(d, "--duration")).transpose()?;

    let config = BridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    let mut bridge = Bridge::new(&config).context("Failed to set up bridge")?;
    bridge.start().context("Failed to start bridge")?;

    for device in bridge.device_names() {
        let addrs = bridge.local_addrs(&device);
        if !addrs.is_empty() {
            info!("{device}: listening on {addrs:?}");
        }
    }

    let started = Instant::now();
    let mut last_report = Instant::now();
    loop {
        thread::sleep(Duration::from_millis(100));
        if duration.is_some_and(|d| started.elapsed() >= d) {
            info!("Run duration reached");
            break;
        }
        if last_report.elapsed() >= status_interval {
            bridge.log_status();
            last_report = Instant::now();
        }
    }

    bridge.log_status();
    if !bridge.shutdown(Duration::from_secs(3)) {
        bail!("Bridge threads did not stop cleanly");
    }
    Ok(())
}
