//! Run log setup
//!
//! Every run writes a full DEBUG transcript to its own file. The terminal
//! only receives events selected by `RUST_LOG` (errors by default), since
//! progress is already shown by the reporter.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub const DEFAULT_LOG_DIR: &str = "/var/log/archrig";

/// `<dir>/archrig-YYYYmmdd-HHMMSS.log`
pub fn log_path(dir: &Path, started: DateTime<Local>) -> PathBuf {
    dir.join(format!("archrig-{}.log", started.format("%Y%m%d-%H%M%S")))
}

/// Install the global subscriber, appending to `path`
pub fn init(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::DEBUG);

    let terminal_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"));
    let terminal_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(terminal_layer)
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(())
}
