//! Tracing subscriber setup.
//!
//! Console output always; a plain-text log file as well when a log
//! directory is configured.

use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Path of the log file for one command invocation.
pub fn log_file_path(dir: &Path, command: &str, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}_{}.log", command, now.format("%Y%m%d_%H%M%S")))
}

/// Installs the global subscriber.
///
/// Filter priority: `RUST_LOG` > `level` > `info`. Returns the log file
/// path when one was opened.
pub fn init_logging(
    level: &str,
    log_dir: Option<&Path>,
    command: &str,
) -> anyhow::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = log_file_path(dir, command, Local::now());
            let file = File::create(&path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    Ok(path)
}
