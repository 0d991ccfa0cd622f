//! Process-wide tracing setup for the binary.
//!
//! Console output follows `RUST_LOG` (default `subscriber_enrich=info`);
//! a plain-text copy at DEBUG goes to `<log_dir>/extraction_<timestamp>.log`.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_CONSOLE_FILTER: &str = "subscriber_enrich=info";
const FILE_FILTER: &str = "subscriber_enrich=debug";

/// Path of the log file for a run starting now.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!(
        "extraction_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Install the global subscriber. Returns the log file path.
pub fn init(log_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_CONSOLE_FILTER.into());

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new(FILE_FILTER)),
        )
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(path)
}
