//! Process-wide tracing setup.
//!
//! Every binary calls [`init_logging`] once before building its pipeline.
//! Log lines go to stdout and are appended to `logs/running_logs.log`.

use crate::errors::{PipelineError, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directory holding the run log.
pub const LOG_DIR: &str = "logs";

/// File name of the run log.
pub const LOG_FILE: &str = "running_logs.log";

/// Environment variable selecting the stdout format (`json` or `text`).
pub const LOG_FORMAT_ENV: &str = "BRAINMRI_LOG_FORMAT";

/// Installs the global subscriber, writing the log file under `logs/`.
pub fn init_logging() -> Result<PathBuf> {
    init_logging_in(LOG_DIR)
}

/// Installs the global subscriber, writing the log file under `log_dir`.
///
/// Returns the log file path. Calling this again after a subscriber is
/// installed is a no-op.
pub fn init_logging_in(log_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir).map_err(|e| PipelineError::io(log_dir, e))?;
    let log_path = log_dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| PipelineError::io(&log_path, e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = json_requested(std::env::var(LOG_FORMAT_ENV).ok().as_deref());

    let json_layer = json.then(|| fmt::layer().json().with_target(true));
    let text_layer = (!json).then(|| fmt::layer().with_target(true));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file));

    // Already initialized elsewhere (tests, repeated calls).
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init();

    Ok(log_path)
}

fn json_requested(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}
