//! Tracing subscriber setup.
//!
//! Console output goes to stderr so that stdout stays free for worker JSON
//! lines. A second layer writes a daily-rolling log file.

use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub use tracing_appender::non_blocking::WorkerGuard;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "ENGINEKIT_LOG";

/// Prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "enginekit.log";

/// Log directory below the data directory.
pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Filter from `ENGINEKIT_LOG`, then `RUST_LOG`, then `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn local_timer() -> OffsetTime<Rfc3339> {
    // The local offset cannot always be determined once threads exist.
    OffsetTime::local_rfc_3339().unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the program; dropping it
/// flushes and stops the file writer. Calling this twice leaves the first
/// subscriber in place.
pub fn init_logging(log_dir: &Path, verbose: bool) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(local_timer());

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_timer(local_timer());

    let _ = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}
