//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Stdout carries the MCP transport, so every layer here writes to stderr
//! or to a file. Two modes:
//! - **Console** ([`init_console`]): human-readable stderr output only
//! - **File** ([`init_with_file`]): JSON file layer (daily rotation) + stderr

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file prefix inside the logs directory.
const LOG_FILE_PREFIX: &str = "twilio-messaging-mcp.log";

/// Holds the non-blocking writer guard for file logging.
///
/// The [`WorkerGuard`] must be kept alive for the duration of the process.
/// Dropping it flushes pending log entries and closes the file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise stderr-only logging.
///
/// Controlled by `RUST_LOG` (default: `info`). ANSI colours are disabled
/// so that MCP hosts which capture stderr get plain text.
pub fn init_console() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialise logging with an additional JSON file layer.
///
/// Writes JSON logs to `{logs_dir}/twilio-messaging-mcp.log.YYYY-MM-DD` with
/// daily rotation, plus human-readable output on stderr.
///
/// Returns a [`LoggingGuard`] that must be kept alive for log flushing.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_with_file(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(json_layer)
        .with(console_layer)
        .init();

    Ok(LoggingGuard { _guard: guard })
}
