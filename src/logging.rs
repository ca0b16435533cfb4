//! Tracing subscriber setup for the binary.
//!
//! Logs go to stderr and, when a log directory can be prepared, to a daily
//! rolling plain-text file. The library never installs a subscriber itself.

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_FILE_NAME: &str = "file_sorter.log";

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing_subscriber::util::TryInitError),
}

/// Builds the level filter: `RUST_LOG` wins, else `debug` when verbose, else `info`.
pub fn build_env_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the global subscriber.
///
/// Returns the file writer's guard when file logging is active; it must be
/// kept alive until exit or buffered lines are lost.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, LoggingError> {
    let stderr_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
            let (writer, guard) =
                tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_NAME));
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_env_filter(verbose))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    if let Some(dir) = log_dir {
        tracing::debug!(log_dir = %dir.display(), "File logging enabled");
    }
    Ok(guard)
}
