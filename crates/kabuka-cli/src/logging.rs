//! Subscriber setup: stderr always, plus a daily rolling file when a log
//! directory is configured. The level filter comes from `KABUKA_LOG` and
//! defaults to `info`.

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::CliError;

pub const LOG_ENV: &str = "KABUKA_LOG";
pub const LOG_FILE_PREFIX: &str = "application.log";

/// Flushes the file writer when dropped; hold it for the whole run.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init(log_dir: Option<&Path>) -> Result<LogGuard, CliError> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .build(dir)
                .map_err(|error| CliError::Logging(error.to_string()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| CliError::Logging(error.to_string()))?;

    Ok(LogGuard { _file: guard })
}
