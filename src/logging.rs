//! Tracing setup: console output plus an append-only log file.
//!
//! `RUST_LOG` takes precedence over the configured level:
//! ```bash
//! RUST_LOG=autosorter=debug autosorter watch
//! ```

use crate::config::LoggingSection;
use crate::error::Result;
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the background log writer alive. Dropping it flushes the file.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: WorkerGuard,
    pub log_file: PathBuf,
}

/// Install the global subscriber.
///
/// `verbose` forces `debug` unless `RUST_LOG` is set. Installing twice is
/// harmless; the first subscriber stays in place.
///
/// # Errors
///
/// Fails if the log directory cannot be created.
pub fn init(settings: &LoggingSection, verbose: bool) -> Result<LoggingGuard> {
    let directory = crate::config::expand_tilde(&settings.directory);
    fs::create_dir_all(&directory)?;

    let level = if verbose { "debug" } else { settings.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::never(&directory, &settings.file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init();

    Ok(LoggingGuard {
        _file: guard,
        log_file: directory.join(&settings.file_name),
    })
}
