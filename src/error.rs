use crate::config::ConfigError;
use crate::mover::MoveError;
use crate::stats::StatsError;
use thiserror::Error;

/// Top-level error for sorter sessions.
///
/// Module errors stay in their own modules and are wrapped here so the
/// binary can report a single type.
#[derive(Error, Debug)]
pub enum SorterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error("Watched directory does not exist or is not a directory: {path}")]
    InvalidWatchDirectory { path: String },

    #[error("Failed to install shutdown handler: {0}")]
    ShutdownHandler(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, SorterError>;
