//! autosorter - keep a downloads folder tidy automatically
//!
//! Watches a directory, waits for each new file to stop changing, then moves
//! it into a category folder chosen by its extension. Categories, filters,
//! duplicate handling and date subfolders are configured through TOML.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod destination;
pub mod error;
pub mod filters;
pub mod handler;
pub mod logging;
pub mod mover;
pub mod output;
pub mod stability;
pub mod stats;
pub mod watcher;

pub use classifier::{Classification, Classifier};
pub use config::{CategoryConfig, ConfigError, SorterConfig};
pub use error::{Result, SorterError};
pub use filters::CompiledFilters;
pub use handler::{Disposition, EventHandler, ScanReport, SkipReason};
pub use mover::{DuplicatePolicy, SafeMover};
pub use stats::{SortStats, StatsStore};

pub use cli::{Cli, Command, run_cli};
