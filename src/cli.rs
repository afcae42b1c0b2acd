//! Command-line interface for autosorter.
//!
//! Parses arguments with `clap`, layers CLI flags over the loaded
//! configuration and dispatches to the watch loop or one of the one-shot
//! commands.

use crate::config::SorterConfig;
use crate::error::SorterError;
use crate::handler::{Disposition, EventHandler};
use crate::logging;
use crate::output::OutputFormatter;
use crate::stats::StatsStore;
use crate::watcher::{DirectoryWatcher, install_shutdown_handler};
use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "autosorter",
    version,
    about = "Watch a downloads folder and sort finished files into category folders"
)]
pub struct Cli {
    /// Configuration file (defaults to ./.autosorterrc.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log what would happen without moving anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Watch a directory and sort files as they finish downloading (default)
    Watch {
        /// Directory to watch (defaults to the configured one)
        dir: Option<PathBuf>,
        /// Watch subdirectories too
        #[arg(short, long)]
        recursive: bool,
        /// Sort files already present before watching
        #[arg(long)]
        scan_existing: bool,
    },
    /// Sort the files currently in a directory, then exit
    Sort {
        dir: Option<PathBuf>,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Show where files would be routed
    Classify {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show or reset the persisted counters
    Stats {
        #[arg(long)]
        reset: bool,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the default configuration file
    InitConfig {
        /// Target file (defaults to the user config dir)
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Watch {
            dir: None,
            recursive: false,
            scan_existing: false,
        }
    }
}

/// Entry point used by the binary: loads configuration, installs logging
/// for the long-running commands and dispatches.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.clone().unwrap_or_default();

    if let Command::InitConfig { path, force } = &command {
        return init_config(path.as_deref(), *force);
    }

    let mut config = SorterConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    apply_overrides(&mut config, &command, cli.dry_run);

    let _guard = match command {
        Command::Watch { .. } | Command::Sort { .. } => Some(
            logging::init(&config.logging, cli.verbose).context("Failed to set up logging")?,
        ),
        _ => None,
    };

    execute(command, &config)
}

/// Run `command` against an already loaded configuration.
pub fn execute(command: Command, config: &SorterConfig) -> anyhow::Result<()> {
    match command {
        Command::Watch { .. } => watch(config),
        Command::Sort { .. } => sort(config),
        Command::Classify { files } => classify(config, &files),
        Command::Stats { reset, json } => show_stats(config, reset, json),
        Command::InitConfig { path, force } => init_config(path.as_deref(), force),
    }
}

/// Layer command-line flags over file configuration.
pub fn apply_overrides(config: &mut SorterConfig, command: &Command, dry_run: bool) {
    if dry_run {
        config.policy.dry_run = true;
    }

    match command {
        Command::Watch {
            dir,
            recursive,
            scan_existing,
        } => {
            if let Some(dir) = dir {
                config.watch.directory = dir.clone();
            }
            config.watch.recursive |= *recursive;
            config.watch.scan_existing |= *scan_existing;
        }
        Command::Sort { dir, recursive } => {
            if let Some(dir) = dir {
                config.watch.directory = dir.clone();
            }
            config.watch.recursive |= *recursive;
        }
        _ => {}
    }
}

fn watch(config: &SorterConfig) -> anyhow::Result<()> {
    let mut handler = EventHandler::new(config)?;
    let active = DirectoryWatcher::new(handler.watch_dir(), config.watch.recursive)
        .start()
        .context("Failed to start watching")?;

    handler
        .ensure_destinations()
        .context("Failed to create destination folders")?;

    if handler.is_dry_run() {
        OutputFormatter::dry_run_notice("No files will be moved");
    }

    if config.watch.scan_existing {
        let report = handler.scan_directory(active.directory())?;
        info!(
            "Initial scan: {} routed, {} skipped, {} failed",
            report.routed(),
            report.skipped(),
            report.failed()
        );
    }

    let shutdown = install_shutdown_handler()?;
    active.run(&mut handler, &shutdown)?;
    Ok(())
}

fn sort(config: &SorterConfig) -> anyhow::Result<()> {
    let mut handler = EventHandler::new(config)?.with_progress(true);
    let dir = handler.watch_dir().to_path_buf();
    if !dir.is_dir() {
        return Err(SorterError::InvalidWatchDirectory {
            path: dir.display().to_string(),
        }
        .into());
    }

    OutputFormatter::info(&format!("Sorting contents of: {}", dir.display()));
    if handler.is_dry_run() {
        OutputFormatter::dry_run_notice("No files will be moved");
    }

    handler
        .ensure_destinations()
        .context("Failed to create destination folders")?;
    let report = handler.scan_directory(&dir)?;

    for disposition in &report.dispositions {
        let noise = disposition.skip_reason().is_some_and(|r| r.is_noise());
        if !noise && !matches!(disposition, Disposition::Moved { .. }) {
            OutputFormatter::disposition(disposition);
        }
    }

    if report.routed() == 0 {
        OutputFormatter::info("Nothing to sort.");
    } else {
        OutputFormatter::summary_table(&report.category_counts(), report.routed());
    }

    if report.failed() > 0 {
        OutputFormatter::warning(&format!("{} file(s) could not be moved", report.failed()));
    }
    Ok(())
}

fn classify(config: &SorterConfig, files: &[PathBuf]) -> anyhow::Result<()> {
    let handler = EventHandler::new(config)?;
    for file in files {
        OutputFormatter::disposition(&handler.preview(file));
    }
    Ok(())
}

fn show_stats(config: &SorterConfig, reset: bool, json: bool) -> anyhow::Result<()> {
    let mut store = StatsStore::open(config.stats_path());

    if reset {
        store.reset().context("Failed to reset statistics")?;
        OutputFormatter::success(&format!(
            "Statistics reset ({})",
            store.path().display()
        ));
    }

    if json {
        OutputFormatter::plain(&serde_json::to_string_pretty(store.stats())?);
    } else if !reset {
        OutputFormatter::stats_table(store.stats());
    }
    Ok(())
}

fn init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let target = match path {
        Some(path) => path.to_path_buf(),
        None => SorterConfig::user_config_path()
            .ok_or_else(|| anyhow!("Could not determine the user config directory"))?,
    };

    SorterConfig::write_default(&target, force)?;
    OutputFormatter::success(&format!("Wrote default configuration to {}", target.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_watch() {
        let cli = Cli::try_parse_from(["autosorter"]).unwrap();
        assert_eq!(cli.command.unwrap_or_default(), Command::default());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["autosorter", "sort", "/tmp/dl", "--dry-run", "-v"]).unwrap();
        assert!(cli.dry_run);
        assert!(cli.verbose);
        assert_eq!(
            cli.command,
            Some(Command::Sort {
                dir: Some(PathBuf::from("/tmp/dl")),
                recursive: false
            })
        );
    }

    #[test]
    fn test_classify_requires_files() {
        assert!(Cli::try_parse_from(["autosorter", "classify"]).is_err());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let mut config = SorterConfig::default();
        let command = Command::Watch {
            dir: Some(PathBuf::from("/srv/incoming")),
            recursive: true,
            scan_existing: true,
        };
        apply_overrides(&mut config, &command, true);

        assert_eq!(config.watch.directory, PathBuf::from("/srv/incoming"));
        assert!(config.watch.recursive);
        assert!(config.watch.scan_existing);
        assert!(config.policy.dry_run);
    }

    #[test]
    fn test_overrides_keep_config_values_when_flags_absent() {
        let mut config = SorterConfig::default();
        config.watch.recursive = true;
        apply_overrides(&mut config, &Command::default(), false);

        assert!(config.watch.recursive);
        assert!(!config.policy.dry_run);
        assert_eq!(config.watch.directory, PathBuf::from("~/Downloads"));
    }
}
