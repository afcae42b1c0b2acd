//! Terminal output for the CLI commands.
//!
//! Long-running watch output goes through `tracing`; this module covers the
//! one-shot commands: scan summaries, classification previews and stats.

use crate::handler::{Disposition, SkipReason};
use crate::stats::SortStats;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Consistent styling for CLI output.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use autosorter::output::OutputFormatter;
    /// OutputFormatter::success("Default configuration written");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Progress bar for a directory scan of `total` files.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints one line describing what happened to a file.
    pub fn disposition(disposition: &Disposition) {
        let name = disposition.path().display();
        match disposition {
            Disposition::Moved { category, moved } => Self::success(&format!(
                "{} -> {} [{}]",
                name,
                moved.destination.display(),
                category
            )),
            Disposition::WouldMove {
                category,
                destination,
                ..
            } => Self::dry_run_notice(&format!(
                "{} -> {} [{}]",
                name,
                destination.display(),
                category
            )),
            Disposition::Skipped { reason, .. } => {
                Self::warning(&format!("{}: {}", name, describe_skip(*reason)))
            }
            Disposition::Failed { error, .. } => Self::error(&format!("{}: {}", name, error)),
        }
    }

    /// Prints a table of routed files per category.
    ///
    /// ```no_run
    /// use autosorter::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Documents".to_string(), 15);
    /// counts.insert("Pictures".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let width = category_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count as u64, "file"),
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files as u64, "file"),
            width = width
        );
    }

    /// Prints the persisted counters.
    pub fn stats_table(stats: &SortStats) {
        Self::header("STATISTICS");

        println!("{:<16} {}", "Files moved", stats.files_moved.to_string().green());
        println!("{:<16} {}", "Data moved", format_bytes(stats.bytes_moved));
        println!("{:<16} {}", "Skipped", stats.skipped.to_string().yellow());
        println!("{:<16} {}", "Failed", stats.failed.to_string().red());

        if let Some(started) = stats.first_started {
            println!("{:<16} {}", "Sorting since", started.format("%Y-%m-%d %H:%M"));
        }
        if let Some(last) = stats.last_moved {
            println!("{:<16} {}", "Last move", last.format("%Y-%m-%d %H:%M"));
        }

        if !stats.by_category.is_empty() {
            Self::header("By category");
            for (category, count) in &stats.by_category {
                println!("  {:<14} {}", category, count);
            }
        }

        if !stats.skipped_by_reason.is_empty() {
            Self::header("Skipped by reason");
            for (reason, count) in &stats.skipped_by_reason {
                println!("  {:<14} {}", reason, count);
            }
        }
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn describe_skip(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::InsideDestination => "inside a destination folder",
        SkipReason::NotAFile => "not a regular file",
        SkipReason::Debounced => "handled moments ago",
        SkipReason::Incomplete => "download still in progress",
        SkipReason::Filtered => "excluded by filters",
        SkipReason::Vanished => "disappeared",
        SkipReason::Unstable => "still being written",
        SkipReason::TooSmall => "below minimum size",
        SkipReason::TooYoung => "below minimum age",
        SkipReason::UnknownType => "unknown file type",
        SkipReason::Duplicate => "already exists at destination",
        SkipReason::Interrupted => "interrupted by shutdown",
    }
}

fn plural(count: u64, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

/// Human-readable byte count, binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
