//! Persistent sorting statistics.
//!
//! A flat JSON document of counters, rewritten after every recorded event.
//! Writes go to a sibling temp file first and are renamed into place so a
//! crash mid-write never leaves a truncated file behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Failed to write stats file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize stats: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Counters persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortStats {
    pub files_moved: u64,
    pub bytes_moved: u64,
    pub skipped: u64,
    pub failed: u64,
    pub by_category: BTreeMap<String, u64>,
    pub skipped_by_reason: BTreeMap<String, u64>,
    pub first_started: Option<DateTime<Utc>>,
    pub last_moved: Option<DateTime<Utc>>,
}

/// Owns the stats file and its in-memory copy.
#[derive(Debug)]
pub struct StatsStore {
    path: PathBuf,
    stats: SortStats,
}

impl StatsStore {
    /// Open the stats file at `path`.
    ///
    /// A missing file yields zeroed counters. A file that cannot be parsed is
    /// copied aside with a `.corrupt` extension and counting restarts from
    /// zero.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stats = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(stats) => stats,
                Err(e) => {
                    let backup = path.with_extension("json.corrupt");
                    warn!(
                        "Stats file {} is corrupt ({}), starting fresh; old copy kept at {}",
                        path.display(),
                        e,
                        backup.display()
                    );
                    if let Err(e) = fs::copy(&path, &backup) {
                        warn!("Could not back up corrupt stats file: {}", e);
                    }
                    SortStats::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SortStats::default(),
            Err(e) => {
                warn!("Could not read stats file {}: {}", path.display(), e);
                SortStats::default()
            }
        };

        Self { path, stats }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> &SortStats {
        &self.stats
    }

    /// Stamp the first start time if this is the first session ever.
    pub fn mark_started(&mut self) {
        if self.stats.first_started.is_none() {
            self.stats.first_started = Some(Utc::now());
        }
    }

    pub fn record_move(&mut self, category: &str, bytes: u64) {
        self.stats.files_moved += 1;
        self.stats.bytes_moved += bytes;
        *self
            .stats
            .by_category
            .entry(category.to_string())
            .or_insert(0) += 1;
        self.stats.last_moved = Some(Utc::now());
    }

    pub fn record_skip(&mut self, reason: &str) {
        self.stats.skipped += 1;
        *self
            .stats
            .skipped_by_reason
            .entry(reason.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_failure(&mut self) {
        self.stats.failed += 1;
    }

    /// Zero every counter and persist.
    pub fn reset(&mut self) -> Result<(), StatsError> {
        self.stats = SortStats::default();
        self.save()
    }

    /// Persist the counters atomically.
    pub fn save(&self) -> Result<(), StatsError> {
        let write_err = |e: std::io::Error| StatsError::Write {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(&self.stats)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(write_err)?;
        fs::rename(&tmp_path, &self.path).map_err(write_err)?;

        debug!("Stats saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_file_starts_at_zero() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = StatsStore::open(temp_dir.path().join("stats.json"));
        assert_eq!(store.stats(), &SortStats::default());
    }

    #[test]
    fn test_counters_persist_across_open() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested").join("stats.json");

        let mut store = StatsStore::open(&path);
        store.mark_started();
        store.record_move("Documents", 2048);
        store.record_move("Documents", 1024);
        store.record_move("Pictures", 10);
        store.record_skip("unknown_type");
        store.record_failure();
        store.save().expect("Failed to save stats");

        let reopened = StatsStore::open(&path);
        let stats = reopened.stats();
        assert_eq!(stats.files_moved, 3);
        assert_eq!(stats.bytes_moved, 3082);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.by_category.get("Documents"), Some(&2));
        assert_eq!(stats.by_category.get("Pictures"), Some(&1));
        assert_eq!(stats.skipped_by_reason.get("unknown_type"), Some(&1));
        assert!(stats.first_started.is_some());
        assert!(stats.last_moved.is_some());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_mark_started_keeps_first_timestamp() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut store = StatsStore::open(temp_dir.path().join("stats.json"));
        store.mark_started();
        let first = store.stats().first_started;
        store.mark_started();
        assert_eq!(store.stats().first_started, first);
    }

    #[test]
    fn test_corrupt_file_is_backed_up_and_reset() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("stats.json");
        fs::write(&path, "{ not json").expect("Failed to write corrupt stats");

        let store = StatsStore::open(&path);
        assert_eq!(store.stats().files_moved, 0);
        assert!(temp_dir.path().join("stats.json.corrupt").exists());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("stats.json");
        fs::write(&path, r#"{ "files_moved": 7 }"#).expect("Failed to write stats");

        let store = StatsStore::open(&path);
        assert_eq!(store.stats().files_moved, 7);
        assert!(store.stats().by_category.is_empty());
    }

    #[test]
    fn test_reset_zeroes_and_saves() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("stats.json");
        let mut store = StatsStore::open(&path);
        store.record_move("Music", 5);
        store.save().expect("Failed to save stats");

        store.reset().expect("Failed to reset stats");
        assert_eq!(StatsStore::open(&path).stats(), &SortStats::default());
    }
}
