//! Resolves the directory a classified file should land in.

use crate::classifier::Classification;
use crate::config::expand_tilde;
use crate::stability::Snapshot;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional date subfolders below a category destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateLayout {
    #[default]
    None,
    /// `2026/`
    Year,
    /// `2026/10/`
    YearMonth,
    /// `2026/10/16/`
    YearMonthDay,
}

impl DateLayout {
    fn subfolder(&self, when: DateTime<Local>) -> Option<String> {
        match self {
            DateLayout::None => None,
            DateLayout::Year => Some(when.format("%Y").to_string()),
            DateLayout::YearMonth => Some(when.format("%Y/%m").to_string()),
            DateLayout::YearMonthDay => Some(when.format("%Y/%m/%d").to_string()),
        }
    }
}

/// Which timestamp drives date subfolders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    /// File modification time, falling back to now when unavailable.
    #[default]
    Modified,
    Now,
}

#[derive(Debug, Clone)]
pub struct DestinationResolver {
    layout: DateLayout,
    source: DateSource,
    unknown_destination: Option<PathBuf>,
}

impl DestinationResolver {
    pub fn new(layout: DateLayout, source: DateSource, unknown_destination: Option<PathBuf>) -> Self {
        Self {
            layout,
            source,
            unknown_destination: unknown_destination.map(|p| expand_tilde(&p)),
        }
    }

    /// Destination directory for a classified file.
    pub fn resolve(&self, classification: &Classification, snapshot: &Snapshot) -> PathBuf {
        self.with_date(&expand_tilde(&classification.destination), snapshot)
    }

    /// Destination for files of unknown type, if one is configured.
    pub fn resolve_unknown(&self, snapshot: &Snapshot) -> Option<PathBuf> {
        self.unknown_destination
            .as_deref()
            .map(|base| self.with_date(base, snapshot))
    }

    fn with_date(&self, base: &Path, snapshot: &Snapshot) -> PathBuf {
        let when = match (self.source, snapshot.modified) {
            (DateSource::Modified, Some(modified)) => DateTime::<Local>::from(modified),
            _ => Local::now(),
        };

        match self.layout.subfolder(when) {
            Some(sub) => base.join(sub),
            None => base.to_path_buf(),
        }
    }
}
