//! Sorter configuration.
//!
//! Configuration is stored in TOML. Every section is optional and falls back
//! to defaults that mirror a typical `~/Downloads` setup:
//!
//! ```toml
//! [watch]
//! directory = "~/Downloads"
//! recursive = false
//!
//! [policy]
//! duplicates = "rename"
//! date_folders = "year_month"
//! min_size_bytes = 1
//!
//! [stability]
//! poll_interval_ms = 1000
//! required_stable_checks = 2
//!
//! [[categories]]
//! name = "Documents"
//! destination = "~/Documents"
//! extensions = ["pdf", "docx", "txt"]
//!
//! [filters]
//! incomplete_suffixes = ["crdownload", "part", "tmp"]
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! ```

use crate::destination::{DateLayout, DateSource};
use crate::mover::DuplicatePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".autosorterrc.toml";

/// Errors that can occur while loading, validating or writing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Configuration file already exists: {} (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),

    #[error("IO error on configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML in {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("Could not serialize configuration: {0}")]
    Serialize(String),
}

/// Complete sorter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SorterConfig {
    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub stability: StabilitySection,

    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub stats: StatsSection,

    #[serde(default)]
    pub filters: FilterRules,

    /// Ordered category table. When an extension appears in several
    /// categories the first one listed wins.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryConfig>,
}

/// Which directory is watched and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WatchSection {
    pub directory: PathBuf,
    pub recursive: bool,
    /// Sort files already sitting in the directory when watching starts.
    pub scan_existing: bool,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("~/Downloads"),
            recursive: false,
            scan_existing: false,
        }
    }
}

/// Routing policies applied to every file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PolicySection {
    pub duplicates: DuplicatePolicy,
    pub date_folders: DateLayout,
    pub date_source: DateSource,
    pub min_size_bytes: u64,
    pub min_age_secs: u64,
    pub dry_run: bool,
    /// Inspect file headers when the extension is missing or unknown.
    pub sniff_unknown: bool,
    /// Where files of unknown type go. Unset means they are left alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_destination: Option<PathBuf>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::Rename,
            date_folders: DateLayout::None,
            date_source: DateSource::Modified,
            min_size_bytes: 0,
            min_age_secs: 0,
            dry_run: false,
            sniff_unknown: true,
            unknown_destination: None,
        }
    }
}

/// Timing of the stability detector and the event debouncer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StabilitySection {
    pub poll_interval_ms: u64,
    pub required_stable_checks: u32,
    pub timeout_secs: u64,
    pub debounce_ms: u64,
}

impl Default for StabilitySection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            required_stable_checks: 2,
            timeout_secs: 600,
            debounce_ms: 1500,
        }
    }
}

impl StabilitySection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingSection {
    pub directory: PathBuf,
    pub file_name: String,
    /// Default level when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("~/.Script_Logs"),
            file_name: "download_sorter.log".to_string(),
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StatsSection {
    pub path: PathBuf,
}

impl Default for StatsSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.config/autosorter/stats.json"),
        }
    }
}

/// One routing category: a name, a destination folder and its extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryConfig {
    pub name: String,
    pub destination: PathBuf,
    pub extensions: Vec<String>,
}

impl CategoryConfig {
    pub fn new(name: &str, destination: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            destination: PathBuf::from(destination),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig::new(
            "Documents",
            "~/Documents",
            &[
                "pdf", "docx", "doc", "txt", "md", "rtf", "odt", "xlsx", "xls", "csv", "ods",
                "pptx", "ppt", "odp",
            ],
        ),
        CategoryConfig::new(
            "Pictures",
            "~/Pictures",
            &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "heic", "tiff"],
        ),
        CategoryConfig::new(
            "Videos",
            "~/Videos",
            &["mp4", "mkv", "avi", "mov", "webm", "wmv", "flv"],
        ),
        CategoryConfig::new(
            "Music",
            "~/Music",
            &["mp3", "wav", "flac", "ogg", "m4a", "aac"],
        ),
    ]
}

/// Hidden-file, exclusion and inclusion rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterRules {
    /// Whether to sort hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Suffixes browsers and download managers use for partial files.
    #[serde(default = "default_incomplete_suffixes")]
    pub incomplete_suffixes: Vec<String>,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Whitelist, overrides every other rule.
    #[serde(default)]
    pub include: IncludeRules,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: false,
            incomplete_suffixes: default_incomplete_suffixes(),
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

fn default_incomplete_suffixes() -> Vec<String> {
    ["crdownload", "part", "tmp", "download", "partial"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExcludeRules {
    /// Exact filenames to leave alone (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the full path.
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            watch: WatchSection::default(),
            policy: PolicySection::default(),
            stability: StabilitySection::default(),
            logging: LoggingSection::default(),
            stats: StatsSection::default(),
            filters: FilterRules::default(),
            categories: default_categories(),
        }
    }
}

impl SorterConfig {
    /// Load configuration, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.autosorterrc.toml` in the current directory
    /// 3. Look for `autosorter/config.toml` in the user config directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly provided file cannot be read, or if
    /// any file found fails to parse or validate.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            return Self::load_from_file(&user_config);
        }

        let mut config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/autosorter/config.toml`, if a config dir is known.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("autosorter").join("config.toml"))
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render the default configuration as TOML.
    pub fn default_toml() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Write the default configuration to `path`, creating parent folders.
    pub fn write_default(path: &Path, force: bool) -> Result<(), ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }

        let io_err = |e: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        fs::write(path, Self::default_toml()?).map_err(io_err)
    }

    /// Check invariants and normalize extensions (lowercase, no leading dot).
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one category is required".to_string(),
            ));
        }

        for category in &mut self.categories {
            if category.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "category names must not be empty".to_string(),
                ));
            }
            if category.destination.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "category '{}' has no destination",
                    category.name
                )));
            }

            let mut normalized: Vec<String> = Vec::with_capacity(category.extensions.len());
            for ext in &category.extensions {
                let ext = normalize_extension(ext);
                if !ext.is_empty() && !normalized.contains(&ext) {
                    normalized.push(ext);
                }
            }
            if normalized.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "category '{}' lists no extensions",
                    category.name
                )));
            }
            category.extensions = normalized;
        }

        if self.stability.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "stability.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.stability.required_stable_checks == 0 {
            return Err(ConfigError::Invalid(
                "stability.required_stable_checks must be at least 1".to_string(),
            ));
        }
        let settle_ms = self
            .stability
            .poll_interval_ms
            .saturating_mul(u64::from(self.stability.required_stable_checks));
        if self.stability.timeout_secs.saturating_mul(1000) < settle_ms.max(1) {
            return Err(ConfigError::Invalid(format!(
                "stability.timeout_secs must cover at least {} ms of polling",
                settle_ms
            )));
        }

        self.filters.incomplete_suffixes = self
            .filters
            .incomplete_suffixes
            .iter()
            .map(|s| normalize_extension(s))
            .filter(|s| !s.is_empty())
            .collect();

        Ok(())
    }

    /// The watched directory with `~` expanded.
    pub fn watch_directory(&self) -> PathBuf {
        expand_tilde(&self.watch.directory)
    }

    /// Every destination directory, `~` expanded, including the unknown-type
    /// destination when one is configured.
    pub fn destinations(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .categories
            .iter()
            .map(|c| expand_tilde(&c.destination))
            .collect();
        if let Some(unknown) = &self.policy.unknown_destination {
            dirs.push(expand_tilde(unknown));
        }
        dirs
    }

    pub fn stats_path(&self) -> PathBuf {
        expand_tilde(&self.stats.path)
    }

    pub fn log_directory(&self) -> PathBuf {
        expand_tilde(&self.logging.directory)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Expand a leading `~` to the home directory. Other paths pass through.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
