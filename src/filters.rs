//! File inclusion rules applied before any file is waited on or moved.
//!
//! Rules come from the `[filters]` section of the configuration and are
//! compiled once per session.

use crate::config::{ConfigError, FilterRules};
use glob::Pattern;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// Outcome of running a path through the compiled rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Include,
    /// Partial download (e.g. `.crdownload`, `.part`).
    Incomplete,
    Excluded,
}

/// Compiled, optimized filter structures for efficient file matching.
pub struct CompiledFilters {
    enable_hidden_files: bool,
    incomplete_suffixes: Vec<String>,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Compile filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex patterns are invalid.
    pub fn compile(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            incomplete_suffixes: rules
                .incomplete_suffixes
                .iter()
                .map(|s| format!(".{}", s.trim_start_matches('.').to_lowercase()))
                .collect(),
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Classify a path against the rules.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Incomplete-download suffix
    /// 3. Hidden file filter
    /// 4. Exact filename match
    /// 5. File extension match
    /// 6. Glob pattern match
    /// 7. Regex pattern match on the file name
    pub fn check(&self, file_path: &Path) -> FilterVerdict {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.matches_any(&self.include_patterns, file_path) {
            return FilterVerdict::Include;
        }

        if self.is_incomplete(&file_name) {
            return FilterVerdict::Incomplete;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return FilterVerdict::Excluded;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return FilterVerdict::Excluded;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return FilterVerdict::Excluded;
            }
        }

        if self.matches_any(&self.exclude_patterns, file_path) {
            return FilterVerdict::Excluded;
        }

        if self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
        {
            return FilterVerdict::Excluded;
        }

        FilterVerdict::Include
    }

    pub fn should_include(&self, file_path: &Path) -> bool {
        self.check(file_path) == FilterVerdict::Include
    }

    fn is_incomplete(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.incomplete_suffixes
            .iter()
            .any(|suffix| lower.ends_with(suffix.as_str()))
    }

    fn matches_any(&self, patterns: &[Pattern], file_path: &Path) -> bool {
        patterns.iter().any(|pattern| pattern.matches_path(file_path))
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}
