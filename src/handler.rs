//! Per-file routing pipeline driven by filesystem events.
//!
//! Every relevant event is handled synchronously, one path at a time:
//! managed-path check, debounce, filters, stability wait, size/age limits,
//! classification, destination resolution and finally the move. The only
//! state kept between events is the debounce map and the stats store.

use crate::classifier::Classifier;
use crate::config::{SorterConfig, expand_tilde};
use crate::destination::DestinationResolver;
use crate::error::Result;
use crate::filters::{CompiledFilters, FilterVerdict};
use crate::mover::{MoveOutcome, MovePlan, MovedFile, SafeMover};
use crate::output::OutputFormatter;
use crate::stability::{Snapshot, StabilityChecker, StabilityOutcome};
use crate::stats::{SortStats, StatsStore};
use indicatif::ProgressBar;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Debounce entries are pruned once the map grows past this size.
const DEBOUNCE_PRUNE_THRESHOLD: usize = 256;

/// Why a file was left where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Inside a destination, log or stats directory.
    InsideDestination,
    NotAFile,
    Debounced,
    Incomplete,
    Filtered,
    Vanished,
    Unstable,
    TooSmall,
    TooYoung,
    UnknownType,
    Duplicate,
    /// Shutdown was requested while waiting for the file to settle.
    Interrupted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InsideDestination => "inside_destination",
            SkipReason::NotAFile => "not_a_file",
            SkipReason::Debounced => "debounced",
            SkipReason::Incomplete => "incomplete",
            SkipReason::Filtered => "filtered",
            SkipReason::Vanished => "vanished",
            SkipReason::Unstable => "unstable",
            SkipReason::TooSmall => "too_small",
            SkipReason::TooYoung => "too_young",
            SkipReason::UnknownType => "unknown_type",
            SkipReason::Duplicate => "duplicate",
            SkipReason::Interrupted => "interrupted",
        }
    }

    /// Event noise that is neither logged above debug nor counted.
    pub fn is_noise(&self) -> bool {
        matches!(
            self,
            SkipReason::InsideDestination
                | SkipReason::NotAFile
                | SkipReason::Debounced
                | SkipReason::Interrupted
        )
    }
}

/// Result of processing one path.
#[derive(Debug, Clone)]
pub enum Disposition {
    Moved {
        category: String,
        moved: MovedFile,
    },
    /// Dry-run result: what would have happened.
    WouldMove {
        category: String,
        source: PathBuf,
        destination: PathBuf,
    },
    Skipped {
        path: PathBuf,
        reason: SkipReason,
    },
    Failed {
        path: PathBuf,
        error: String,
    },
}

impl Disposition {
    fn skipped(path: &Path, reason: SkipReason) -> Self {
        Disposition::Skipped {
            path: path.to_path_buf(),
            reason,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Disposition::Moved { moved, .. } => &moved.source,
            Disposition::WouldMove { source, .. } => source,
            Disposition::Skipped { path, .. } | Disposition::Failed { path, .. } => path,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Disposition::Skipped { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Category for moved or would-be-moved files.
    pub fn category(&self) -> Option<&str> {
        match self {
            Disposition::Moved { category, .. } | Disposition::WouldMove { category, .. } => {
                Some(category)
            }
            _ => None,
        }
    }
}

/// Summary of a one-shot directory pass.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub dispositions: Vec<Disposition>,
}

impl ScanReport {
    /// Files moved (or, in dry-run, that would be moved) per category.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for category in self.dispositions.iter().filter_map(|d| d.category()) {
            *counts.entry(category.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn routed(&self) -> usize {
        self.dispositions
            .iter()
            .filter(|d| d.category().is_some())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.dispositions
            .iter()
            .filter(|d| matches!(d, Disposition::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.dispositions
            .iter()
            .filter(|d| d.skip_reason().is_some_and(|r| !r.is_noise()))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessMode {
    /// Live events: debounced, waits for stability.
    Watch,
    /// One-shot scan: stability was settled in bulk.
    Scan(Snapshot),
}

/// Routes files from the watched directory into category folders.
pub struct EventHandler {
    watch_dir: PathBuf,
    recursive: bool,
    managed_roots: Vec<PathBuf>,
    destinations: Vec<PathBuf>,
    filters: CompiledFilters,
    classifier: Classifier,
    resolver: DestinationResolver,
    mover: SafeMover,
    stability: StabilityChecker,
    stats: StatsStore,
    debounce: Duration,
    last_seen: HashMap<PathBuf, Instant>,
    min_size_bytes: u64,
    min_age: Duration,
    dry_run: bool,
    show_progress: bool,
}

impl EventHandler {
    /// Build a handler from validated configuration.
    ///
    /// # Errors
    ///
    /// Fails if the filter rules do not compile.
    pub fn new(config: &SorterConfig) -> Result<Self> {
        let watch_dir = resolve_path(&config.watch_directory());
        let destinations: Vec<PathBuf> = config
            .destinations()
            .iter()
            .map(|d| resolve_path(d))
            .collect();

        // Destinations containing the watched directory are not managed.
        let mut managed_roots: Vec<PathBuf> = destinations
            .iter()
            .filter(|d| !watch_dir.starts_with(d))
            .cloned()
            .collect();
        for internal in [config.log_directory(), stats_dir(&config.stats_path())] {
            let internal = resolve_path(&internal);
            if !watch_dir.starts_with(&internal) {
                managed_roots.push(internal);
            }
        }

        let stability = &config.stability;
        let policy = &config.policy;

        let classifier = Classifier::new(&config.categories, policy.sniff_unknown);
        debug!(
            "Categories in priority order: {}",
            classifier.category_names().join(", ")
        );

        Ok(Self {
            watch_dir,
            recursive: config.watch.recursive,
            managed_roots,
            destinations,
            filters: CompiledFilters::compile(&config.filters)?,
            classifier,
            resolver: DestinationResolver::new(
                policy.date_folders,
                policy.date_source,
                policy.unknown_destination.clone(),
            ),
            mover: SafeMover::new(policy.duplicates),
            stability: StabilityChecker::new(
                stability.poll_interval(),
                stability.required_stable_checks,
                stability.timeout(),
            ),
            stats: StatsStore::open(config.stats_path()),
            debounce: stability.debounce(),
            last_seen: HashMap::new(),
            min_size_bytes: policy.min_size_bytes,
            min_age: Duration::from_secs(policy.min_age_secs),
            dry_run: policy.dry_run,
            show_progress: false,
        })
    }

    /// Draw a progress bar during directory scans.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Abandon stability waits once `shutdown` is raised.
    pub fn set_shutdown_flag(&mut self, shutdown: Arc<AtomicBool>) {
        self.stability.set_cancel_flag(shutdown);
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn stats(&self) -> &SortStats {
        self.stats.stats()
    }

    /// Create every destination directory up front. No-op in dry-run.
    pub fn ensure_destinations(&mut self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        for dir in &self.destinations {
            fs::create_dir_all(dir)?;
        }
        self.stats.mark_started();
        self.stats.save()?;
        Ok(())
    }

    /// Process every relevant path carried by a notify event.
    pub fn handle_event(&mut self, event: &Event) -> Vec<Disposition> {
        relevant_paths(event)
            .into_iter()
            .map(|path| self.process_path(&path))
            .collect()
    }

    /// Run one path through the full watch pipeline.
    pub fn process_path(&mut self, path: &Path) -> Disposition {
        let disposition = self.evaluate(path, ProcessMode::Watch);
        self.record(&disposition);
        disposition
    }

    /// What would happen to `path` right now, without waiting, moving or
    /// counting anything.
    pub fn preview(&self, path: &Path) -> Disposition {
        if self.is_managed(path) {
            return Disposition::skipped(path, SkipReason::InsideDestination);
        }
        if !path.is_file() {
            return Disposition::skipped(path, SkipReason::NotAFile);
        }
        if let Some(skip) = self.filter(path) {
            return skip;
        }
        match Snapshot::take(path) {
            Some(snapshot) => self.route(path, &snapshot, true),
            None => Disposition::skipped(path, SkipReason::Vanished),
        }
    }

    /// Sort the files already present in `dir` in a single pass.
    ///
    /// Stability is settled for all candidates at once; files still being
    /// written are reported as unstable and left for the watcher.
    pub fn scan_directory(&mut self, dir: &Path) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        let mut candidates = Vec::new();

        for path in self.list_files(dir)? {
            let skip = if self.is_managed(&path) {
                Some(Disposition::skipped(&path, SkipReason::InsideDestination))
            } else {
                self.filter(&path)
            };
            match skip {
                Some(disposition) => {
                    self.record(&disposition);
                    report.dispositions.push(disposition);
                }
                None => candidates.push(path),
            }
        }

        let (settled, unsettled) = self.stability.partition_settled(candidates);

        let progress = if self.show_progress {
            OutputFormatter::create_progress_bar(settled.len() as u64)
        } else {
            ProgressBar::hidden()
        };

        for (path, snapshot) in settled {
            progress.set_message(file_name(&path));
            let disposition = self.evaluate(&path, ProcessMode::Scan(snapshot));
            self.record(&disposition);
            report.dispositions.push(disposition);
            progress.inc(1);
        }
        progress.finish_and_clear();

        for path in unsettled {
            let disposition = Disposition::skipped(&path, SkipReason::Unstable);
            self.record(&disposition);
            report.dispositions.push(disposition);
        }

        Ok(report)
    }

    fn evaluate(&mut self, path: &Path, mode: ProcessMode) -> Disposition {
        if self.is_managed(path) {
            return Disposition::skipped(path, SkipReason::InsideDestination);
        }
        if !path.is_file() {
            return Disposition::skipped(path, SkipReason::NotAFile);
        }

        if mode == ProcessMode::Watch && self.debounced(path) {
            return Disposition::skipped(path, SkipReason::Debounced);
        }

        if let Some(skip) = self.filter(path) {
            return skip;
        }

        let snapshot = match mode {
            ProcessMode::Scan(snapshot) => snapshot,
            ProcessMode::Watch => {
                let outcome = self.stability.wait_until_stable(path);
                // Events that piled up while waiting are debounced from here.
                self.last_seen.insert(path.to_path_buf(), Instant::now());
                match outcome {
                    StabilityOutcome::Stable(snapshot) => snapshot,
                    StabilityOutcome::Vanished => {
                        return Disposition::skipped(path, SkipReason::Vanished);
                    }
                    StabilityOutcome::TimedOut { last } => {
                        debug!("{} still changing at {} bytes", path.display(), last.size);
                        return Disposition::skipped(path, SkipReason::Unstable);
                    }
                    StabilityOutcome::Cancelled => {
                        return Disposition::skipped(path, SkipReason::Interrupted);
                    }
                }
            }
        };

        self.route(path, &snapshot, self.dry_run)
    }

    /// Size and age limits, classification, destination and move.
    fn route(&self, path: &Path, snapshot: &Snapshot, dry_run: bool) -> Disposition {
        if snapshot.size < self.min_size_bytes {
            return Disposition::skipped(path, SkipReason::TooSmall);
        }

        if !self.min_age.is_zero()
            && let Some(modified) = snapshot.modified
        {
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO);
            if age < self.min_age {
                return Disposition::skipped(path, SkipReason::TooYoung);
            }
        }

        let (category, dest_dir) = match self.classifier.classify(path) {
            Some(classification) => {
                let dest = self.resolver.resolve(&classification, snapshot);
                (classification.category, dest)
            }
            None => match self.resolver.resolve_unknown(snapshot) {
                Some(dest) => ("Unknown".to_string(), dest),
                None => return Disposition::skipped(path, SkipReason::UnknownType),
            },
        };

        let plan = match self.mover.plan(path, &dest_dir) {
            Ok(plan) => plan,
            Err(e) => {
                return Disposition::Failed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                };
            }
        };

        if let MovePlan::SkipDuplicate(_) = plan {
            return Disposition::skipped(path, SkipReason::Duplicate);
        }

        if dry_run {
            return Disposition::WouldMove {
                category,
                source: path.to_path_buf(),
                destination: plan.target().to_path_buf(),
            };
        }

        match self.mover.execute(path, &plan) {
            Ok(MoveOutcome::Moved(moved)) => Disposition::Moved { category, moved },
            Ok(MoveOutcome::SkippedDuplicate(_)) => {
                Disposition::skipped(path, SkipReason::Duplicate)
            }
            Err(e) => {
                if e.is_permission_denied() {
                    error!("Permission denied: {}", file_name(path));
                }
                Disposition::Failed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                }
            }
        }
    }

    fn filter(&self, path: &Path) -> Option<Disposition> {
        match self.filters.check(path) {
            FilterVerdict::Include => None,
            FilterVerdict::Incomplete => Some(Disposition::skipped(path, SkipReason::Incomplete)),
            FilterVerdict::Excluded => Some(Disposition::skipped(path, SkipReason::Filtered)),
        }
    }

    fn is_managed(&self, path: &Path) -> bool {
        self.managed_roots.iter().any(|root| path.starts_with(root))
    }

    /// True if `path` was handled within the debounce window. Debounced
    /// events leave the timestamp alone so the window cannot slide.
    fn debounced(&mut self, path: &Path) -> bool {
        let now = Instant::now();

        if self.last_seen.len() > DEBOUNCE_PRUNE_THRESHOLD {
            let window = self.debounce;
            self.last_seen
                .retain(|_, seen| now.duration_since(*seen) < window);
        }

        let recent = self
            .last_seen
            .get(path)
            .is_some_and(|seen| now.duration_since(*seen) < self.debounce);
        if !recent {
            self.last_seen.insert(path.to_path_buf(), now);
        }
        recent
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            for entry in fs::read_dir(&current)?.flatten() {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                let path = entry.path();
                if file_type.is_file() {
                    files.push(path);
                } else if file_type.is_dir() && self.recursive && !self.is_managed(&path) {
                    pending.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Update counters and log the outcome. Dry-run never touches stats.
    fn record(&mut self, disposition: &Disposition) {
        log_disposition(disposition, self.dry_run);

        if self.dry_run {
            return;
        }

        match disposition {
            Disposition::Moved { category, moved } => {
                self.stats.record_move(category, moved.bytes)
            }
            Disposition::Skipped { reason, .. } if !reason.is_noise() => {
                self.stats.record_skip(reason.as_str())
            }
            Disposition::Failed { .. } => self.stats.record_failure(),
            _ => return,
        }

        if let Err(e) = self.stats.save() {
            warn!("Could not save stats: {}", e);
        }
    }
}

/// Paths from `event` that may hold a newly finished file.
///
/// For renames reported with both ends, only the new name matters: that
/// is how a browser turns `file.pdf.crdownload` into `file.pdf`.
pub fn relevant_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any | CreateKind::Other)
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            event.paths.clone()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn log_disposition(disposition: &Disposition, dry_run: bool) {
    match disposition {
        Disposition::Moved { category, moved } => {
            let dest_dir = moved
                .destination
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            info!(
                category = %category,
                copied = moved.copied,
                "Moved: {} ({:.2} KB) -> {} in {:.2}s",
                file_name(&moved.source),
                moved.bytes as f64 / 1024.0,
                dest_dir,
                moved.elapsed.as_secs_f64()
            );
        }
        Disposition::WouldMove {
            source,
            destination,
            ..
        } => {
            info!(
                dry_run,
                "Would move: {} -> {}",
                file_name(source),
                destination.display()
            );
        }
        Disposition::Skipped { path, reason } => match reason {
            SkipReason::Incomplete => {
                warn!("Skipping incomplete file: {}", file_name(path))
            }
            SkipReason::Unstable => {
                warn!("Still downloading, leaving for later: {}", file_name(path))
            }
            SkipReason::UnknownType => warn!("Unknown file type: {}", file_name(path)),
            SkipReason::Duplicate => {
                warn!("Already exists at destination, skipped: {}", file_name(path))
            }
            reason if reason.is_noise() => {
                debug!("Ignoring {} ({})", path.display(), reason.as_str())
            }
            reason => info!("Skipped {} ({})", file_name(path), reason.as_str()),
        },
        Disposition::Failed { path, error } => {
            error!("Error moving {}: {}", file_name(path), error)
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Canonicalize the deepest existing ancestor of `path` and re-attach the
/// rest, so destinations that do not exist yet still compare equal to the
/// paths notify reports once they are created.
fn resolve_path(path: &Path) -> PathBuf {
    let path = expand_tilde(path);
    let mut existing = path.as_path();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |resolved, part| resolved.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            _ => return path,
        }
    }
}

fn stats_dir(stats_path: &Path) -> PathBuf {
    stats_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| stats_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryConfig;
    use crate::mover::DuplicatePolicy;
    use notify::event::{DataChange, RemoveKind};
    use std::io::Write;
    use std::thread;
    use tempfile::TempDir;

    struct Setup {
        _temp: TempDir,
        watch: PathBuf,
        docs: PathBuf,
        pics: PathBuf,
        config: SorterConfig,
    }

    fn setup() -> Setup {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let root = fs::canonicalize(temp.path()).expect("Failed to canonicalize");
        let watch = root.join("Downloads");
        let docs = root.join("Documents");
        let pics = root.join("Pictures");
        fs::create_dir(&watch).expect("Failed to create watch dir");

        let mut config = SorterConfig::default();
        config.watch.directory = watch.clone();
        config.categories = vec![
            CategoryConfig {
                name: "Documents".to_string(),
                destination: docs.clone(),
                extensions: vec!["pdf".to_string(), "txt".to_string()],
            },
            CategoryConfig {
                name: "Pictures".to_string(),
                destination: pics.clone(),
                extensions: vec!["png".to_string()],
            },
        ];
        config.stability.poll_interval_ms = 5;
        config.stability.required_stable_checks = 1;
        config.stability.timeout_secs = 5;
        config.stability.debounce_ms = 60_000;
        config.stats.path = root.join("state").join("stats.json");
        config.logging.directory = root.join("logs");
        config.policy.sniff_unknown = false;

        Setup {
            _temp: temp,
            watch,
            docs,
            pics,
            config,
        }
    }

    fn write(path: &Path, content: &str) {
        fs::write(path, content).expect("Failed to write file");
    }

    fn append(path: &Path, content: &str) {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(path)
            .expect("Failed to open file for append");
        file.write_all(content.as_bytes()).expect("Failed to append");
    }

    #[test]
    fn test_moves_known_file_and_counts_it() {
        let s = setup();
        let file = s.watch.join("report.pdf");
        write(&file, "pdf data");

        let mut handler = EventHandler::new(&s.config).unwrap();
        let disposition = handler.process_path(&file);

        assert_eq!(disposition.category(), Some("Documents"));
        assert!(s.docs.join("report.pdf").exists());
        assert!(!file.exists());
        assert_eq!(handler.stats().files_moved, 1);
        assert_eq!(handler.stats().bytes_moved, 8);
        assert!(s.config.stats.path.exists());
    }

    #[test]
    fn test_second_event_within_window_is_debounced() {
        let s = setup();
        let file = s.watch.join("notes.xyz");
        write(&file, "??");

        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(
            handler.process_path(&file).skip_reason(),
            Some(SkipReason::UnknownType)
        );
        assert_eq!(
            handler.process_path(&file).skip_reason(),
            Some(SkipReason::Debounced)
        );
        // Debounced events are noise and not counted.
        assert_eq!(handler.stats().skipped, 1);
        assert!(file.exists());
    }

    #[test]
    fn test_debounce_window_expires() {
        let mut s = setup();
        s.config.stability.debounce_ms = 0;
        let file = s.watch.join("notes.xyz");
        write(&file, "??");

        let mut handler = EventHandler::new(&s.config).unwrap();
        handler.process_path(&file);
        assert_eq!(
            handler.process_path(&file).skip_reason(),
            Some(SkipReason::UnknownType)
        );
    }

    #[test]
    fn test_incomplete_download_is_skipped() {
        let s = setup();
        let file = s.watch.join("movie.pdf.crdownload");
        write(&file, "partial");

        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(
            handler.process_path(&file).skip_reason(),
            Some(SkipReason::Incomplete)
        );
        assert!(file.exists());
        assert_eq!(handler.stats().skipped_by_reason.get("incomplete"), Some(&1));
    }

    #[test]
    fn test_min_size_and_min_age() {
        let mut s = setup();
        s.config.policy.min_size_bytes = 100;
        let small = s.watch.join("tiny.pdf");
        write(&small, "x");

        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(
            handler.process_path(&small).skip_reason(),
            Some(SkipReason::TooSmall)
        );

        s.config.policy.min_size_bytes = 0;
        s.config.policy.min_age_secs = 3600;
        let fresh = s.watch.join("fresh.pdf");
        write(&fresh, "new");
        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(
            handler.process_path(&fresh).skip_reason(),
            Some(SkipReason::TooYoung)
        );
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let mut s = setup();
        s.config.policy.dry_run = true;
        let file = s.watch.join("photo.png");
        write(&file, "png");

        let mut handler = EventHandler::new(&s.config).unwrap();
        match handler.process_path(&file) {
            Disposition::WouldMove { destination, .. } => {
                assert_eq!(destination, s.pics.join("photo.png"))
            }
            other => panic!("expected WouldMove, got {:?}", other),
        }
        assert!(file.exists());
        assert!(!s.pics.exists());
        assert!(!s.config.stats.path.exists());
    }

    #[test]
    fn test_duplicate_policies() {
        let mut s = setup();
        fs::create_dir(&s.docs).unwrap();
        write(&s.docs.join("cv.pdf"), "old");

        s.config.policy.duplicates = DuplicatePolicy::Skip;
        let file = s.watch.join("cv.pdf");
        write(&file, "new");
        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(
            handler.process_path(&file).skip_reason(),
            Some(SkipReason::Duplicate)
        );
        assert!(file.exists());

        s.config.policy.duplicates = DuplicatePolicy::Rename;
        let mut handler = EventHandler::new(&s.config).unwrap();
        handler.process_path(&file);
        assert_eq!(fs::read_to_string(s.docs.join("cv(1).pdf")).unwrap(), "new");
        assert_eq!(fs::read_to_string(s.docs.join("cv.pdf")).unwrap(), "old");
    }

    #[test]
    fn test_unknown_destination_catches_unknown_types() {
        let mut s = setup();
        let other = s.watch.parent().unwrap().join("Other");
        s.config.policy.unknown_destination = Some(other.clone());
        let file = s.watch.join("setup.exe");
        write(&file, "MZ");

        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(handler.process_path(&file).category(), Some("Unknown"));
        assert!(other.join("setup.exe").exists());
    }

    #[test]
    fn test_paths_inside_destinations_are_ignored() {
        let s = setup();
        fs::create_dir(&s.docs).unwrap();
        let inside = s.docs.join("already.pdf");
        write(&inside, "x");

        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(
            handler.process_path(&inside).skip_reason(),
            Some(SkipReason::InsideDestination)
        );
    }

    #[test]
    fn test_destination_containing_watch_dir_is_not_managed() {
        let mut s = setup();
        // Route into the parent of the watched directory.
        s.config.categories[0].destination = s.watch.parent().unwrap().to_path_buf();
        let file = s.watch.join("a.pdf");
        write(&file, "x");

        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(handler.process_path(&file).category(), Some("Documents"));
    }

    #[test]
    fn test_directories_and_missing_paths_are_noise() {
        let s = setup();
        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(
            handler.process_path(&s.watch).skip_reason(),
            Some(SkipReason::NotAFile)
        );
        assert_eq!(
            handler.process_path(&s.watch.join("gone.pdf")).skip_reason(),
            Some(SkipReason::NotAFile)
        );
        assert_eq!(handler.stats().skipped, 0);
    }

    #[test]
    fn test_preview_does_not_move_or_count() {
        let s = setup();
        let file = s.watch.join("doc.txt");
        write(&file, "hello");

        let handler = EventHandler::new(&s.config).unwrap();
        assert!(matches!(handler.preview(&file), Disposition::WouldMove { .. }));
        assert!(file.exists());
        assert_eq!(handler.stats().files_moved, 0);
    }

    #[test]
    fn test_scan_directory() {
        let s = setup();
        write(&s.watch.join("a.pdf"), "a");
        write(&s.watch.join("b.png"), "b");
        write(&s.watch.join("c.part"), "c");
        write(&s.watch.join("d.zzz"), "d");
        fs::create_dir(s.watch.join("sub")).unwrap();
        write(&s.watch.join("sub").join("e.pdf"), "e");

        let mut handler = EventHandler::new(&s.config).unwrap();
        let report = handler.scan_directory(&s.watch.clone()).unwrap();

        assert_eq!(report.routed(), 2);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.category_counts().get("Documents"), Some(&1));
        assert!(s.docs.join("a.pdf").exists());
        assert!(s.pics.join("b.png").exists());
        // Not recursive by default.
        assert!(s.watch.join("sub").join("e.pdf").exists());
    }

    #[test]
    fn test_scan_directory_recursive() {
        let mut s = setup();
        s.config.watch.recursive = true;
        fs::create_dir(s.watch.join("sub")).unwrap();
        write(&s.watch.join("sub").join("e.pdf"), "e");

        let mut handler = EventHandler::new(&s.config).unwrap();
        let report = handler.scan_directory(&s.watch.clone()).unwrap();
        assert_eq!(report.routed(), 1);
        assert!(s.docs.join("e.pdf").exists());
    }

    #[test]
    fn test_steady_events_do_not_extend_debounce_window() {
        let mut s = setup();
        s.config.stability.debounce_ms = 200;
        // Every wait times out, so each handled event is reported unstable.
        s.config.stability.timeout_secs = 0;
        let file = s.watch.join("stream.pdf");
        write(&file, "0");

        let mut handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(
            handler.process_path(&file).skip_reason(),
            Some(SkipReason::Unstable)
        );

        let mut handled_again = 0;
        for _ in 0..20 {
            thread::sleep(Duration::from_millis(100));
            append(&file, "1");
            match handler.process_path(&file).skip_reason() {
                Some(SkipReason::Debounced) => {}
                Some(SkipReason::Unstable) => handled_again += 1,
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert!(handled_again >= 3, "handled again only {} times", handled_again);
        assert!(file.exists());
    }

    #[test]
    fn test_shutdown_flag_interrupts_stability_wait() {
        let mut s = setup();
        s.config.stability.poll_interval_ms = 100;
        s.config.stability.required_stable_checks = 1000;
        s.config.stability.timeout_secs = 60;
        let file = s.watch.join("huge.pdf");
        write(&file, "x");

        let shutdown = Arc::new(AtomicBool::new(true));
        let mut handler = EventHandler::new(&s.config).unwrap();
        handler.set_shutdown_flag(Arc::clone(&shutdown));

        let started = Instant::now();
        assert_eq!(
            handler.process_path(&file).skip_reason(),
            Some(SkipReason::Interrupted)
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(file.exists());
        assert_eq!(handler.stats().skipped, 0);
    }

    #[test]
    fn test_preview_ignores_destination_contents() {
        let s = setup();
        fs::create_dir(&s.docs).unwrap();
        let inside = s.docs.join("filed.pdf");
        write(&inside, "x");

        let handler = EventHandler::new(&s.config).unwrap();
        assert_eq!(
            handler.preview(&inside).skip_reason(),
            Some(SkipReason::InsideDestination)
        );
    }

    #[test]
    fn test_scan_directory_leaves_growing_file_in_place() {
        let mut s = setup();
        s.config.stability.poll_interval_ms = 300;
        let growing = s.watch.join("big.pdf");
        let done = s.watch.join("small.pdf");
        write(&growing, "part");
        write(&done, "done");

        let writer_path = growing.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            append(&writer_path, "more");
        });

        let mut handler = EventHandler::new(&s.config).unwrap();
        let report = handler.scan_directory(&s.watch.clone()).unwrap();
        writer.join().expect("writer thread panicked");

        let growing_reason = report
            .dispositions
            .iter()
            .find(|d| d.path() == growing.as_path())
            .and_then(|d| d.skip_reason());
        assert_eq!(growing_reason, Some(SkipReason::Unstable));
        assert!(growing.exists());
        assert!(!s.docs.join("big.pdf").exists());
        assert!(s.docs.join("small.pdf").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_destination_behind_symlink_is_managed() {
        let mut s = setup();
        let root = s.watch.parent().unwrap().to_path_buf();
        let link = root.join("link");
        std::os::unix::fs::symlink(&root, &link).unwrap();
        s.config.watch.recursive = true;
        s.config.policy.unknown_destination = Some(link.join("Downloads").join("Other"));

        let mut handler = EventHandler::new(&s.config).unwrap();

        let other = s.watch.join("Other");
        fs::create_dir(&other).unwrap();
        let stray = other.join("stray.xyz");
        write(&stray, "?");

        assert_eq!(
            handler.process_path(&stray).skip_reason(),
            Some(SkipReason::InsideDestination)
        );
        assert!(stray.exists());
    }

    #[test]
    fn test_resolve_path_keeps_missing_tail() {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let root = fs::canonicalize(temp.path()).unwrap();
        let nested = root.join("a").join("b");
        assert_eq!(resolve_path(&nested), nested);

        fs::create_dir(root.join("a")).unwrap();
        let dotted = root.join("a").join(".").join("b");
        assert_eq!(resolve_path(&dotted), nested);
    }

    #[test]
    fn test_relevant_paths() {
        let a = PathBuf::from("/dl/a.pdf.crdownload");
        let b = PathBuf::from("/dl/a.pdf");

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(b.clone());
        assert_eq!(relevant_paths(&created), vec![b.clone()]);

        let written = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(b.clone());
        assert_eq!(relevant_paths(&written), vec![b.clone()]);

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(a.clone())
            .add_path(b.clone());
        assert_eq!(relevant_paths(&renamed), vec![b.clone()]);

        let renamed_from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(a.clone());
        assert!(relevant_paths(&renamed_from).is_empty());

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(b.clone());
        assert!(relevant_paths(&removed).is_empty());

        let folder = Event::new(EventKind::Create(CreateKind::Folder)).add_path(b);
        assert!(relevant_paths(&folder).is_empty());
    }

    #[test]
    fn test_handle_event_routes_rename_target() {
        let s = setup();
        let partial = s.watch.join("paper.pdf.crdownload");
        let finished = s.watch.join("paper.pdf");
        write(&finished, "done");

        let mut handler = EventHandler::new(&s.config).unwrap();
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(partial)
            .add_path(finished);
        let dispositions = handler.handle_event(&event);

        assert_eq!(dispositions.len(), 1);
        assert_eq!(dispositions[0].category(), Some("Documents"));
        assert!(s.docs.join("paper.pdf").exists());
    }
}
