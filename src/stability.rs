//! Detects when a file has stopped changing.
//!
//! Browsers and download managers write files incrementally. A file is
//! considered finished once its `(size, mtime)` pair has been observed
//! unchanged for a configured number of consecutive polls.
//!
//! [`StabilityTracker`] is the pure state machine; [`StabilityChecker`]
//! drives it against the real filesystem with a fixed poll interval.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, trace};

/// Observable file state used to decide stability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl Snapshot {
    /// Take a snapshot of a regular file. `None` if it is gone or not a file.
    pub fn take(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        Some(Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// What the tracker concluded from the latest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Still changing, or not yet unchanged for long enough.
    Settling { stable_checks: u32 },
    Stable(Snapshot),
    Vanished,
}

/// Counts consecutive identical samples.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    required_stable_checks: u32,
    last: Option<Snapshot>,
    stable_checks: u32,
}

impl StabilityTracker {
    pub fn new(required_stable_checks: u32) -> Self {
        Self {
            required_stable_checks: required_stable_checks.max(1),
            last: None,
            stable_checks: 0,
        }
    }

    /// Feed one sample. `None` means the file could not be found.
    pub fn observe(&mut self, sample: Option<Snapshot>) -> Observation {
        let Some(current) = sample else {
            self.last = None;
            self.stable_checks = 0;
            return Observation::Vanished;
        };

        match self.last {
            Some(previous) if previous == current => self.stable_checks += 1,
            _ => self.stable_checks = 0,
        }
        self.last = Some(current);

        if self.stable_checks >= self.required_stable_checks {
            Observation::Stable(current)
        } else {
            Observation::Settling {
                stable_checks: self.stable_checks,
            }
        }
    }

    pub fn last(&self) -> Option<Snapshot> {
        self.last
    }
}

/// Final result of waiting on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    Stable(Snapshot),
    Vanished,
    TimedOut { last: Snapshot },
    /// The cancel flag was raised mid-wait.
    Cancelled,
}

/// Sleeps are sliced so a raised cancel flag is seen within this bound.
const CANCEL_CHECK: Duration = Duration::from_millis(50);

/// Polls a file until it settles, disappears, or the timeout elapses.
#[derive(Debug, Clone)]
pub struct StabilityChecker {
    poll_interval: Duration,
    required_stable_checks: u32,
    timeout: Duration,
    cancel: Option<Arc<AtomicBool>>,
}

impl StabilityChecker {
    pub fn new(poll_interval: Duration, required_stable_checks: u32, timeout: Duration) -> Self {
        Self {
            poll_interval,
            required_stable_checks,
            timeout,
            cancel: None,
        }
    }

    /// Abort waits as soon as `flag` is set.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Sleep for `duration`, waking early on cancel. False if cancelled.
    fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(CANCEL_CHECK));
        }
    }

    /// Block until `path` is stable.
    ///
    /// The first sample is taken immediately and every further one after
    /// `poll_interval`, so the minimum wait is
    /// `required_stable_checks * poll_interval`.
    pub fn wait_until_stable(&self, path: &Path) -> StabilityOutcome {
        let started = Instant::now();
        let mut tracker = StabilityTracker::new(self.required_stable_checks);

        loop {
            if self.cancelled() {
                return StabilityOutcome::Cancelled;
            }

            match tracker.observe(Snapshot::take(path)) {
                Observation::Stable(snapshot) => {
                    debug!(
                        "{} stable at {} bytes after {:?}",
                        path.display(),
                        snapshot.size,
                        started.elapsed()
                    );
                    return StabilityOutcome::Stable(snapshot);
                }
                Observation::Vanished => return StabilityOutcome::Vanished,
                Observation::Settling { stable_checks } => {
                    trace!(
                        "{} settling ({}/{})",
                        path.display(),
                        stable_checks,
                        self.required_stable_checks
                    );
                }
            }

            if started.elapsed() + self.poll_interval > self.timeout {
                // Settling always records a sample, so `last` is populated.
                return match tracker.last() {
                    Some(last) => StabilityOutcome::TimedOut { last },
                    None => StabilityOutcome::Vanished,
                };
            }

            if !self.pause(self.poll_interval) {
                debug!("Stopped waiting on {}", path.display());
                return StabilityOutcome::Cancelled;
            }
        }
    }

    /// Split `paths` into settled and unsettled with a single poll interval.
    ///
    /// Used for one-shot scans where per-file waiting would be too slow.
    /// Paths that vanish are dropped from both lists.
    pub fn partition_settled(&self, paths: Vec<PathBuf>) -> (Vec<(PathBuf, Snapshot)>, Vec<PathBuf>) {
        let before: Vec<(PathBuf, Option<Snapshot>)> = paths
            .into_iter()
            .map(|path| {
                let snapshot = Snapshot::take(&path);
                (path, snapshot)
            })
            .collect();

        if before.is_empty() {
            return (Vec::new(), Vec::new());
        }

        if !self.pause(self.poll_interval) {
            return (Vec::new(), before.into_iter().map(|(path, _)| path).collect());
        }

        let mut settled = Vec::new();
        let mut unsettled = Vec::new();
        for (path, first) in before {
            match (first, Snapshot::take(&path)) {
                (Some(first), Some(second)) if first == second => settled.push((path, second)),
                (_, Some(_)) => unsettled.push(path),
                (_, None) => {}
            }
        }
        (settled, unsettled)
    }
}
