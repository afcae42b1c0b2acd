/// Moves files into destination folders without clobbering existing ones.
///
/// Name conflicts are resolved according to a [`DuplicatePolicy`]. The
/// default renames the incoming file with a counter: `report.pdf`,
/// `report(1).pdf`, `report(2).pdf`, and so on.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// What to do when the destination already holds a file with the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Append `(n)` to the stem until the name is free.
    #[default]
    Rename,
    /// Leave the incoming file where it is.
    Skip,
    /// Replace the existing file.
    Overwrite,
}

/// Errors that can occur while moving a file.
#[derive(Error, Debug)]
pub enum MoveError {
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot move {}: path has no file name", .0.display())]
    NoFileName(PathBuf),

    #[error("Cannot read source file {}: {source}", path.display())]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl MoveError {
    pub fn is_permission_denied(&self) -> bool {
        let source = match self {
            MoveError::CreateDir { source, .. }
            | MoveError::Move { source, .. }
            | MoveError::Source { source, .. } => source,
            MoveError::NoFileName(_) => return false,
        };
        source.kind() == ErrorKind::PermissionDenied
    }
}

pub type MoveResult<T> = Result<T, MoveError>;

/// The decision for one file, computed before anything is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovePlan {
    /// Move to a free path.
    Move(PathBuf),
    /// Move over an existing file.
    Replace(PathBuf),
    /// A file with this name already exists and the policy says skip.
    SkipDuplicate(PathBuf),
}

impl MovePlan {
    pub fn target(&self) -> &Path {
        match self {
            MovePlan::Move(p) | MovePlan::Replace(p) | MovePlan::SkipDuplicate(p) => p,
        }
    }
}

/// A completed move.
#[derive(Debug, Clone)]
pub struct MovedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub bytes: u64,
    pub elapsed: Duration,
    /// Whether the move had to fall back to copy + delete.
    pub copied: bool,
}

#[derive(Debug, Clone)]
pub enum MoveOutcome {
    Moved(MovedFile),
    SkippedDuplicate(PathBuf),
}

#[derive(Debug, Clone, Copy)]
pub struct SafeMover {
    policy: DuplicatePolicy,
}

impl SafeMover {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    /// Decide where `file_path` would go inside `dest_dir`.
    ///
    /// Only reads the filesystem; nothing is created or moved.
    pub fn plan(&self, file_path: &Path, dest_dir: &Path) -> MoveResult<MovePlan> {
        let file_name = file_path
            .file_name()
            .ok_or_else(|| MoveError::NoFileName(file_path.to_path_buf()))?;

        let direct = dest_dir.join(file_name);
        if !direct.exists() {
            return Ok(MovePlan::Move(direct));
        }

        Ok(match self.policy {
            DuplicatePolicy::Skip => MovePlan::SkipDuplicate(direct),
            DuplicatePolicy::Overwrite => MovePlan::Replace(direct),
            DuplicatePolicy::Rename => MovePlan::Move(next_free_name(file_path, dest_dir)),
        })
    }

    /// Carry out a plan produced by [`SafeMover::plan`].
    pub fn execute(&self, file_path: &Path, plan: &MovePlan) -> MoveResult<MoveOutcome> {
        let target = match plan {
            MovePlan::SkipDuplicate(existing) => {
                return Ok(MoveOutcome::SkippedDuplicate(existing.clone()));
            }
            MovePlan::Move(target) | MovePlan::Replace(target) => target,
        };

        let bytes = fs::metadata(file_path)
            .map_err(|e| MoveError::Source {
                path: file_path.to_path_buf(),
                source: e,
            })?
            .len();

        if let Some(dest_dir) = target.parent()
            && !dest_dir.exists()
        {
            fs::create_dir_all(dest_dir).map_err(|e| MoveError::CreateDir {
                path: dest_dir.to_path_buf(),
                source: e,
            })?;
        }

        let started = Instant::now();
        let copied = move_path(file_path, target)?;

        Ok(MoveOutcome::Moved(MovedFile {
            source: file_path.to_path_buf(),
            destination: target.clone(),
            bytes,
            elapsed: started.elapsed(),
            copied,
        }))
    }

    /// Plan and execute in one step.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autosorter::mover::{DuplicatePolicy, MoveOutcome, SafeMover};
    /// use std::path::Path;
    ///
    /// let mover = SafeMover::new(DuplicatePolicy::Rename);
    /// match mover.move_into(Path::new("/home/me/Downloads/a.pdf"), Path::new("/home/me/Documents")) {
    ///     Ok(MoveOutcome::Moved(moved)) => println!("-> {}", moved.destination.display()),
    ///     Ok(MoveOutcome::SkippedDuplicate(existing)) => println!("exists: {}", existing.display()),
    ///     Err(e) => eprintln!("{}", e),
    /// }
    /// ```
    pub fn move_into(&self, file_path: &Path, dest_dir: &Path) -> MoveResult<MoveOutcome> {
        let plan = self.plan(file_path, dest_dir)?;
        self.execute(file_path, &plan)
    }
}

/// First `stem(n).ext` in `dest_dir` that does not exist, counting from 1.
fn next_free_name(file_path: &Path, dest_dir: &Path) -> PathBuf {
    let stem = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter: u32 = 1;
    loop {
        let candidate = dest_dir.join(format!("{}({}){}", stem, counter, ext));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Rename, or copy and delete when the rename crosses filesystems.
/// Returns true when the copy fallback was used.
fn move_path(from: &Path, to: &Path) -> MoveResult<bool> {
    let move_err = |e: std::io::Error| MoveError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    };

    match fs::rename(from, to) {
        Ok(()) => Ok(false),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(
                "{} is on another filesystem, copying instead",
                to.display()
            );
            fs::copy(from, to).map_err(move_err)?;
            if let Err(e) = fs::remove_file(from) {
                // Don't leave two copies behind.
                let _ = fs::remove_file(to);
                return Err(move_err(e));
            }
            Ok(true)
        }
        Err(e) => Err(move_err(e)),
    }
}
