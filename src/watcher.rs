//! Watch loop: notify events in, one handler call per event.

use crate::error::{Result, SorterError};
use crate::handler::EventHandler;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, error, info};

/// How often the loop wakes up to check the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// A registered watch. Events queue up from the moment [`DirectoryWatcher::start`]
/// returns, so nothing written before [`ActiveWatch::run`] is missed.
pub struct ActiveWatch {
    directory: PathBuf,
    // Dropping the watcher ends the event stream.
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
}

pub struct DirectoryWatcher {
    directory: PathBuf,
    recursive: bool,
}

impl DirectoryWatcher {
    pub fn new(directory: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            directory: directory.into(),
            recursive,
        }
    }

    /// Register the watch.
    ///
    /// # Errors
    ///
    /// Fails if the directory is missing or the platform watcher refuses it.
    pub fn start(&self) -> Result<ActiveWatch> {
        if !self.directory.is_dir() {
            return Err(SorterError::InvalidWatchDirectory {
                path: self.directory.display().to_string(),
            });
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(tx, Config::default())?;

        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&self.directory, mode)?;

        debug!(
            "Watch registered on {} (recursive: {})",
            self.directory.display(),
            self.recursive
        );

        Ok(ActiveWatch {
            directory: self.directory.clone(),
            _watcher: watcher,
            events: rx,
        })
    }
}

impl ActiveWatch {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Feed events to `handler` until `shutdown` is set or the event
    /// stream closes. Handler failures are logged per file and never stop
    /// the loop. A stability wait in progress is abandoned on shutdown.
    pub fn run(self, handler: &mut EventHandler, shutdown: &Arc<AtomicBool>) -> Result<()> {
        handler.set_shutdown_flag(Arc::clone(shutdown));
        info!("Monitoring {}...", self.directory.display());

        while !shutdown.load(Ordering::SeqCst) {
            match self.events.recv_timeout(SHUTDOWN_POLL) {
                Ok(Ok(event)) => {
                    debug!("Received notify event: {:?}", event.kind);
                    handler.handle_event(&event);
                }
                Ok(Err(e)) => error!("Watch error: {}", e),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    error!("Event stream closed unexpectedly");
                    break;
                }
            }
        }

        info!("Stopped monitoring {}", self.directory.display());
        Ok(())
    }
}

/// Install a Ctrl-C handler that raises the returned flag.
///
/// Can only be called once per process.
pub fn install_shutdown_handler() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;
    Ok(shutdown)
}
