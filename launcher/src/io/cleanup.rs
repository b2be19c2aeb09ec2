//! Guaranteed removal of the dependency environment directory.
//!
//! [`EnvCleanup`] is shared between the run's [`CleanupGuard`] and the signal
//! handler; whichever reaches it first removes the directory. Later calls
//! wait until that removal is over and then do nothing, so a forced exit
//! never leaves a half-removed environment behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

/// Outcome of a cleanup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed,
    /// Nothing to remove.
    Absent,
    /// Cleanup already ran through another exit path.
    AlreadyDone,
}

#[derive(Debug)]
pub struct EnvCleanup {
    dir: PathBuf,
    done: Mutex<bool>,
}

impl EnvCleanup {
    pub fn new(dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.into(),
            done: Mutex::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove the directory if it exists. Only the first call does any work.
    pub fn run(&self) -> io::Result<CleanupOutcome> {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        if *done {
            return Ok(CleanupOutcome::AlreadyDone);
        }
        *done = true;
        remove_dir_if_exists(&self.dir)
    }
}

/// Remove `dir` recursively when it exists.
pub fn remove_dir_if_exists(dir: &Path) -> io::Result<CleanupOutcome> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!(dir = %dir.display(), "removed directory");
            Ok(CleanupOutcome::Removed)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CleanupOutcome::Absent),
        Err(e) => Err(e),
    }
}

/// Runs [`EnvCleanup`] when dropped, covering normal return, `?` early
/// returns and unwinding alike.
pub struct CleanupGuard {
    cleanup: Arc<EnvCleanup>,
}

impl CleanupGuard {
    pub fn new(cleanup: Arc<EnvCleanup>) -> Self {
        Self { cleanup }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup.run() {
            warn!(err = %e, dir = %self.cleanup.dir().display(), "failed to remove dependency environment");
        }
    }
}
