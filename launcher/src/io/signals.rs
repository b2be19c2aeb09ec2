//! SIGINT/SIGTERM handling.
//!
//! The handler only records the request. The run loop checks [`Shutdown`]
//! between steps and while waiting on child processes, unwinds with
//! [`LaunchError::Interrupted`] and lets its cleanup guard fire. A second
//! signal forces an immediate exit: the running child's process group is
//! killed and the armed cleanup runs first.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use tracing::{info, warn};

use crate::error::LaunchError;
use crate::exit_codes;
use crate::io::cleanup::EnvCleanup;
use crate::io::process::signal_group;

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    signals: Arc<AtomicUsize>,
    armed: Arc<Mutex<Option<Arc<EnvCleanup>>>>,
    /// Leader of the running child's process group.
    child: Arc<Mutex<Option<u32>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the process-wide SIGINT/SIGTERM handler.
    ///
    /// May only be called once per process.
    pub fn install(&self) -> Result<()> {
        let handle = self.clone();
        ctrlc::set_handler(move || handle.on_signal()).context("set SIGINT/SIGTERM handler")?;
        Ok(())
    }

    /// Cleanup to run if a second signal forces the process down.
    pub fn arm(&self, cleanup: Arc<EnvCleanup>) {
        if let Ok(mut armed) = self.armed.lock() {
            *armed = Some(cleanup);
        }
    }

    /// Child process group to kill if a second signal forces the process down.
    pub fn set_child(&self, pid: Option<u32>) {
        if let Ok(mut child) = self.child.lock() {
            *child = pid;
        }
    }

    pub fn child(&self) -> Option<u32> {
        self.child.lock().ok().and_then(|child| *child)
    }

    /// Record a shutdown request, as a delivered signal does.
    pub fn request(&self) {
        self.signals.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.signals.load(Ordering::SeqCst) > 0
    }

    /// `Err(Interrupted)` once a shutdown was requested.
    pub fn check(&self) -> Result<(), LaunchError> {
        if self.is_requested() {
            return Err(LaunchError::Interrupted);
        }
        Ok(())
    }

    fn on_signal(&self) {
        let count = self.signals.fetch_add(1, Ordering::SeqCst) + 1;
        if count == 1 {
            info!("shutdown requested");
            return;
        }
        warn!("second signal received, forcing exit");
        if let Some(pid) = self.child()
            && let Err(e) = signal_group(pid, Signal::SIGKILL)
        {
            warn!(err = %e, pid, "failed to kill child process group");
        }
        let armed = self.armed.lock().ok().and_then(|armed| armed.clone());
        if let Some(cleanup) = armed
            && let Err(e) = cleanup.run()
        {
            warn!(err = %e, "forced cleanup failed");
        }
        std::process::exit(exit_codes::INTERRUPTED);
    }
}
