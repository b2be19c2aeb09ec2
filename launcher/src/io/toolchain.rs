//! Adapter for the Python tooling that provisions and runs the application.
//!
//! The environment's interpreter is resolved once from the project layout and
//! invoked by explicit path; the launcher's own environment is never mutated.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::layout::ProjectLayout;
use crate::io::process::{ChildExit, OutputMode, Tee, run_plain, run_tee};
use crate::io::signals::Shutdown;

/// Provisioning and launch operations, one per child process the run needs.
pub trait Toolchain {
    /// Create a fresh dependency environment at `layout.env_dir`.
    fn create_env(&self, layout: &ProjectLayout) -> io::Result<ChildExit>;

    /// Upgrade the environment's package installer, output suppressed.
    fn upgrade_installer(&self, layout: &ProjectLayout) -> io::Result<ChildExit>;

    /// Install `layout.manifest`, relaying installer output through `tee`.
    fn install_dependencies(&self, layout: &ProjectLayout, tee: Arc<Tee>)
    -> io::Result<ChildExit>;

    /// Run `layout.entry` in the foreground, relaying combined output through `tee`.
    fn run_application(&self, layout: &ProjectLayout, tee: Arc<Tee>) -> io::Result<ChildExit>;
}

/// `venv` + `pip` toolchain driven by a system Python interpreter.
pub struct PythonToolchain {
    python: String,
    shutdown: Shutdown,
    grace: Duration,
}

impl PythonToolchain {
    pub fn new(python: impl Into<String>, shutdown: Shutdown, grace: Duration) -> Self {
        Self {
            python: python.into(),
            shutdown,
            grace,
        }
    }

    /// Command running the environment's interpreter as if the environment were active.
    fn env_python(&self, layout: &ProjectLayout) -> Command {
        let mut cmd = Command::new(layout.env_python());
        cmd.current_dir(&layout.root)
            .env("VIRTUAL_ENV", &layout.env_dir)
            .env("PATH", prefixed_path(&layout.env_bin(), env::var_os("PATH")))
            .env_remove("PYTHONHOME");
        cmd
    }
}

impl Toolchain for PythonToolchain {
    fn create_env(&self, layout: &ProjectLayout) -> io::Result<ChildExit> {
        let mut cmd = Command::new(&self.python);
        cmd.current_dir(&layout.root)
            .arg("-m")
            .arg("venv")
            .arg(&layout.env_dir);
        debug!(python = %self.python, dir = %layout.env_dir.display(), "creating environment");
        run_plain(cmd, OutputMode::Inherit, &self.shutdown, self.grace)
    }

    fn upgrade_installer(&self, layout: &ProjectLayout) -> io::Result<ChildExit> {
        let mut cmd = self.env_python(layout);
        cmd.args(["-m", "pip", "install", "--upgrade", "pip"]);
        run_plain(cmd, OutputMode::Discard, &self.shutdown, self.grace)
    }

    fn install_dependencies(
        &self,
        layout: &ProjectLayout,
        tee: Arc<Tee>,
    ) -> io::Result<ChildExit> {
        let mut cmd = self.env_python(layout);
        cmd.args(["-m", "pip", "install", "-r"]).arg(&layout.manifest);
        run_tee(cmd, tee, &self.shutdown, self.grace)
    }

    fn run_application(&self, layout: &ProjectLayout, tee: Arc<Tee>) -> io::Result<ChildExit> {
        let mut cmd = self.env_python(layout);
        // Output goes through a pipe; keep it line-buffered so the logs stay live.
        cmd.env("PYTHONUNBUFFERED", "1").arg(&layout.entry);
        run_tee(cmd, tee, &self.shutdown, self.grace)
    }
}

/// `PATH` with `bin` in front of the inherited entries.
fn prefixed_path(bin: &Path, inherited: Option<OsString>) -> OsString {
    let mut paths = vec![bin.to_path_buf()];
    if let Some(existing) = inherited {
        paths.extend(env::split_paths(&existing));
    }
    env::join_paths(paths).unwrap_or_else(|_| bin.as_os_str().to_owned())
}
