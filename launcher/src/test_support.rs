//! Test-only helpers: a throwaway project tree and a scripted toolchain.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::core::layout::ProjectLayout;
use crate::error::{LaunchError, Step};
use crate::io::config::LauncherConfig;
use crate::io::process::{ChildExit, Tee};
use crate::io::run_log::Console;
use crate::io::signals::Shutdown;
use crate::io::toolchain::Toolchain;
use crate::launch::{LaunchOutcome, LaunchRequest, run_launch};

/// In-memory console sink that can be read back.
#[derive(Clone, Default)]
pub struct CapturedConsole {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> Console {
        self.buf.clone()
    }

    pub fn contents(&self) -> String {
        let buf = self.buf.lock().expect("console lock");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Project root in a temp dir, with the backup directory outside of it.
pub struct TempProject {
    temp: TempDir,
    pub config: LauncherConfig,
}

impl TempProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        fs::create_dir_all(temp.path().join("project")).context("create project root")?;
        let config = LauncherConfig {
            backup_dir: temp.path().join("backups").to_string_lossy().into_owned(),
            ..LauncherConfig::default()
        };
        Ok(Self { temp, config })
    }

    pub fn root(&self) -> PathBuf {
        self.temp.path().join("project")
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::resolve(&self.root(), &self.config)
    }

    pub fn write_manifest(&self) -> Result<()> {
        self.write(&self.config.manifest, b"fastapi\nuvicorn\n")
    }

    pub fn write_entry(&self) -> Result<()> {
        self.write(&self.config.entry, b"print('serving')\n")
    }

    pub fn write_data(&self, contents: &[u8]) -> Result<()> {
        self.write(&self.config.data_file, contents)
    }

    /// Manifest and entry file present, no data file.
    pub fn with_inputs() -> Result<Self> {
        let project = Self::new()?;
        project.write_manifest()?;
        project.write_entry()?;
        Ok(project)
    }

    fn write(&self, rel: &str, contents: &[u8]) -> Result<()> {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Run the launch sequence against this project, capturing console output.
    pub fn launch(
        &self,
        toolchain: &ScriptedToolchain,
        shutdown: &Shutdown,
    ) -> (Result<LaunchOutcome, LaunchError>, String) {
        let layout = self.layout();
        let console = CapturedConsole::new();
        let request = LaunchRequest {
            layout: &layout,
            config: &self.config,
            shutdown,
            console: console.sink(),
        };
        let result = run_launch(&request, toolchain);
        (result, console.contents())
    }

    /// Backup files currently in the backup directory, sorted by name.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let dir = self.layout().backup_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = fs::read_dir(&dir)
            .with_context(|| format!("read {}", dir.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()
            .context("list backups")?;
        paths.sort();
        Ok(paths)
    }

    pub fn read_log(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
    }
}

/// Toolchain fake that simulates each step without running Python.
///
/// `create_env` creates the environment directory with a `bin/` subdirectory;
/// `run_application` records what the environment directory contained at
/// launch time.
pub struct ScriptedToolchain {
    exits: Vec<(Step, ChildExit)>,
    app_output: Vec<String>,
    install_output: Vec<String>,
    interrupt: Option<(Step, Shutdown)>,
    calls: RefCell<Vec<Step>>,
    env_at_launch: RefCell<Option<Vec<String>>>,
}

impl ScriptedToolchain {
    /// Every step succeeds; the application exits 0.
    pub fn succeeding() -> Self {
        Self {
            exits: Vec::new(),
            app_output: Vec::new(),
            install_output: Vec::new(),
            interrupt: None,
            calls: RefCell::new(Vec::new()),
            env_at_launch: RefCell::new(None),
        }
    }

    pub fn with_exit(mut self, step: Step, exit: ChildExit) -> Self {
        self.exits.push((step, exit));
        self
    }

    pub fn with_app_output(mut self, lines: &[&str]) -> Self {
        self.app_output = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_install_output(mut self, lines: &[&str]) -> Self {
        self.install_output = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Deliver a shutdown request while `step` runs, as a signal would.
    pub fn interrupt_during(mut self, step: Step, shutdown: &Shutdown) -> Self {
        self.interrupt = Some((step, shutdown.clone()));
        self
    }

    pub fn calls(&self) -> Vec<Step> {
        self.calls.borrow().clone()
    }

    /// Entries of the environment directory when the application started.
    pub fn env_at_launch(&self) -> Option<Vec<String>> {
        self.env_at_launch.borrow().clone()
    }

    fn finish(&self, step: Step) -> ChildExit {
        self.calls.borrow_mut().push(step);
        if let Some((interrupt_step, shutdown)) = &self.interrupt
            && *interrupt_step == step
        {
            shutdown.request();
            return ChildExit::Interrupted;
        }
        self.exits
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, exit)| *exit)
            .unwrap_or(ChildExit::Exited(Some(0)))
    }
}

impl Toolchain for ScriptedToolchain {
    fn create_env(&self, layout: &ProjectLayout) -> io::Result<ChildExit> {
        fs::create_dir_all(layout.env_bin())?;
        Ok(self.finish(Step::CreateEnv))
    }

    fn upgrade_installer(&self, _layout: &ProjectLayout) -> io::Result<ChildExit> {
        Ok(self.finish(Step::UpgradeInstaller))
    }

    fn install_dependencies(
        &self,
        _layout: &ProjectLayout,
        tee: Arc<Tee>,
    ) -> io::Result<ChildExit> {
        for line in &self.install_output {
            tee.write_line(format!("{line}\n").as_bytes());
        }
        Ok(self.finish(Step::InstallDependencies))
    }

    fn run_application(&self, layout: &ProjectLayout, tee: Arc<Tee>) -> io::Result<ChildExit> {
        let mut entries = fs::read_dir(&layout.env_dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        *self.env_at_launch.borrow_mut() = Some(entries);

        for line in &self.app_output {
            tee.write_line(format!("{line}\n").as_bytes());
        }
        Ok(self.finish(Step::Application))
    }
}
