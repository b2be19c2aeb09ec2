//! Launcher configuration stored in `launcher.toml` at the project root.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default config file name, looked up in the project root.
pub const CONFIG_FILE: &str = "launcher.toml";

/// Launcher configuration (TOML).
///
/// The file is optional. Missing fields default to the fixed layout of the
/// airline API deployment, so running without a config file is the normal case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherConfig {
    /// System interpreter used to create the dependency environment.
    pub python: String,

    /// Dependency environment directory, rebuilt on every run.
    pub env_dir: String,

    /// Directory holding `runner.log`, `pip-install.log` and `app.log`.
    pub log_dir: String,

    /// SQLite data file backed up before each run.
    pub data_file: String,

    /// Dependency manifest installed into the environment.
    pub manifest: String,

    /// Application entry file run with the environment's interpreter.
    pub entry: String,

    /// Backup destination. Absolute by default, outside the project tree.
    pub backup_dir: String,

    /// Fixed suffix appended to the timestamp in backup file names.
    pub backup_suffix: String,

    /// Seconds a child process gets to exit after SIGINT/SIGTERM before it is killed.
    pub shutdown_grace_secs: u64,

    /// Exit with the application's status instead of always exiting 0.
    pub propagate_app_exit_status: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            env_dir: "venv".to_string(),
            log_dir: "logs".to_string(),
            data_file: "data/airline.db".to_string(),
            manifest: "requirements.txt".to_string(),
            entry: "main.py".to_string(),
            backup_dir: "/var/backups/airline-api".to_string(),
            backup_suffix: "_airline.db.bak".to_string(),
            shutdown_grace_secs: 10,
            propagate_app_exit_status: false,
        }
    }
}

impl LauncherConfig {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("python", &self.python),
            ("env_dir", &self.env_dir),
            ("log_dir", &self.log_dir),
            ("data_file", &self.data_file),
            ("manifest", &self.manifest),
            ("entry", &self.entry),
            ("backup_dir", &self.backup_dir),
            ("backup_suffix", &self.backup_suffix),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must be a non-empty string"));
            }
        }
        if self.backup_suffix.contains('/') {
            return Err(anyhow!("backup_suffix must not contain '/'"));
        }
        if self.shutdown_grace_secs == 0 {
            return Err(anyhow!("shutdown_grace_secs must be > 0"));
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LauncherConfig::default()`.
pub fn load_config(path: &Path) -> Result<LauncherConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = LauncherConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LauncherConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LauncherConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
