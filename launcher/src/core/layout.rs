//! Resolution of the fixed project paths the launcher works with.

use std::path::{Path, PathBuf};

use crate::io::config::LauncherConfig;

/// File name of the launcher's own timestamped run log.
pub const RUNNER_LOG: &str = "runner.log";
/// File name receiving the dependency installer's output.
pub const INSTALL_LOG: &str = "pip-install.log";
/// File name receiving the application's combined output.
pub const APP_LOG: &str = "app.log";

/// Absolute locations of every filesystem artifact touched by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub env_dir: PathBuf,
    pub log_dir: PathBuf,
    pub runner_log: PathBuf,
    pub install_log: PathBuf,
    pub app_log: PathBuf,
    pub backup_dir: PathBuf,
    pub data_file: PathBuf,
    pub manifest: PathBuf,
    pub entry: PathBuf,
}

impl ProjectLayout {
    /// Resolve configured paths against `root`.
    ///
    /// Absolute configured paths are kept as-is (`Path::join` semantics), which
    /// is how the backup directory ends up outside the project tree.
    pub fn resolve(root: &Path, cfg: &LauncherConfig) -> Self {
        let log_dir = root.join(&cfg.log_dir);
        Self {
            root: root.to_path_buf(),
            env_dir: root.join(&cfg.env_dir),
            runner_log: log_dir.join(RUNNER_LOG),
            install_log: log_dir.join(INSTALL_LOG),
            app_log: log_dir.join(APP_LOG),
            log_dir,
            backup_dir: root.join(&cfg.backup_dir),
            data_file: root.join(&cfg.data_file),
            manifest: root.join(&cfg.manifest),
            entry: root.join(&cfg.entry),
        }
    }

    /// Interpreter inside the dependency environment.
    pub fn env_python(&self) -> PathBuf {
        self.env_bin().join("python")
    }

    /// Executable directory of the dependency environment.
    pub fn env_bin(&self) -> PathBuf {
        self.env_dir.join("bin")
    }
}
