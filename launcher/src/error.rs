//! Error kinds for a launch run.
//!
//! Every provisioning step maps to its own variant so a failure can be logged
//! with what went wrong and turned into a stable exit code.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

/// A child process the launcher runs during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateEnv,
    UpgradeInstaller,
    InstallDependencies,
    Application,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::CreateEnv => "environment creation",
            Step::UpgradeInstaller => "installer upgrade",
            Step::InstallDependencies => "dependency installation",
            Step::Application => "application",
        };
        f.write_str(name)
    }
}

/// Failure of a launch run.
#[derive(Error, Debug)]
pub enum LaunchError {
    // === Filesystem ===
    /// A required directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A log file could not be opened for appending.
    #[error("failed to open log file {path}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Copying the data file into the backup directory failed.
    #[error("failed to back up {from} to {to}: {source}")]
    Backup {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stale dependency environment could not be removed.
    #[error("failed to remove dependency environment {path}: {source}")]
    RemoveEnv {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // === Child processes ===
    /// A child process could not be spawned or waited on.
    #[error("failed to run {step}: {source}")]
    Spawn {
        step: Step,
        #[source]
        source: io::Error,
    },

    /// A child process exited unsuccessfully.
    #[error("{step} failed ({})", describe_code(*code))]
    StepFailed { step: Step, code: Option<i32> },

    // === Missing inputs ===
    /// The dependency manifest does not exist.
    #[error("dependency manifest not found: {path}")]
    ManifestMissing { path: PathBuf },

    /// The application entry file does not exist.
    #[error("application entry file not found: {path}")]
    EntryMissing { path: PathBuf },

    // === Signals ===
    /// SIGINT or SIGTERM arrived before the run finished.
    #[error("interrupted by signal")]
    Interrupted,
}

impl LaunchError {
    /// Process exit code for this failure.
    ///
    /// A failed child forwards its own code; one killed by a signal maps to
    /// [`exit_codes::FAILURE`].
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StepFailed { code, .. } => match code {
                Some(0) | None => exit_codes::FAILURE,
                Some(code) => *code,
            },
            Self::Interrupted => exit_codes::INTERRUPTED,
            _ => exit_codes::FAILURE,
        }
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
