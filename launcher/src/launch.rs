//! Orchestration of a launch run.
//!
//! A run provisions a clean dependency environment and runs the application in
//! the foreground, in a fixed order:
//!
//! 1. ensure the log and backup directories exist
//! 2. arm the environment cleanup (fires on every exit path)
//! 3. open the run log and print the start banner
//! 4. back up the data file if it exists
//! 5. remove a stale environment, create a fresh one, upgrade the installer
//! 6. install the manifest (fatal if missing)
//! 7. run the entry file (fatal if missing) until it exits
//!
//! Every failure after the run log is open is logged there before it is
//! returned.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, instrument};

use crate::core::exit_policy::{AppExit, launcher_exit_code};
use crate::core::layout::ProjectLayout;
use crate::error::{LaunchError, Step};
use crate::io::backup::backup_data_file;
use crate::io::cleanup::{CleanupGuard, CleanupOutcome, EnvCleanup, remove_dir_if_exists};
use crate::io::config::LauncherConfig;
use crate::io::process::{ChildExit, Tee};
use crate::io::run_log::{Console, RunLog, open_append};
use crate::io::signals::Shutdown;
use crate::io::toolchain::Toolchain;

/// Inputs of a launch run.
pub struct LaunchRequest<'a> {
    pub layout: &'a ProjectLayout,
    pub config: &'a LauncherConfig,
    pub shutdown: &'a Shutdown,
    pub console: Console,
}

/// Result of a run that reached the application and saw it exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// Backup written before provisioning, if the data file existed.
    pub backup: Option<PathBuf>,
    pub app_exit: AppExit,
    /// Exit code the launcher should terminate with.
    pub exit_code: i32,
}

/// Run the full launch sequence.
#[instrument(skip_all, fields(root = %request.layout.root.display()))]
pub fn run_launch<T: Toolchain>(
    request: &LaunchRequest<'_>,
    toolchain: &T,
) -> Result<LaunchOutcome, LaunchError> {
    let layout = request.layout;

    if let Err(err) = ensure_dirs(&[layout.log_dir.as_path(), layout.backup_dir.as_path()]) {
        RunLog::console_only(Arc::clone(&request.console)).error(&err);
        return Err(err);
    }

    let cleanup = EnvCleanup::new(&layout.env_dir);
    request.shutdown.arm(Arc::clone(&cleanup));
    let _guard = CleanupGuard::new(cleanup);

    let log = match RunLog::open(&layout.runner_log, Arc::clone(&request.console)) {
        Ok(log) => log,
        Err(err) => {
            RunLog::console_only(Arc::clone(&request.console)).error(&err);
            return Err(err);
        }
    };
    log.info(format!(
        "===== Starting launcher in {} =====",
        layout.root.display()
    ));

    match provision_and_run(request, toolchain, &log) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            if err.is_interrupted() {
                log.error("Interrupted, cleaning up dependency environment");
            } else {
                log.error(&err);
            }
            Err(err)
        }
    }
}

fn provision_and_run<T: Toolchain>(
    request: &LaunchRequest<'_>,
    toolchain: &T,
    log: &RunLog,
) -> Result<LaunchOutcome, LaunchError> {
    let LaunchRequest {
        layout,
        config,
        shutdown,
        ..
    } = *request;

    shutdown.check()?;
    let backup = backup_data_file(
        &layout.data_file,
        &layout.backup_dir,
        &config.backup_suffix,
        Local::now().naive_local(),
    )?;
    if let Some(dest) = &backup {
        log.info(format!("Database backed up to {}", dest.display()));
    }

    shutdown.check()?;
    let stale = remove_dir_if_exists(&layout.env_dir).map_err(|source| LaunchError::RemoveEnv {
        path: layout.env_dir.clone(),
        source,
    })?;
    if stale == CleanupOutcome::Removed {
        log.info("Removed dependency environment left by a previous run");
    }

    log.info(format!(
        "Creating dependency environment at {}",
        layout.env_dir.display()
    ));
    check_step(Step::CreateEnv, toolchain.create_env(layout), shutdown)?;

    log.info("Upgrading package installer");
    check_step(
        Step::UpgradeInstaller,
        toolchain.upgrade_installer(layout),
        shutdown,
    )?;

    if !layout.manifest.is_file() {
        return Err(LaunchError::ManifestMissing {
            path: layout.manifest.clone(),
        });
    }
    log.info(format!(
        "Installing dependencies from {}",
        layout.manifest.display()
    ));
    let install_tee = Tee::new(open_append(&layout.install_log)?, log.console());
    check_step(
        Step::InstallDependencies,
        toolchain.install_dependencies(layout, install_tee),
        shutdown,
    )?;

    if !layout.entry.is_file() {
        return Err(LaunchError::EntryMissing {
            path: layout.entry.clone(),
        });
    }
    log.info(format!("Starting application {}", layout.entry.display()));
    let app_tee = Tee::new(open_append(&layout.app_log)?, log.console());
    let app_exit = match toolchain.run_application(layout, app_tee) {
        Ok(ChildExit::Exited(code)) => AppExit { code },
        Ok(ChildExit::Interrupted) => return Err(LaunchError::Interrupted),
        Err(source) => {
            return Err(LaunchError::Spawn {
                step: Step::Application,
                source,
            });
        }
    };
    // A signal can land after the application exited on its own but before we return.
    shutdown.check()?;

    log.info("Application exited");
    if !app_exit.is_success() {
        debug!(code = ?app_exit.code, "application exited unsuccessfully");
        log.info(format!(
            "Application exit status: {}",
            match app_exit.code {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            }
        ));
    }

    let exit_code = launcher_exit_code(app_exit, config.propagate_app_exit_status);
    info!(exit_code, "run finished");
    Ok(LaunchOutcome {
        backup,
        app_exit,
        exit_code,
    })
}

fn ensure_dirs(dirs: &[&Path]) -> Result<(), LaunchError> {
    for dir in dirs {
        debug!(dir = %dir.display(), "ensuring directory");
        fs::create_dir_all(dir).map_err(|source| LaunchError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Map a provisioning child's result to the run's error kinds.
fn check_step(
    step: Step,
    result: io::Result<ChildExit>,
    shutdown: &Shutdown,
) -> Result<(), LaunchError> {
    let exit = result.map_err(|source| LaunchError::Spawn { step, source })?;
    match exit {
        ChildExit::Interrupted => Err(LaunchError::Interrupted),
        _ if shutdown.is_requested() => Err(LaunchError::Interrupted),
        ChildExit::Exited(Some(0)) => Ok(()),
        ChildExit::Exited(code) => Err(LaunchError::StepFailed { step, code }),
    }
}
