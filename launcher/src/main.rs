//! Provisioning runner for the airline API backend.
//!
//! Invoked without arguments it backs up the data file, rebuilds the Python
//! dependency environment, installs `requirements.txt` and runs `main.py` in
//! the foreground, removing the environment again on exit.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use launcher::core::layout::ProjectLayout;
use launcher::exit_codes;
use launcher::io::backup::list_backups;
use launcher::io::config::{CONFIG_FILE, LauncherConfig, load_config, write_config};
use launcher::io::run_log::stdout_console;
use launcher::io::signals::Shutdown;
use launcher::io::toolchain::PythonToolchain;
use launcher::launch::{LaunchRequest, run_launch};

#[derive(Parser)]
#[command(
    name = "launcher",
    version,
    about = "Back up, provision and run the airline API backend"
)]
struct Cli {
    /// Project root. Defaults to the directory containing this executable.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file. Defaults to `launcher.toml` in the project root.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Provision the dependency environment and run the application (default).
    Run,
    /// Write `launcher.toml` with default values.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// List data file backups, oldest first.
    Backups {
        /// Print a JSON array instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    launcher::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => executable_dir()?,
    };
    let config_path = cli.config.unwrap_or_else(|| root.join(CONFIG_FILE));
    debug!(root = %root.display(), config = %config_path.display(), "resolved paths");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => cmd_run(&root, &config_path),
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Backups { json } => cmd_backups(&root, &config_path, json),
    }
}

fn cmd_run(root: &Path, config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let layout = ProjectLayout::resolve(root, &config);

    let shutdown = Shutdown::new();
    shutdown.install()?;

    let toolchain = PythonToolchain::new(
        config.python.clone(),
        shutdown.clone(),
        config.shutdown_grace(),
    );
    let request = LaunchRequest {
        layout: &layout,
        config: &config,
        shutdown: &shutdown,
        console: stdout_console(),
    };
    // Failures are already in the run log; only the exit code is left to report.
    let code = match run_launch(&request, &toolchain) {
        Ok(outcome) => outcome.exit_code,
        Err(err) => err.exit_code(),
    };
    Ok(code)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &LauncherConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_backups(root: &Path, config_path: &Path, json: bool) -> Result<i32> {
    let config = load_config(config_path)?;
    let layout = ProjectLayout::resolve(root, &config);
    let backups = list_backups(&layout.backup_dir, &config.backup_suffix)?;

    if json {
        let payload = serde_json::to_string_pretty(&backups).context("serialize backups")?;
        println!("{payload}");
        return Ok(exit_codes::OK);
    }
    if backups.is_empty() {
        println!("no backups in {}", layout.backup_dir.display());
        return Ok(exit_codes::OK);
    }
    for backup in &backups {
        println!(
            "{}  {:>12}  {}",
            backup.taken_at.format("%Y-%m-%d %H:%M:%S"),
            backup.size_bytes,
            backup.path.display()
        );
    }
    Ok(exit_codes::OK)
}

/// Directory holding the running executable, so the launcher works from any cwd.
fn executable_dir() -> Result<PathBuf> {
    let exe = env::current_exe().context("resolve launcher executable path")?;
    let exe = exe.canonicalize().unwrap_or(exe);
    exe.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("executable path has no parent: {}", exe.display()))
}
