//! Provisioning runner for the airline API backend.
//!
//! The launcher backs up the SQLite data file, rebuilds an isolated Python
//! dependency environment, installs the declared dependencies and runs the
//! application in the foreground, relaying its output to log files. The
//! environment directory is removed on every exit path. The crate is split:
//!
//! - **[`core`]**: Pure, deterministic logic (path layout, backup naming,
//!   exit-code policy). No I/O.
//! - **[`io`]**: Side-effecting operations (config file, run log, backups,
//!   cleanup, signals, child processes).
//!
//! [`launch`] sequences core logic and I/O into the run the CLI performs.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod launch;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
