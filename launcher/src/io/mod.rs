//! I/O helpers for launcher commands.

pub mod backup;
pub mod cleanup;
pub mod config;
pub mod process;
pub mod run_log;
pub mod signals;
pub mod toolchain;
