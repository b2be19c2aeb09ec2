//! Deterministic, pure logic shared by the launcher.
//!
//! Core modules must be free of I/O side effects. They operate on paths,
//! timestamps and exit codes handed to them and return deterministic outputs
//! suitable for tests.

pub mod backup_name;
pub mod exit_policy;
pub mod layout;
