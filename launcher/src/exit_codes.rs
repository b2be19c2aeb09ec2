//! Stable exit codes for the launcher CLI.

/// Run completed and the application exited (its own status is not forwarded by default).
pub const OK: i32 = 0;
/// Missing dependency manifest or entry file, invalid config, or any setup failure.
pub const FAILURE: i32 = 1;
/// Run was interrupted by SIGINT or SIGTERM (128 + SIGINT, as shells report it).
pub const INTERRUPTED: i32 = 130;
