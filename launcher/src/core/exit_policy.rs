//! Mapping from the launched application's exit to the launcher's exit code.

use crate::exit_codes;

/// How the application process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppExit {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl AppExit {
    pub fn is_success(self) -> bool {
        self.code == Some(0)
    }
}

/// Launcher exit code once the application has exited.
///
/// The application's status is discarded unless `propagate` is set. A
/// signal-terminated application maps to [`exit_codes::FAILURE`] when
/// propagating.
pub fn launcher_exit_code(app: AppExit, propagate: bool) -> i32 {
    if !propagate {
        return exit_codes::OK;
    }
    app.code.unwrap_or(exit_codes::FAILURE)
}
