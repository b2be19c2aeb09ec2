//! Diagnostic tracing, kept apart from the run log.
//!
//! The run log (`io/run_log`) is what operators read: timestamped lines on
//! stdout and in `logs/runner.log`, always written. Tracing goes to stderr
//! only, is never persisted and stays quiet at the default filter unless a
//! failure cannot be reported through the run log.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber. Call once, before anything logs.
///
/// `RUST_LOG` selects what is shown and defaults to `warn`, which keeps the
/// console limited to the run log during a normal launch. To follow child
/// supervision and shutdown handling while reproducing a problem:
///
/// ```bash
/// RUST_LOG=launcher::io::process=debug,launcher::launch=debug ./launcher --root /srv/airline-api
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
