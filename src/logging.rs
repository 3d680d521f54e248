//! Diagnostic output setup.
//!
//! Diagnostics go to stderr through a `tracing-subscriber` fmt layer. The
//! filter comes from `RUST_LOG` when set, otherwise from the level passed
//! on the command line.

use tracing_subscriber::{EnvFilter, prelude::*};

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .with_ansi(false);

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = default_filter, "tracing initialized");
    }
}
