//! Diagnostic logging setup.
//!
//! Events go to stderr through a `tracing-subscriber` fmt layer. The filter
//! comes from `CASADM_LOG` (same syntax as `RUST_LOG`) and defaults to
//! `warn`, so normal command output is never interleaved with diagnostics.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CASADM_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .with_target(true)
        .without_time()
        .try_init();
}
