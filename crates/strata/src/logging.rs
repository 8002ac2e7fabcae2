//! Logging bootstrap.

use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber with `filter` directives.
///
/// Returns false if a subscriber was already installed, which makes repeated
/// calls from tests harmless. An unparsable filter falls back to `info`.
pub fn init_logging(filter: &str) -> bool {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
