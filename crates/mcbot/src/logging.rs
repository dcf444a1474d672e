//! Logging bootstrap for binaries.
//!
//! Libraries in this workspace only emit `tracing` events; installing a
//! subscriber is left to the program that runs them.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_level` (e.g. `"info"` or `"mcbot_session=debug"`).
///
/// Does nothing if a global subscriber is already set.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
