//! Small pieces shared by every subcommand.

use tracing_subscriber::EnvFilter;

/// Initialise `tracing` with an env-filter default, matching the compact
/// formatter style used across this workspace's own unit tests.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
