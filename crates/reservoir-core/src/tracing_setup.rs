//! Tracing subscriber installation.

use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the default filter.
pub const LOG_ENV: &str = "RESERVOIR_LOG";

/// Install a `fmt` subscriber filtered by `RESERVOIR_LOG`, falling back to
/// `default_filter`. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing("warn");
        init_tracing("debug");
        tracing::debug!("still alive");
    }
}
