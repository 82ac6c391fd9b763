//! Log output setup
//!
//! `RUST_LOG` wins when set; otherwise the configured filter applies.
//! Logs go to stderr so results on stdout stay parseable.

use tracing_subscriber::EnvFilter;

pub fn init(configured: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new(handoff_config::DEFAULT_LOG_FILTER));

    // Keep a subscriber that is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
