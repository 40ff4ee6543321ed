//! Tracing subscriber setup for the binary.
//!
//! Logs go to stderr so stdout carries only the account report. `RUST_LOG`
//! takes precedence over the configured level.

use crate::config::LoggingConfig;
use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true);

    // try_init: a subscriber may already be installed when embedded.
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Verbose subscriber routed through the test harness.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
