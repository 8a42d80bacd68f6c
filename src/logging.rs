//! Diagnostics for the sidecar.
//!
//! stdout carries the JSON-lines protocol, so every log line goes to stderr.
//! The filter is read from `MARKSHEETD_LOG`, then `RUST_LOG`, and defaults to
//! `info`.

use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "MARKSHEETD_LOG";

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init_logging() {
    let layer = fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(layer)
        .try_init();
}
