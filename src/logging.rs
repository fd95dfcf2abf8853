//! Log setup: INFO and below to stdout, WARN and above to stderr
//!
//! The split keeps the Scheduler's two log files clean when the
//! streams are redirected, and matches interactive expectations when
//! run from a terminal.

use std::io::{self, IsTerminal};
use tracing::Level;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{EnvFilter, filter_fn};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init(level: &str) {
    let configured = level.parse::<Level>().unwrap_or(Level::INFO);

    // RUST_LOG takes precedence over the LOGLEVEL setting
    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured.to_string()));

    let stdout_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(io::stdout().is_terminal())
        .with_filter(stdout_filter)
        .with_filter(filter_fn(|meta| *meta.level() > Level::WARN));

    // Warnings and errors always reach stderr, regardless of verbosity
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_filter(filter_fn(|meta| *meta.level() <= Level::WARN));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(stderr_layer)
        .init();

    tracing::debug!("logging initialized at level {}", configured);
}
