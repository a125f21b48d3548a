//! Diagnostics setup for the binary.

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

/// Resolve the filter: `RUST_LOG` wins, then the configured fallback, then
/// `warn`.
pub fn resolve_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Logs go to stderr; stdout carries the
/// transcript. Calling this twice is harmless.
pub fn init(fallback: &str) {
    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(resolve_filter(fallback))
        .with(layer)
        .try_init();
}
