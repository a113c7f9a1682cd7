//! Tracing setup for the fixbot binary.
//!
//! All diagnostics go to stderr so that stdout only carries forwarded clone
//! progress, fix tool output, and the final one-line result.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `fixbot=info,warn` if unset so that stage
/// progress is visible in CI logs.
///
/// # Example
/// ```bash
/// RUST_LOG=fixbot=debug fixbot run
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fixbot=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
