//! Development-time tracing.
//!
//! Tracing output goes to stderr and is controlled by `RUST_LOG`. It is
//! separate from the transcript (`--log`), which records prompts and raw
//! model output as a product artifact.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=nut=debug nut do "add a README" -i 'src/**/*.rs'
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
