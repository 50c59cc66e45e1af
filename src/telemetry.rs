//! Logging initialization
//!
//! Filter comes from `RUST_LOG` and defaults to `info`. Logs go to stderr
//! so the replay output on stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
