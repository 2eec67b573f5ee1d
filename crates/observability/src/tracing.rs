//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Filtering comes from `RUST_LOG` (default `info`). JSON output is the
/// default so worker and cycle logs stay machine-parseable; set
/// `CURIO_LOG_FORMAT=pretty` for local development.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let pretty = std::env::var("CURIO_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("pretty"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    if pretty {
        let _ = builder.try_init();
    } else {
        let _ = builder.json().try_init();
    }
}
