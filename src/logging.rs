//! Diagnostic logging for the command-line host.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Crate-specific filter variable, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "OPNAUDIT_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Resolve the filter directive from the environment.
fn filter_directive() -> String {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_string())
}

/// Install a stderr subscriber. Reports go to stdout, so logs never mix with them.
///
/// Calling this twice is harmless; the second call is ignored.
pub fn init() {
    let filter =
        EnvFilter::try_new(filter_directive()).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let _ = tracing_subscriber::registry().with(stderr).try_init();
}
