//! `tracing` subscriber setup shared by both binaries.

use tracing_subscriber::{fmt, EnvFilter};

/// Env var that switches log output to JSON lines.
pub const JSON_ENV: &str = "CERTSCAN_LOG_JSON";

/// Initialise the global subscriber.
///
/// `RUST_LOG` wins over `default_directive`. Logs go to stderr so they do
/// not interleave with the prompt and progress output on stdout.
pub fn init(default_directive: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    if std::env::var(JSON_ENV).is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
