//! Tracing subscriber setup for the binary
//!
//! `RUST_LOG` wins over `logging.level`. Logs go to stderr so command output
//! on stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber; a second call is a no-op
pub fn init_logging(config: &LoggingConfig) {
    let filter = build_filter(config);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = match config.format.trim().to_ascii_lowercase().as_str() {
        "pretty" => builder.pretty().try_init(),
        "full" => builder.try_init(),
        _ => builder.compact().try_init(),
    };
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.trim()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
