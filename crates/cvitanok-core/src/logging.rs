//! Tracing subscriber setup.
//!
//! Call one of the `init_*` functions once, before building the
//! [`App`](crate::App). The filter comes from `RUST_LOG` when set:
//!
//! ```bash
//! # Everything, including provider resolution and request traces
//! RUST_LOG=debug cargo run
//!
//! # Fine-grained
//! RUST_LOG=cvitanok_core::provider=trace,tower_http=debug,sqlx=warn cargo run
//! ```
//!
//! Installing a second subscriber is a no-op, so tests may call these freely.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact single-line output.
    Plain,
    /// Multi-line, with source locations and thread ids.
    Pretty,
    /// One JSON object per event, for log aggregation.
    Json,
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(format: LogFormat, default_level: &str) -> bool {
    let registry = tracing_subscriber::registry().with(filter(default_level));
    let installed = match format {
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    installed.is_ok()
}

/// Plain output at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    init(LogFormat::Plain, "info");
}

/// Plain output with a different default level (`"debug"`, `"warn"`, ...).
pub fn init_logging_with_level(level: &str) {
    init(LogFormat::Plain, level);
}

/// Pretty output, the usual choice in development.
pub fn init_logging_pretty() {
    init(LogFormat::Pretty, "info");
}

/// JSON output, the usual choice in production.
pub fn init_logging_json() {
    init(LogFormat::Json, "info");
}

/// Pick the format from the environment name: JSON in production, pretty
/// in development, plain otherwise.
pub fn init_for_environment(environment: &str) {
    let format = match environment {
        "production" => LogFormat::Json,
        "development" => LogFormat::Pretty,
        _ => LogFormat::Plain,
    };
    init(format, "info");
}
