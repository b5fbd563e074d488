//! Logging setup for the `jwkssvr` binary.

use clap::ValueEnum;
use tracing::{error_span, Span};
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    Text,
    /// One JSON object per line.
    #[default]
    Json,
}

/// Minimum level of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    /// Everything including per-request header dumps.
    Debug,
    /// Requests, refreshes and startup.
    #[default]
    Info,
    /// Stale copies being served and other recoverable failures.
    Warn,
    /// Unrecoverable failures only.
    Error,
}

impl LogLevel {
    /// The matching `EnvFilter` directive.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Calling this more than once keeps the first subscriber.
pub fn init_tracing(format: LogFormat, level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

/// Root span of the process. Every event recorded inside it carries `app` and `version`.
///
/// Created at error level so it stays enabled under any `LOG_LEVEL`.
pub fn service_span(app: &'static str) -> Span {
    error_span!("service", app, version = env!("CARGO_PKG_VERSION"))
}
