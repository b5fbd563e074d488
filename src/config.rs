use std::time::Duration;

use clap::Parser;

use crate::cache::DEFAULT_REFRESH_INTERVAL;
use crate::client::DEFAULT_FETCH_TIMEOUT;
use crate::jwk::EndpointConfig;
use crate::observability::{LogFormat, LogLevel};

/// Command line and environment options of `jwkssvr`.
///
/// Every flag can also be set through the environment variable named in its help.
/// Flags win over the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "jwkssvr", version, about = "Caching JWKS proxy")]
pub struct Options {
    /// Port to listen on, on all interfaces.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Issuer URL, used to discover the jwks_uri when no --jwks-uri is given.
    #[arg(long, env = "ISSUER")]
    pub issuer: Option<String>,

    /// Remote jwks uri. Takes precedence over discovery through --issuer.
    #[arg(long, env = "JWKS_URI")]
    pub jwks_uri: Option<String>,

    /// Log level.
    #[arg(long, env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info, ignore_case = true)]
    pub log_level: LogLevel,

    /// Log format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json, ignore_case = true)]
    pub log_format: LogFormat,

    /// Seconds a fetched key set is served before it is refreshed.
    #[arg(long, env = "REFRESH_INTERVAL", default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs())]
    pub refresh_interval: u64,

    /// Upstream request timeout in milliseconds.
    #[arg(long, env = "FETCH_TIMEOUT", default_value_t = default_fetch_timeout_ms())]
    pub fetch_timeout: u64,

    /// Print the settings and exit.
    #[arg(long)]
    pub dry_run: bool,
}

impl Options {
    /// Where the key set comes from.
    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig::new(self.issuer.clone(), self.jwks_uri.clone())
    }

    /// Cache ttl.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    /// Upstream request timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout)
    }
}

fn default_fetch_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_FETCH_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}
