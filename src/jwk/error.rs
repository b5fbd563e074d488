use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while turning the endpoint configuration into a `jwks_uri`.
///
/// These are fatal at startup; they are never retried per request.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Neither a static `jwks_uri` nor an issuer was configured.
    #[error("no jwks_uri or issuer configured")]
    NoEndpointConfigured,

    /// A configured or discovered URL is not an absolute http(s) URL.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The discovery document could not be retrieved.
    #[error("failed to fetch discovery document from {url}: {source}")]
    DiscoveryUnreachable {
        /// Discovery document URL.
        url: String,
        /// Underlying transport or status error.
        source: reqwest::Error,
    },

    /// The discovery document is not a JSON object.
    #[error("discovery document from {url} is not a JSON object: {reason}")]
    DiscoveryMalformed {
        /// Discovery document URL.
        url: String,
        /// Decoder message.
        reason: String,
    },

    /// The discovery document has no `jwks_uri` member.
    #[error("cannot find jwks_uri entry in response from {url}")]
    DiscoveryFieldMissing {
        /// Discovery document URL.
        url: String,
    },

    /// The discovery document's `jwks_uri` member is not a string.
    #[error("jwks_uri entry in response from {url} is not a string but {found}")]
    DiscoveryFieldTypeMismatch {
        /// Discovery document URL.
        url: String,
        /// JSON type that was found instead.
        found: &'static str,
    },
}

/// Errors raised while fetching the key set from upstream.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request failed or timed out.
    #[error("failed to fetch key set: {0}")]
    Request(reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("upstream responded with status {status}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Response body, truncated. Only meant for logs.
        body: String,
    },

    /// The response body is not a key set.
    #[error("failed to decode key set: {0}")]
    Decode(reqwest::Error),

    /// The filtered key set could not be serialized again.
    #[error("failed to encode key set: {0}")]
    Encode(serde_json::Error),
}

impl UpstreamError {
    /// Error class that is safe to show to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Request(err) if err.is_timeout() => "upstream timeout",
            UpstreamError::Request(_) => "upstream unreachable",
            UpstreamError::Status { .. } => "upstream status",
            UpstreamError::Decode(_) => "upstream response malformed",
            UpstreamError::Encode(_) => "encoding failure",
        }
    }
}
