use std::time::Duration;

use tracing::*;
use url::Url;

use crate::jwk::{JwkSet, UpstreamError};

/// Default upstream timeout. Kept below the server's client request timeout
/// so a slow upstream cannot outlive the request that triggered it.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(750);

/// Upper bound on how much of an error body is kept for logging.
const MAX_ERROR_BODY: usize = 512;

/// Fetches the key set from a resolved `jwks_uri`.
///
/// Performs exactly one GET per call. Retrying is left to the caller.
#[derive(Debug, Clone)]
pub struct JwksClient {
    http: reqwest::Client,
    url: Url,
}

impl JwksClient {
    /// Creates a client with its own connection pool and the given timeout.
    pub fn new(url: Url, timeout: Duration) -> Result<JwksClient, UpstreamError> {
        let http = build_http_client(timeout).map_err(UpstreamError::Request)?;
        Ok(JwksClient::with_client(http, url))
    }

    /// Creates a client sharing an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, url: Url) -> JwksClient {
        JwksClient { http, url }
    }

    /// The upstream `jwks_uri`.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetches and decodes the upstream key set.
    pub async fn fetch(&self) -> Result<JwkSet, UpstreamError> {
        debug!(url = %self.url, "fetching key set");

        let response = self
            .http
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(UpstreamError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status,
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(UpstreamError::Decode)
    }
}

/// Builds the HTTP client shared by discovery and key set fetching.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
