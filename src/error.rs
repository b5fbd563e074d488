use std::sync::Arc;

use crate::jwk::UpstreamError;

/// A crate-wide result type alias using the custom [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to HTTP clients while serving a key set.
///
/// The Display text is the response body, so it only names the upstream url
/// and an error class.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No refresh has succeeded yet, so there is nothing to serve.
    #[error("error retrieving jwks from {url}: {}", .source.kind())]
    NoCachedData {
        /// Upstream `jwks_uri`.
        url: String,
        /// Why the refresh failed. Shared by every caller that waited on it.
        source: Arc<UpstreamError>,
    },
}
