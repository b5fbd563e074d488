use serde_json::Value;
use tracing::*;
use url::Url;

use super::error::ResolveError;

/// Where the upstream key set lives.
///
/// A static `jwks_uri` always wins. Otherwise the issuer's OpenID discovery
/// document is consulted for its `jwks_uri` member.
#[derive(Debug, Clone, Default)]
pub struct EndpointConfig {
    issuer: Option<String>,
    jwks_uri: Option<String>,
}

impl EndpointConfig {
    /// Path of the discovery document relative to the issuer.
    pub const DISCOVERY_SUFFIX: &str = ".well-known/openid-configuration";

    /// Creates a configuration. Empty strings count as not configured.
    pub fn new(issuer: Option<String>, jwks_uri: Option<String>) -> EndpointConfig {
        EndpointConfig {
            issuer: non_empty(issuer),
            jwks_uri: non_empty(jwks_uri),
        }
    }

    /// Configuration with a fixed `jwks_uri`.
    pub fn with_jwks_uri(jwks_uri: impl Into<String>) -> EndpointConfig {
        EndpointConfig::new(None, Some(jwks_uri.into()))
    }

    /// Configuration that discovers the `jwks_uri` from `issuer`.
    pub fn with_issuer(issuer: impl Into<String>) -> EndpointConfig {
        EndpointConfig::new(Some(issuer.into()), None)
    }

    /// The configured issuer, if any.
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// The statically configured `jwks_uri`, if any.
    pub fn jwks_uri(&self) -> Option<&str> {
        self.jwks_uri.as_deref()
    }

    /// Resolves the URL the key set is fetched from.
    pub async fn resolve(&self, http: &reqwest::Client) -> Result<Url, ResolveError> {
        if let Some(jwks_uri) = &self.jwks_uri {
            return parse_http_url(jwks_uri);
        }

        let Some(issuer) = &self.issuer else {
            return Err(ResolveError::NoEndpointConfigured);
        };

        let discovery_url = Self::discovery_url(issuer)?;
        let jwks_uri = discover_jwks_uri(http, &discovery_url).await?;
        let resolved = parse_http_url(&jwks_uri)?;

        info!(issuer = %issuer, jwks_uri = %resolved, "discovered jwks_uri from issuer");
        Ok(resolved)
    }

    /// Builds `{issuer}/.well-known/openid-configuration`.
    pub(crate) fn discovery_url(issuer: &str) -> Result<Url, ResolveError> {
        parse_http_url(issuer)?;
        let url = format!(
            "{}/{}",
            issuer.trim_end_matches('/'),
            Self::DISCOVERY_SUFFIX
        );
        parse_http_url(&url)
    }
}

async fn discover_jwks_uri(
    http: &reqwest::Client,
    discovery_url: &Url,
) -> Result<String, ResolveError> {
    let url = discovery_url.to_string();
    debug!(%url, "fetching discovery document");

    let unreachable = |source| ResolveError::DiscoveryUnreachable {
        url: url.clone(),
        source,
    };

    let response = http
        .get(discovery_url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(unreachable)?;

    let body = response.bytes().await.map_err(unreachable)?;

    let document: Value =
        serde_json::from_slice(&body).map_err(|err| ResolveError::DiscoveryMalformed {
            url: url.clone(),
            reason: err.to_string(),
        })?;

    let mut document = match document {
        Value::Object(document) => document,
        other => {
            return Err(ResolveError::DiscoveryMalformed {
                url,
                reason: format!("expected an object, found {}", json_type(&other)),
            });
        }
    };

    match document.remove("jwks_uri") {
        Some(Value::String(jwks_uri)) => Ok(jwks_uri),
        None | Some(Value::Null) => Err(ResolveError::DiscoveryFieldMissing { url }),
        Some(other) => Err(ResolveError::DiscoveryFieldTypeMismatch {
            url,
            found: json_type(&other),
        }),
    }
}

fn parse_http_url(input: &str) -> Result<Url, ResolveError> {
    let invalid = |reason: String| ResolveError::InvalidUrl {
        url: input.to_owned(),
        reason,
    };

    let url = Url::parse(input).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        "http" | "https" => Err(invalid("missing host".into())),
        scheme => Err(invalid(format!("unsupported scheme '{scheme}'"))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
