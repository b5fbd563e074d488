use serde::{Deserialize, Serialize};

/// A single entry of a JSON Web Key Set.
///
/// This is a passthrough container: RSA (`n`, `e`) and elliptic-curve
/// (`crv`, `x`, `y`) members are carried as-is and never validated. Members
/// that are absent or empty are left out when the key is serialized again.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkKey {
    /// Key type (`kty`), e.g. `RSA` or `EC`.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub kty: Option<String>,

    /// Key identifier (`kid`).
    #[serde(default, skip_serializing_if = "is_blank")]
    pub kid: Option<String>,

    /// Intended public key use (`use`), e.g. `sig`.
    #[serde(rename = "use", default, skip_serializing_if = "is_blank")]
    pub key_use: Option<String>,

    /// Algorithm (`alg`), e.g. `RS256`.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub alg: Option<String>,

    /// RSA modulus.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub n: Option<String>,

    /// RSA public exponent.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub e: Option<String>,

    /// Elliptic curve name.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub crv: Option<String>,

    /// Elliptic curve x coordinate.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub x: Option<String>,

    /// Elliptic curve y coordinate.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub y: Option<String>,
}

impl JwkKey {
    /// Returns the algorithm if it is present and non-empty.
    pub fn algorithm(&self) -> Option<&str> {
        self.alg.as_deref().filter(|alg| !alg.is_empty())
    }
}

/// An ordered set of keys as published at a `jwks_uri`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// The keys, in upstream order.
    #[serde(default)]
    pub keys: Vec<JwkKey>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}
