//! Secret references as handed to the compiler by the secret store.
//!
//! The compiler never touches secret files. It only sees the type, an
//! optional validation error and the materialized path, plus the raw data
//! map for the few fields that are inlined (the OIDC client secret).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::meta::ObjectMeta;

pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
pub const CA_KEY: &str = "ca.crt";
pub const JWK_KEY: &str = "jwk";
pub const CLIENT_SECRET_KEY: &str = "client-secret";

/// Secret types understood by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretType {
    #[serde(rename = "kubernetes.io/tls")]
    Tls,
    #[serde(rename = "nginx.org/ca")]
    Ca,
    #[serde(rename = "nginx.org/jwk")]
    Jwk,
    #[serde(rename = "nginx.org/oidc")]
    Oidc,
    #[serde(untagged)]
    Other(String),
}

impl SecretType {
    pub fn as_str(&self) -> &str {
        match self {
            SecretType::Tls => "kubernetes.io/tls",
            SecretType::Ca => "nginx.org/ca",
            SecretType::Jwk => "nginx.org/jwk",
            SecretType::Oidc => "nginx.org/oidc",
            SecretType::Other(other) => other,
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Kubernetes secret. `data` values are already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    pub fn new(metadata: ObjectMeta, secret_type: SecretType) -> Self {
        Self { metadata, secret_type, data: BTreeMap::new() }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Check that the secret carries the fields its type requires
    pub fn validate(&self) -> Result<(), String> {
        let required: &[&str] = match self.secret_type {
            SecretType::Tls => &[TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY],
            SecretType::Ca => &[CA_KEY],
            SecretType::Jwk => &[JWK_KEY],
            SecretType::Oidc => &[CLIENT_SECRET_KEY],
            SecretType::Other(_) => return Err("secret is of an unsupported type".to_string()),
        };
        for key in required {
            if !self.data.contains_key(*key) {
                return Err(format!("secret doesn't have {}", key));
            }
        }
        Ok(())
    }

    /// Contents of the pem file for a TLS secret: cert, newline, key
    pub fn cert_and_key_file_content(&self) -> String {
        let cert = self.data.get(TLS_CERT_KEY).map(String::as_str).unwrap_or_default();
        let key = self.data.get(TLS_PRIVATE_KEY_KEY).map(String::as_str).unwrap_or_default();
        format!("{}\n{}", cert, key)
    }

    pub fn ca_file_content(&self) -> String {
        self.data.get(CA_KEY).cloned().unwrap_or_default()
    }
}

/// Result of looking up a secret: the secret (if known), its materialized
/// path and the validation error, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretReference {
    #[serde(default)]
    pub secret: Option<Secret>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl SecretReference {
    pub fn valid(secret: Secret, path: impl Into<String>) -> Self {
        Self { secret: Some(secret), path: path.into(), error: None }
    }

    pub fn invalid(secret: Option<Secret>, error: impl Into<String>) -> Self {
        Self { secret, path: String::new(), error: Some(error.into()) }
    }

    /// Reference returned for a key the store has never seen
    pub fn missing() -> Self {
        Self::invalid(None, "secret doesn't exist or of an unsupported type")
    }

    /// Build a reference from a secret, validating it
    pub fn from_secret(secret: Secret, path: impl Into<String>) -> Self {
        match secret.validate() {
            Ok(()) => Self::valid(secret, path),
            Err(e) => Self::invalid(Some(secret), e),
        }
    }

    pub fn secret_type(&self) -> Option<&SecretType> {
        self.secret.as_ref().map(|s| &s.secret_type)
    }

    /// Type mismatch check: a reference with no secret never mismatches
    pub fn has_wrong_type(&self, expected: &SecretType) -> bool {
        matches!(self.secret_type(), Some(actual) if actual != expected)
    }
}

/// Secret references keyed by `namespace/name`
pub type SecretRefs = BTreeMap<String, SecretReference>;

/// Lookup a secret reference, yielding [`SecretReference::missing`] for
/// unknown keys
pub fn lookup_secret(refs: &SecretRefs, key: &str) -> SecretReference {
    refs.get(key).cloned().unwrap_or_else(SecretReference::missing)
}
