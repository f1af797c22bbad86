//! Policy resources.
//!
//! A policy is exactly one kind. The wire format keeps one optional field
//! per kind; [`Policy::kind`] turns that into the [`PolicyKind`] sum type
//! the engine matches on.

use serde::{Deserialize, Serialize};

use super::meta::ObjectMeta;

/// Reference from a VirtualServer, route or subroute to a policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyReference {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl PolicyReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: String::new() }
    }

    pub fn in_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub metadata: ObjectMeta,
    pub spec: PolicySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySpec {
    #[serde(rename = "accessControl")]
    pub access_control: Option<AccessControl>,
    #[serde(rename = "rateLimit")]
    pub rate_limit: Option<RateLimit>,
    #[serde(rename = "jwt")]
    pub jwt_auth: Option<JwtAuth>,
    #[serde(rename = "ingressMTLS")]
    pub ingress_mtls: Option<IngressMtls>,
    #[serde(rename = "egressMTLS")]
    pub egress_mtls: Option<EgressMtls>,
    pub oidc: Option<Oidc>,
}

/// The one configured kind of a policy
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyKind<'a> {
    AccessControl(&'a AccessControl),
    RateLimit(&'a RateLimit),
    Jwt(&'a JwtAuth),
    IngressMtls(&'a IngressMtls),
    EgressMtls(&'a EgressMtls),
    Oidc(&'a Oidc),
}

impl Policy {
    pub fn new(metadata: ObjectMeta, spec: PolicySpec) -> Self {
        Self { metadata, spec }
    }

    /// The configured kind, checked in a fixed precedence order. `None`
    /// for a policy with no kind set.
    pub fn kind(&self) -> Option<PolicyKind<'_>> {
        let spec = &self.spec;
        if let Some(ac) = &spec.access_control {
            Some(PolicyKind::AccessControl(ac))
        } else if let Some(rl) = &spec.rate_limit {
            Some(PolicyKind::RateLimit(rl))
        } else if let Some(jwt) = &spec.jwt_auth {
            Some(PolicyKind::Jwt(jwt))
        } else if let Some(imtls) = &spec.ingress_mtls {
            Some(PolicyKind::IngressMtls(imtls))
        } else if let Some(emtls) = &spec.egress_mtls {
            Some(PolicyKind::EgressMtls(emtls))
        } else {
            spec.oidc.as_ref().map(PolicyKind::Oidc)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessControl {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub rate: String,
    pub key: String,
    pub delay: Option<i64>,
    #[serde(rename = "noDelay")]
    pub no_delay: Option<bool>,
    pub burst: Option<i64>,
    #[serde(rename = "zoneSize")]
    pub zone_size: String,
    #[serde(rename = "dryRun")]
    pub dry_run: Option<bool>,
    #[serde(rename = "logLevel")]
    pub log_level: String,
    #[serde(rename = "rejectCode")]
    pub reject_code: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtAuth {
    pub realm: String,
    pub secret: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressMtls {
    #[serde(rename = "clientCertSecret")]
    pub client_cert_secret: String,
    #[serde(rename = "verifyClient")]
    pub verify_client: String,
    #[serde(rename = "verifyDepth")]
    pub verify_depth: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EgressMtls {
    #[serde(rename = "tlsSecret")]
    pub tls_secret: String,
    #[serde(rename = "verifyServer")]
    pub verify_server: bool,
    #[serde(rename = "verifyDepth")]
    pub verify_depth: Option<i64>,
    pub protocols: String,
    #[serde(rename = "sessionReuse")]
    pub session_reuse: Option<bool>,
    pub ciphers: String,
    #[serde(rename = "trustedCertSecret")]
    pub trusted_cert_secret: String,
    #[serde(rename = "serverName")]
    pub server_name: bool,
    #[serde(rename = "sslName")]
    pub ssl_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Oidc {
    #[serde(rename = "authEndpoint")]
    pub auth_endpoint: String,
    #[serde(rename = "tokenEndpoint")]
    pub token_endpoint: String,
    #[serde(rename = "jwksURI")]
    pub jwks_uri: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    pub scope: String,
    #[serde(rename = "redirectURI")]
    pub redirect_uri: String,
}
