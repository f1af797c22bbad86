//! # Policy Resolution Engine
//!
//! Merges the policies referenced by one context (the VirtualServer spec, a
//! route, or a VirtualServerRoute subroute) into a [`PolicyBundle`].
//!
//! References are resolved in declaration order. A reference that cannot be
//! resolved (missing policy, wrong-typed or invalid secret, a conflicting
//! OIDC policy) ends resolution for the context and yields a fatal bundle
//! that only carries a `500` error return. Everything else is a warning.
//!
//! Cardinality per context:
//!
//! - access control and rate limits accumulate
//! - JWT, ingress mTLS and egress mTLS are singletons, later references are
//!   ignored with a warning
//! - OIDC is a singleton across a VirtualServer and all of its routes, see
//!   [`OidcState`]

mod engine;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ObjectMeta, ResourceKey, ResourceKind, SecretRefs};
use crate::model::http::{
    EgressMtls, IngressMtls, JwtAuth, LimitReq, LimitReqOptions, LimitReqZone, Location, Oidc, Return,
};

pub use engine::resolve_policies;

/// Where a policy reference was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyContext {
    Spec,
    Route,
    Subroute,
}

impl PolicyContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyContext::Spec => "spec",
            PolicyContext::Route => "route",
            PolicyContext::Subroute => "subroute",
        }
    }
}

impl fmt::Display for PolicyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource that declared the references, and the VirtualServer it
/// belongs to. Warnings are attributed to `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOwner<'a> {
    pub key: ResourceKey,
    /// Namespace used for references without one
    pub namespace: &'a str,
    pub vs_namespace: &'a str,
    pub vs_name: &'a str,
}

impl<'a> PolicyOwner<'a> {
    pub fn new(kind: ResourceKind, owner: &'a ObjectMeta, vs: &'a ObjectMeta) -> Self {
        Self {
            key: ResourceKey::from_meta(kind, owner),
            namespace: &owner.namespace,
            vs_namespace: &vs.namespace,
            vs_name: &vs.name,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyOptions<'a> {
    /// TLS is configured on the VirtualServer
    pub tls: bool,
    pub secret_refs: &'a SecretRefs,
}

/// The OIDC policy chosen for a VirtualServer and its routes. The first
/// OIDC reference compiled wins; re-referencing the same policy elsewhere
/// is fine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OidcState {
    oidc: Option<Oidc>,
    key: String,
}

impl OidcState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn oidc(&self) -> Option<&Oidc> {
        self.oidc.as_ref()
    }

    /// `namespace/name` of the chosen policy
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Resolved policies of one context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyBundle {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub limit_req_options: LimitReqOptions,
    pub limit_req_zones: Vec<LimitReqZone>,
    pub limit_reqs: Vec<LimitReq>,
    pub jwt_auth: Option<JwtAuth>,
    pub ingress_mtls: Option<IngressMtls>,
    pub egress_mtls: Option<EgressMtls>,
    pub oidc: bool,
    pub error_return: Option<Return>,
}

impl PolicyBundle {
    /// Bundle that serves 500 for everything in its context
    pub fn fatal() -> Self {
        Self { error_return: Some(Return::new(500, "")), ..Default::default() }
    }

    pub fn is_fatal(&self) -> bool {
        self.error_return.is_some()
    }

    pub fn apply_to_location(&self, location: &mut Location) {
        location.allow = self.allow.clone();
        location.deny = self.deny.clone();
        location.limit_req_options = self.limit_req_options.clone();
        location.limit_reqs = self.limit_reqs.clone();
        location.jwt_auth = self.jwt_auth.clone();
        location.egress_mtls = self.egress_mtls.clone();
        location.oidc = self.oidc;
        location.policies_error_return = self.error_return.clone();
    }

    pub fn apply_to_locations(&self, locations: &mut [Location]) {
        for location in locations {
            self.apply_to_location(location);
        }
    }
}

/// Drop zones whose name was already seen, keeping the first
pub fn dedupe_limit_req_zones(zones: Vec<LimitReqZone>) -> Vec<LimitReqZone> {
    let mut seen = BTreeSet::new();
    zones.into_iter().filter(|z| seen.insert(z.zone_name.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_limit_req_zones() {
        let zone = |name: &str, rate: &str| LimitReqZone {
            zone_name: name.to_string(),
            rate: rate.to_string(),
            ..Default::default()
        };
        let zones = dedupe_limit_req_zones(vec![zone("a", "1r/s"), zone("b", "2r/s"), zone("a", "3r/s")]);
        assert_eq!(zones, vec![zone("a", "1r/s"), zone("b", "2r/s")]);
    }

    #[test]
    fn test_fatal_bundle_applies_error_return() {
        let bundle = PolicyBundle::fatal();
        assert!(bundle.is_fatal());

        let mut locations = vec![Location::default(), Location::default()];
        bundle.apply_to_locations(&mut locations);
        assert!(locations.iter().all(|l| l.policies_error_return == Some(Return::new(500, ""))));
    }

    #[test]
    fn test_context_display() {
        assert_eq!(PolicyContext::Subroute.to_string(), "subroute");
    }
}
