//! Per-kind merge routines.

use std::collections::BTreeMap;

use crate::domain::policy::{AccessControl, EgressMtls as EgressMtlsSpec, IngressMtls as IngressMtlsSpec, JwtAuth as JwtSpec, Oidc as OidcSpec, RateLimit};
use crate::domain::secret::CLIENT_SECRET_KEY;
use crate::domain::{lookup_secret, Policy, PolicyKind, PolicyReference, SecretRefs, SecretReference, SecretType};
use crate::model::http::{EgressMtls, IngressMtls, JwtAuth, LimitReq, LimitReqOptions, LimitReqZone, Oidc};
use crate::warnings::Warnings;

use super::{OidcState, PolicyBundle, PolicyContext, PolicyOptions, PolicyOwner};

/// Messages from merging one policy, and whether the context is lost
#[derive(Debug, Default)]
struct Outcome {
    warnings: Vec<String>,
    fatal: bool,
}

impl Outcome {
    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn fail(message: impl Into<String>) -> Self {
        Self { warnings: vec![message.into()], fatal: true }
    }
}

/// Resolve `refs` in order. Warnings land on the owner's key; the first
/// fatal reference short-circuits into [`PolicyBundle::fatal`].
pub fn resolve_policies(
    owner: &PolicyOwner<'_>,
    refs: &[PolicyReference],
    policies: &BTreeMap<String, Policy>,
    context: PolicyContext,
    options: &PolicyOptions<'_>,
    oidc_state: &mut OidcState,
    warnings: &mut Warnings,
) -> PolicyBundle {
    let mut bundle = PolicyBundle::default();

    for reference in refs {
        let namespace = if reference.namespace.is_empty() { owner.namespace } else { reference.namespace.as_str() };
        let key = format!("{}/{}", namespace, reference.name);

        let Some(policy) = policies.get(&key) else {
            tracing::debug!(owner = %owner.key, policy = %key, "policy reference is unresolved");
            warnings.add(&owner.key, format!("Policy {} is missing or invalid", key));
            return PolicyBundle::fatal();
        };

        let outcome = match policy.kind() {
            Some(PolicyKind::AccessControl(ac)) => bundle.add_access_control(ac),
            Some(PolicyKind::RateLimit(rl)) => {
                bundle.add_rate_limit(rl, &key, namespace, &reference.name, owner.vs_namespace, owner.vs_name)
            }
            Some(PolicyKind::Jwt(jwt)) => bundle.add_jwt(jwt, &key, namespace, options.secret_refs),
            Some(PolicyKind::IngressMtls(imtls)) => {
                bundle.add_ingress_mtls(imtls, &key, namespace, context, options.tls, options.secret_refs)
            }
            Some(PolicyKind::EgressMtls(emtls)) => bundle.add_egress_mtls(emtls, &key, namespace, options.secret_refs),
            Some(PolicyKind::Oidc(oidc)) => bundle.add_oidc(oidc, &key, namespace, options.secret_refs, oidc_state),
            None => Outcome::default(),
        };

        for message in outcome.warnings {
            warnings.add(&owner.key, message);
        }
        if outcome.fatal {
            return PolicyBundle::fatal();
        }
    }

    bundle
}

/// Type and validity check shared by every secret-backed policy
fn check_secret(reference: &SecretReference, expected: &SecretType, kind: &str, key: &str) -> Result<(), String> {
    if let Some(actual) = reference.secret_type().filter(|t| *t != expected) {
        return Err(format!("{} policy {:?} references a Secret of an incorrect type {:?}", kind, key, actual.as_str()));
    }
    if let Some(error) = &reference.error {
        return Err(format!("{} policy {:?} references an invalid Secret: {}", kind, key, error));
    }
    Ok(())
}

fn limit_req(zone_name: &str, rl: &RateLimit) -> LimitReq {
    let no_delay = rl.no_delay.unwrap_or(false);
    LimitReq {
        zone_name: zone_name.to_string(),
        burst: rl.burst.unwrap_or(0),
        no_delay,
        delay: if no_delay { 0 } else { rl.delay.unwrap_or(0) },
    }
}

fn limit_req_zone(zone_name: &str, rl: &RateLimit) -> LimitReqZone {
    LimitReqZone {
        key: rl.key.clone(),
        zone_name: zone_name.to_string(),
        zone_size: rl.zone_size.clone(),
        rate: rl.rate.clone(),
    }
}

fn limit_req_options(rl: &RateLimit) -> LimitReqOptions {
    LimitReqOptions {
        dry_run: rl.dry_run.unwrap_or(false),
        log_level: if rl.log_level.is_empty() { "error".to_string() } else { rl.log_level.clone() },
        reject_code: rl.reject_code.unwrap_or(503),
    }
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

impl PolicyBundle {
    fn add_access_control(&mut self, ac: &AccessControl) -> Outcome {
        let mut outcome = Outcome::default();
        self.allow.extend(ac.allow.iter().cloned());
        self.deny.extend(ac.deny.iter().cloned());
        if !self.allow.is_empty() && !self.deny.is_empty() {
            outcome.warn(
                "AccessControl policy (or policies) with deny rules is overridden by policy (or policies) with allow rules",
            );
        }
        outcome
    }

    fn add_rate_limit(
        &mut self,
        rl: &RateLimit,
        key: &str,
        namespace: &str,
        name: &str,
        vs_namespace: &str,
        vs_name: &str,
    ) -> Outcome {
        let mut outcome = Outcome::default();
        let zone_name = format!("pol_rl_{}_{}_{}_{}", namespace, name, vs_namespace, vs_name);
        self.limit_reqs.push(limit_req(&zone_name, rl));
        self.limit_req_zones.push(limit_req_zone(&zone_name, rl));

        let current = limit_req_options(rl);
        if self.limit_reqs.len() == 1 {
            self.limit_req_options = current;
            return outcome;
        }

        let first = &self.limit_req_options;
        if current.dry_run != first.dry_run {
            outcome.warn(format!(
                "RateLimit policy {:?} with limit request option dryRun={} is overridden to dryRun={} by the first policy reference in this context",
                key, current.dry_run, first.dry_run
            ));
        }
        if current.log_level != first.log_level {
            outcome.warn(format!(
                "RateLimit policy {:?} with limit request option logLevel={} is overridden to logLevel={} by the first policy reference in this context",
                key, current.log_level, first.log_level
            ));
        }
        if current.reject_code != first.reject_code {
            outcome.warn(format!(
                "RateLimit policy {:?} with limit request option rejectCode={} is overridden to rejectCode={} by the first policy reference in this context",
                key, current.reject_code, first.reject_code
            ));
        }
        outcome
    }

    fn add_jwt(&mut self, jwt: &JwtSpec, key: &str, namespace: &str, secret_refs: &SecretRefs) -> Outcome {
        let mut outcome = Outcome::default();
        if self.jwt_auth.is_some() {
            outcome.warn(format!(
                "Multiple jwt policies in the same context is not valid. JWT policy {:?} will be ignored",
                key
            ));
            return outcome;
        }

        let secret = lookup_secret(secret_refs, &format!("{}/{}", namespace, jwt.secret));
        if let Err(message) = check_secret(&secret, &SecretType::Jwk, "JWT", key) {
            return Outcome::fail(message);
        }

        self.jwt_auth = Some(JwtAuth { secret: secret.path, realm: jwt.realm.clone(), token: jwt.token.clone() });
        outcome
    }

    fn add_ingress_mtls(
        &mut self,
        imtls: &IngressMtlsSpec,
        key: &str,
        namespace: &str,
        context: PolicyContext,
        tls: bool,
        secret_refs: &SecretRefs,
    ) -> Outcome {
        let mut outcome = Outcome::default();
        if !tls {
            return Outcome::fail("TLS configuration needed for IngressMTLS policy");
        }
        if context != PolicyContext::Spec {
            return Outcome::fail(format!("IngressMTLS policy is not allowed in the {} context", context));
        }
        if self.ingress_mtls.is_some() {
            outcome.warn(format!(
                "Multiple ingressMTLS policies are not allowed. IngressMTLS policy {:?} will be ignored",
                key
            ));
            return outcome;
        }

        let secret = lookup_secret(secret_refs, &format!("{}/{}", namespace, imtls.client_cert_secret));
        if let Err(message) = check_secret(&secret, &SecretType::Ca, "IngressMTLS", key) {
            return Outcome::fail(message);
        }

        self.ingress_mtls = Some(IngressMtls {
            client_cert: secret.path,
            verify_client: or_default(&imtls.verify_client, "on"),
            verify_depth: imtls.verify_depth.unwrap_or(1),
        });
        outcome
    }

    fn add_egress_mtls(&mut self, emtls: &EgressMtlsSpec, key: &str, namespace: &str, secret_refs: &SecretRefs) -> Outcome {
        let mut outcome = Outcome::default();
        if self.egress_mtls.is_some() {
            outcome.warn(format!(
                "Multiple egressMTLS policies in the same context is not valid. EgressMTLS policy {:?} will be ignored",
                key
            ));
            return outcome;
        }

        let mut tls_secret_path = String::new();
        if !emtls.tls_secret.is_empty() {
            let secret = lookup_secret(secret_refs, &format!("{}/{}", namespace, emtls.tls_secret));
            if let Err(message) = check_secret(&secret, &SecretType::Tls, "EgressMTLS", key) {
                return Outcome::fail(message);
            }
            tls_secret_path = secret.path;
        }

        let mut trusted_cert_path = String::new();
        if !emtls.trusted_cert_secret.is_empty() {
            let secret = lookup_secret(secret_refs, &format!("{}/{}", namespace, emtls.trusted_cert_secret));
            if let Err(message) = check_secret(&secret, &SecretType::Ca, "EgressMTLS", key) {
                return Outcome::fail(message);
            }
            trusted_cert_path = secret.path;
        }

        self.egress_mtls = Some(EgressMtls {
            certificate: tls_secret_path.clone(),
            certificate_key: tls_secret_path,
            verify_server: emtls.verify_server,
            verify_depth: emtls.verify_depth.unwrap_or(1),
            ciphers: or_default(&emtls.ciphers, "DEFAULT"),
            protocols: or_default(&emtls.protocols, "TLSv1 TLSv1.1 TLSv1.2"),
            trusted_cert: trusted_cert_path,
            session_reuse: emtls.session_reuse.unwrap_or(true),
            server_name: emtls.server_name,
            ssl_name: or_default(&emtls.ssl_name, "$proxy_host"),
        });
        outcome
    }

    fn add_oidc(
        &mut self,
        oidc: &OidcSpec,
        key: &str,
        namespace: &str,
        secret_refs: &SecretRefs,
        state: &mut OidcState,
    ) -> Outcome {
        let mut outcome = Outcome::default();
        if self.oidc {
            outcome.warn(format!(
                "Multiple oidc policies in the same context is not valid. OIDC policy {:?} will be ignored",
                key
            ));
            return outcome;
        }

        if state.oidc.is_some() {
            if state.key != key {
                return Outcome::fail(format!(
                    "Only one OIDC policy is allowed in a VirtualServer and its VirtualServerRoutes. Can't use {:?}. Use {:?}",
                    key, state.key
                ));
            }
        } else {
            let secret_key = format!("{}/{}", namespace, oidc.client_secret);
            let Some(secret) = secret_refs.get(&secret_key) else {
                return Outcome::fail(format!("OIDC policy {:?} references a non-existent Secret {}", key, secret_key));
            };
            if let Err(message) = check_secret(secret, &SecretType::Oidc, "OIDC", key) {
                return Outcome::fail(message);
            }
            let Some(client_secret) = secret.secret.as_ref().and_then(|s| s.data.get(CLIENT_SECRET_KEY)) else {
                return Outcome::fail(format!(
                    "OIDC policy {:?} references a Secret without the data field {}",
                    key, CLIENT_SECRET_KEY
                ));
            };

            state.oidc = Some(Oidc {
                auth_endpoint: oidc.auth_endpoint.clone(),
                client_id: oidc.client_id.clone(),
                client_secret: client_secret.clone(),
                jwks_uri: oidc.jwks_uri.clone(),
                scope: or_default(&oidc.scope, "openid"),
                token_endpoint: oidc.token_endpoint.clone(),
                redirect_uri: or_default(&oidc.redirect_uri, "/_codexch"),
            });
            state.key = key.to_string();
        }

        self.oidc = true;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::PolicySpec;
    use crate::domain::{ObjectMeta, ResourceKind, Secret};
    use crate::model::http::Return;

    struct Fixture {
        vs: ObjectMeta,
        policies: BTreeMap<String, Policy>,
        secrets: SecretRefs,
    }

    impl Fixture {
        fn new() -> Self {
            Self { vs: ObjectMeta::new("default", "cafe"), policies: BTreeMap::new(), secrets: SecretRefs::new() }
        }

        fn policy(mut self, name: &str, spec: PolicySpec) -> Self {
            let meta = ObjectMeta::new("default", name);
            self.policies.insert(meta.key(), Policy::new(meta, spec));
            self
        }

        fn secret(mut self, name: &str, secret_type: SecretType, data: &[(&str, &str)]) -> Self {
            let mut secret = Secret::new(ObjectMeta::new("default", name), secret_type);
            for (k, v) in data {
                secret = secret.with_data(*k, *v);
            }
            self.secrets.insert(format!("default/{}", name), SecretReference::valid(secret, format!("/etc/nginx/secrets/default-{}", name)));
            self
        }

        fn resolve(&self, refs: &[&str], context: PolicyContext, tls: bool, state: &mut OidcState) -> (PolicyBundle, Warnings) {
            let owner = PolicyOwner::new(ResourceKind::VirtualServer, &self.vs, &self.vs);
            let refs: Vec<_> = refs.iter().map(|r| PolicyReference::new(*r)).collect();
            let options = PolicyOptions { tls, secret_refs: &self.secrets };
            let mut warnings = Warnings::new();
            let bundle = resolve_policies(&owner, &refs, &self.policies, context, &options, state, &mut warnings);
            (bundle, warnings)
        }
    }

    fn vs_key() -> crate::domain::ResourceKey {
        crate::domain::ResourceKey::new(ResourceKind::VirtualServer, "default", "cafe")
    }

    fn rate_limit(dry_run: Option<bool>, reject_code: Option<i64>) -> PolicySpec {
        PolicySpec {
            rate_limit: Some(RateLimit {
                rate: "10r/s".to_string(),
                key: "$binary_remote_addr".to_string(),
                zone_size: "10M".to_string(),
                dry_run,
                reject_code,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn jwt(secret: &str) -> PolicySpec {
        PolicySpec {
            jwt_auth: Some(JwtSpec { realm: "api".to_string(), secret: secret.to_string(), token: String::new() }),
            ..Default::default()
        }
    }

    fn oidc() -> PolicySpec {
        PolicySpec {
            oidc: Some(OidcSpec { client_id: "client".to_string(), client_secret: "oidc-secret".to_string(), ..Default::default() }),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_policy_is_fatal() {
        let fixture = Fixture::new();
        let (bundle, warnings) = fixture.resolve(&["nope"], PolicyContext::Spec, false, &mut OidcState::new());

        assert_eq!(bundle, PolicyBundle::fatal());
        assert_eq!(bundle.error_return, Some(Return::new(500, "")));
        assert_eq!(warnings.get(&vs_key()), &["Policy default/nope is missing or invalid".to_string()]);
    }

    #[test]
    fn test_access_control_accumulates() {
        let ac = |allow: &[&str], deny: &[&str]| PolicySpec {
            access_control: Some(AccessControl {
                allow: allow.iter().map(|s| s.to_string()).collect(),
                deny: deny.iter().map(|s| s.to_string()).collect(),
            }),
            ..Default::default()
        };
        let fixture = Fixture::new().policy("allow", ac(&["10.0.0.0/8"], &[])).policy("deny", ac(&[], &["10.1.1.1"]));

        let (bundle, warnings) = fixture.resolve(&["allow", "deny"], PolicyContext::Route, false, &mut OidcState::new());

        assert_eq!(bundle.allow, vec!["10.0.0.0/8".to_string()]);
        assert_eq!(bundle.deny, vec!["10.1.1.1".to_string()]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_rate_limit_first_options_win() {
        let fixture = Fixture::new()
            .policy("rl-a", rate_limit(Some(true), None))
            .policy("rl-b", rate_limit(None, Some(429)));

        let (bundle, warnings) = fixture.resolve(&["rl-a", "rl-b"], PolicyContext::Spec, false, &mut OidcState::new());

        assert!(!bundle.is_fatal());
        assert_eq!(bundle.limit_req_zones.len(), 2);
        assert_eq!(bundle.limit_req_zones[0].zone_name, "pol_rl_default_rl-a_default_cafe");
        assert_eq!(bundle.limit_req_options, LimitReqOptions { dry_run: true, log_level: "error".to_string(), reject_code: 503 });

        let messages = warnings.get(&vs_key());
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            r#"RateLimit policy "default/rl-b" with limit request option dryRun=false is overridden to dryRun=true by the first policy reference in this context"#
        );
        assert!(messages[1].contains("rejectCode=429 is overridden to rejectCode=503"));
    }

    #[test]
    fn test_second_jwt_is_ignored() {
        let fixture = Fixture::new()
            .policy("jwt-a", jwt("jwk-a"))
            .policy("jwt-b", jwt("jwk-b"))
            .secret("jwk-a", SecretType::Jwk, &[("jwk", "{}")])
            .secret("jwk-b", SecretType::Jwk, &[("jwk", "{}")]);

        let (bundle, warnings) = fixture.resolve(&["jwt-a", "jwt-b"], PolicyContext::Spec, false, &mut OidcState::new());

        assert_eq!(bundle.jwt_auth.as_ref().map(|j| j.secret.as_str()), Some("/etc/nginx/secrets/default-jwk-a"));
        assert_eq!(
            warnings.get(&vs_key()),
            &[r#"Multiple jwt policies in the same context is not valid. JWT policy "default/jwt-b" will be ignored"#.to_string()]
        );
    }

    #[test]
    fn test_jwt_with_wrong_secret_type_is_fatal() {
        let fixture = Fixture::new().policy("jwt", jwt("ca")).secret("ca", SecretType::Ca, &[("ca.crt", "CA")]);

        let (bundle, warnings) = fixture.resolve(&["jwt"], PolicyContext::Spec, false, &mut OidcState::new());

        assert!(bundle.is_fatal());
        assert_eq!(
            warnings.get(&vs_key()),
            &[r#"JWT policy "default/jwt" references a Secret of an incorrect type "nginx.org/ca""#.to_string()]
        );
    }

    #[test]
    fn test_ingress_mtls_requires_tls_and_spec_context() {
        let spec = PolicySpec {
            ingress_mtls: Some(IngressMtlsSpec { client_cert_secret: "ca".to_string(), ..Default::default() }),
            ..Default::default()
        };
        let fixture = Fixture::new().policy("mtls", spec).secret("ca", SecretType::Ca, &[("ca.crt", "CA")]);

        let (bundle, _) = fixture.resolve(&["mtls"], PolicyContext::Spec, false, &mut OidcState::new());
        assert!(bundle.is_fatal());

        let (bundle, warnings) = fixture.resolve(&["mtls"], PolicyContext::Route, true, &mut OidcState::new());
        assert!(bundle.is_fatal());
        assert_eq!(warnings.get(&vs_key()), &["IngressMTLS policy is not allowed in the route context".to_string()]);

        let (bundle, warnings) = fixture.resolve(&["mtls"], PolicyContext::Spec, true, &mut OidcState::new());
        assert!(warnings.is_empty());
        assert_eq!(
            bundle.ingress_mtls,
            Some(IngressMtls {
                client_cert: "/etc/nginx/secrets/default-ca".to_string(),
                verify_client: "on".to_string(),
                verify_depth: 1,
            })
        );
    }

    #[test]
    fn test_egress_mtls_defaults() {
        let spec = PolicySpec { egress_mtls: Some(EgressMtlsSpec::default()), ..Default::default() };
        let fixture = Fixture::new().policy("egress", spec);

        let (bundle, _) = fixture.resolve(&["egress"], PolicyContext::Route, false, &mut OidcState::new());
        let egress = bundle.egress_mtls.unwrap();
        assert_eq!(egress.ciphers, "DEFAULT");
        assert_eq!(egress.protocols, "TLSv1 TLSv1.1 TLSv1.2");
        assert_eq!(egress.ssl_name, "$proxy_host");
        assert!(egress.session_reuse);
        assert_eq!(egress.verify_depth, 1);
    }

    #[test]
    fn test_oidc_is_one_per_cluster() {
        let fixture = Fixture::new()
            .policy("oidc-a", oidc())
            .policy("oidc-b", oidc())
            .secret("oidc-secret", SecretType::Oidc, &[(CLIENT_SECRET_KEY, "s3cr3t")]);
        let mut state = OidcState::new();

        let (bundle, _) = fixture.resolve(&["oidc-a"], PolicyContext::Spec, true, &mut state);
        assert!(bundle.oidc);
        assert_eq!(state.key(), "default/oidc-a");
        assert_eq!(state.oidc().map(|o| o.redirect_uri.as_str()), Some("/_codexch"));
        assert_eq!(state.oidc().map(|o| o.client_secret.as_str()), Some("s3cr3t"));

        // the same policy again from a route is fine
        let (bundle, warnings) = fixture.resolve(&["oidc-a"], PolicyContext::Route, true, &mut state);
        assert!(bundle.oidc);
        assert!(warnings.is_empty());

        let (bundle, warnings) = fixture.resolve(&["oidc-b"], PolicyContext::Route, true, &mut state);
        assert!(bundle.is_fatal());
        assert_eq!(
            warnings.get(&vs_key()),
            &[r#"Only one OIDC policy is allowed in a VirtualServer and its VirtualServerRoutes. Can't use "default/oidc-b". Use "default/oidc-a""#.to_string()]
        );
    }

    #[test]
    fn test_oidc_missing_secret() {
        let fixture = Fixture::new().policy("oidc", oidc());
        let (bundle, warnings) = fixture.resolve(&["oidc"], PolicyContext::Spec, true, &mut OidcState::new());

        assert!(bundle.is_fatal());
        assert_eq!(
            warnings.get(&vs_key()),
            &[r#"OIDC policy "default/oidc" references a non-existent Secret default/oidc-secret"#.to_string()]
        );
    }
}
