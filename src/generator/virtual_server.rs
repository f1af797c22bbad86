//! VirtualServer compile pass.
//!
//! Upstreams are generated first for the VirtualServer and then for each
//! VirtualServerRoute, in declaration order. Routes are compiled next,
//! VirtualServer routes before subroutes, through one [`RoutingCompiler`]
//! so generated indices never collide.
//!
//! A VirtualServer route that delegates to a VirtualServerRoute compiles to
//! nothing itself. Its location snippets, error pages and policies are kept
//! for the subroutes of that VirtualServerRoute that do not define their own.

use std::collections::BTreeMap;

use crate::domain::{
    lookup_secret, ErrorPage, ObjectMeta, PolicyReference, ResourceKey, ResourceKind, SecretRefs, SecretType, Tls,
    Upstream, VirtualServerEx,
};
use crate::model::http::{self, HealthCheck, LimitReqZone, Server, Ssl, StatusMatch, TlsRedirect, VirtualServerConfig};
use crate::params::ConfigParams;
use crate::policy::{
    dedupe_limit_req_zones, resolve_policies, OidcState, PolicyBundle, PolicyContext, PolicyOptions, PolicyOwner,
};
use crate::routing::{LocationSettings, RouteNode, RouteScope, RoutingCompiler, VariableNamer};
use crate::upstream::{generate_health_check, status_match, OwnerKind, UpstreamGenerator, UpstreamNamer, UpstreamOwner};
use crate::warnings::Warnings;

use super::{generate_snippets, CompileContext, PEM_FILE_FOR_MISSING_TLS_SECRET};

/// What a delegating VirtualServer route hands down to its subroutes
#[derive(Debug, Default, Clone, Copy)]
struct Delegation<'a> {
    location_snippets: &'a str,
    error_pages: Option<(&'a [ErrorPage], usize)>,
    policies: &'a [PolicyReference],
}

/// Upstream blocks plus their health checks, in generation order
#[derive(Debug, Default)]
struct UpstreamSet {
    upstreams: Vec<http::Upstream>,
    health_checks: Vec<HealthCheck>,
    status_matches: Vec<StatusMatch>,
}

impl UpstreamSet {
    /// Generate the upstreams of one owner and index their specs by short name
    fn add_owner(
        &mut self,
        generator: &UpstreamGenerator<'_>,
        params: &ConfigParams,
        owner: &UpstreamOwner<'_>,
        namer: &UpstreamNamer,
        specs: &[Upstream],
        vs_ex: &VirtualServerEx,
        warnings: &mut Warnings,
    ) -> BTreeMap<String, Upstream> {
        let mut by_name = BTreeMap::new();

        for spec in specs {
            let name = namer.name_for_upstream(&spec.name);
            let endpoints = generator.endpoints_for(owner, spec, vs_ex, warnings);
            let is_external_name = vs_ex.is_external_name(&owner.meta.namespace, &spec.service);
            self.upstreams.push(generator.generate(owner, &name, spec, is_external_name, &endpoints, warnings));

            if let Some(hc) = generate_health_check(spec, &name, params) {
                self.health_checks.push(hc);
                if let Some(code) = spec.health_check.as_ref().map(|h| &h.status_match).filter(|c| !c.is_empty()) {
                    self.status_matches.push(status_match(&name, code));
                }
            }

            by_name.insert(spec.name.clone(), spec.clone());
        }

        by_name
    }
}

/// Compile a VirtualServer and its VirtualServerRoutes
pub fn generate_virtual_server_config(vs_ex: &VirtualServerEx, ctx: &CompileContext<'_>) -> (VirtualServerConfig, Warnings) {
    let mut warnings = Warnings::new();
    let vs = &vs_ex.virtual_server;
    let vs_meta = &vs.metadata;
    let vs_key = ResourceKey::from_meta(ResourceKind::VirtualServer, vs_meta);
    let params = ctx.params;
    let enable_snippets = ctx.static_params.enable_snippets;

    let ssl = ssl_config(&vs_key, vs.spec.tls.as_ref(), &vs_meta.namespace, &vs_ex.secret_refs, params, &mut warnings);
    let tls_redirect = tls_redirect_config(vs.spec.tls.as_ref());

    let options = PolicyOptions { tls: ssl.is_some(), secret_refs: &vs_ex.secret_refs };
    let mut oidc_state = OidcState::new();
    let vs_owner = PolicyOwner::new(ResourceKind::VirtualServer, vs_meta, vs_meta);
    let spec_policies = resolve_policies(
        &vs_owner,
        &vs.spec.policies,
        &vs_ex.policies,
        PolicyContext::Spec,
        &options,
        &mut oidc_state,
        &mut warnings,
    );
    let mut limit_req_zones = spec_policies.limit_req_zones.clone();

    let generator = UpstreamGenerator::new(params, ctx.is_plus, ctx.is_resolver_configured);
    let mut upstream_set = UpstreamSet::default();

    let vs_namer = UpstreamNamer::for_virtual_server(vs);
    let vs_upstreams = upstream_set.add_owner(
        &generator,
        params,
        &UpstreamOwner::new(OwnerKind::VirtualServer, vs_meta),
        &vs_namer,
        &vs.spec.upstreams,
        vs_ex,
        &mut warnings,
    );

    let mut vsr_upstreams = Vec::with_capacity(vs_ex.virtual_server_routes.len());
    for vsr in &vs_ex.virtual_server_routes {
        let namer = UpstreamNamer::for_virtual_server_route(vs, vsr);
        let by_name = upstream_set.add_owner(
            &generator,
            params,
            &UpstreamOwner::new(OwnerKind::VirtualServerRoute, &vsr.metadata),
            &namer,
            &vsr.spec.upstreams,
            vs_ex,
            &mut warnings,
        );
        vsr_upstreams.push((namer, by_name));
    }

    let mut compiler = RoutingCompiler::new(VariableNamer::new(vs));
    let mut delegations: BTreeMap<String, Delegation<'_>> = BTreeMap::new();

    let spec_oidc = spec_policies.oidc;

    for route in &vs.spec.routes {
        let error_page_index = compiler.add_error_pages(route.error_pages());

        if !route.route.is_empty() {
            let delegation = delegations.entry(delegation_key(&route.route, vs_meta)).or_default();
            if !route.location_snippets.is_empty() {
                delegation.location_snippets = &route.location_snippets;
            }
            if !route.error_pages().is_empty() {
                delegation.error_pages = Some((route.error_pages(), error_page_index));
            }
            if !route.policies.is_empty() {
                delegation.policies = &route.policies;
            }
            continue;
        }

        let mut bundle = resolve_policies(
            &vs_owner,
            &route.policies,
            &vs_ex.policies,
            PolicyContext::Route,
            &options,
            &mut oidc_state,
            &mut warnings,
        );
        inherit_spec_policies(&mut bundle, spec_oidc, &mut limit_req_zones);

        let Some(node) = RouteNode::from_route(route) else {
            tracing::debug!(vs = %vs_key, path = %route.path, "route has no action, splits or matches");
            continue;
        };
        let snippets = generate_snippets(enable_snippets, &route.location_snippets, &params.location_snippets);
        let scope = RouteScope {
            namer: &vs_namer,
            upstreams: &vs_upstreams,
            location: LocationSettings {
                params,
                error_pages: route.error_pages(),
                error_page_index,
                snippets: &snippets,
                original_path: &route.path,
                vsr: None,
            },
        };
        let range = compiler.compile_route(&route.path, &node, &scope);
        bundle.apply_to_locations(&mut compiler.locations_mut()[range]);
    }

    for (vsr, (namer, upstreams)) in vs_ex.virtual_server_routes.iter().zip(&vsr_upstreams) {
        let delegation = delegations.get(&vsr.metadata.key()).copied().unwrap_or_default();
        let vsr_owner = PolicyOwner::new(ResourceKind::VirtualServerRoute, &vsr.metadata, vs_meta);

        for route in &vsr.spec.subroutes {
            let mut error_page_index = compiler.add_error_pages(route.error_pages());
            let mut error_pages = route.error_pages();
            if route.error_pages.is_none() {
                if let Some((pages, index)) = delegation.error_pages {
                    error_pages = pages;
                    error_page_index = index;
                }
            }

            let location_snippets =
                if route.location_snippets.is_empty() { delegation.location_snippets } else { route.location_snippets.as_str() };

            let (owner, refs, context) = if route.policies.is_empty() {
                (&vs_owner, delegation.policies, PolicyContext::Route)
            } else {
                (&vsr_owner, route.policies.as_slice(), PolicyContext::Subroute)
            };
            let mut bundle =
                resolve_policies(owner, refs, &vs_ex.policies, context, &options, &mut oidc_state, &mut warnings);
            inherit_spec_policies(&mut bundle, spec_oidc, &mut limit_req_zones);

            let Some(node) = RouteNode::from_route(route) else {
                tracing::debug!(vsr = %vsr_owner.key, path = %route.path, "subroute has no action, splits or matches");
                continue;
            };
            let snippets = generate_snippets(enable_snippets, location_snippets, &params.location_snippets);
            let scope = RouteScope {
                namer,
                upstreams,
                location: LocationSettings {
                    params,
                    error_pages,
                    error_page_index,
                    snippets: &snippets,
                    original_path: &route.path,
                    vsr: Some((&vsr.metadata.name, &vsr.metadata.namespace)),
                },
            };
            let range = compiler.compile_route(&route.path, &node, &scope);
            bundle.apply_to_locations(&mut compiler.locations_mut()[range]);
        }
    }

    let routing = compiler.finish();
    let UpstreamSet { upstreams, health_checks, status_matches } = upstream_set;

    let config = VirtualServerConfig {
        http_snippets: generate_snippets(enable_snippets, &vs.spec.http_snippets, &[String::new()]),
        limit_req_zones: dedupe_limit_req_zones(limit_req_zones),
        maps: routing.maps,
        split_clients: routing.split_clients,
        status_matches,
        upstreams,
        server: Server {
            server_name: vs.spec.host.clone(),
            status_zone: vs.spec.host.clone(),
            proxy_protocol: params.proxy_protocol,
            ssl,
            server_tokens: params.server_tokens.clone(),
            real_ip_header: params.real_ip_header.clone(),
            set_real_ip_from: params.set_real_ip_from.clone(),
            real_ip_recursive: params.real_ip_recursive,
            snippets: generate_snippets(enable_snippets, &vs.spec.server_snippets, &params.server_snippets),
            internal_redirect_locations: routing.internal_redirect_locations,
            locations: routing.locations,
            error_page_locations: routing.error_page_locations,
            return_locations: routing.return_locations,
            health_checks,
            tls_redirect,
            tls_passthrough: ctx.static_params.tls_passthrough,
            allow: spec_policies.allow,
            deny: spec_policies.deny,
            limit_req_options: spec_policies.limit_req_options,
            limit_reqs: spec_policies.limit_reqs,
            jwt_auth: spec_policies.jwt_auth,
            ingress_mtls: spec_policies.ingress_mtls,
            egress_mtls: spec_policies.egress_mtls,
            oidc: oidc_state.oidc().cloned(),
            policies_error_return: spec_policies.error_return,
            vs_namespace: vs_meta.namespace.clone(),
            vs_name: vs_meta.name.clone(),
        },
    };

    tracing::debug!(
        vs = %vs_key,
        upstreams = config.upstreams.len(),
        locations = config.server.locations.len(),
        warnings = warnings.len(),
        "compiled VirtualServer"
    );

    (config, warnings)
}

/// TLS termination for a VirtualServer. A wrong-typed or invalid secret
/// falls back to the default pem with no usable ciphers.
fn ssl_config(
    owner: &ResourceKey,
    tls: Option<&Tls>,
    namespace: &str,
    secret_refs: &SecretRefs,
    params: &ConfigParams,
    warnings: &mut Warnings,
) -> Option<Ssl> {
    let tls = tls.filter(|t| !t.secret.is_empty())?;
    let secret = lookup_secret(secret_refs, &format!("{}/{}", namespace, tls.secret));

    let (name, ciphers) = if let Some(actual) = secret.secret_type().filter(|t| **t != SecretType::Tls) {
        warnings.add(
            owner,
            format!(
                "TLS secret {} is of a wrong type '{}', must be '{}'",
                tls.secret,
                actual,
                SecretType::Tls
            ),
        );
        (PEM_FILE_FOR_MISSING_TLS_SECRET.to_string(), "NULL".to_string())
    } else if let Some(error) = &secret.error {
        warnings.add(owner, format!("TLS secret {} is invalid: {}", tls.secret, error));
        (PEM_FILE_FOR_MISSING_TLS_SECRET.to_string(), "NULL".to_string())
    } else {
        (secret.path.clone(), String::new())
    };

    Some(Ssl { http2: params.http2, certificate: name.clone(), certificate_key: name, ciphers })
}

fn tls_redirect_config(tls: Option<&Tls>) -> Option<TlsRedirect> {
    let redirect = tls?.redirect.as_ref().filter(|r| r.enable)?;
    Some(TlsRedirect {
        code: redirect.code.unwrap_or(301),
        based_on: if redirect.based_on == "x-forwarded-proto" {
            "$http_x_forwarded_proto".to_string()
        } else {
            "$scheme".to_string()
        },
    })
}

/// Route policies carry the VirtualServer's OIDC flag. Their rate-limit
/// zones are collected for the whole server.
fn inherit_spec_policies(bundle: &mut PolicyBundle, spec_oidc: bool, zones: &mut Vec<LimitReqZone>) {
    if spec_oidc {
        bundle.oidc = true;
    }
    zones.extend(bundle.limit_req_zones.iter().cloned());
}

/// Key of the VirtualServerRoute a delegating route points at
fn delegation_key(route: &str, vs_meta: &ObjectMeta) -> String {
    if route.contains('/') {
        route.to_string()
    } else {
        format!("{}/{}", vs_meta.namespace, route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::{AccessControl, PolicySpec};
    use crate::domain::{
        Action, Policy, Route, Secret, SecretReference, VirtualServer, VirtualServerRoute, VirtualServerRouteSpec,
        VirtualServerSpec,
    };
    use crate::params::StaticConfigParams;

    fn cafe() -> VirtualServerEx {
        let mut vs_ex = VirtualServerEx::new(VirtualServer {
            metadata: ObjectMeta::new("default", "cafe"),
            spec: VirtualServerSpec {
                host: "cafe.example.com".to_string(),
                upstreams: vec![Upstream::new("tea", "tea-svc", 80), Upstream::new("coffee", "coffee-svc", 80)],
                routes: vec![
                    Route::with_action("/tea", Action::pass("tea")),
                    Route::with_action("/coffee", Action::pass("coffee")),
                ],
                ..Default::default()
            },
        });
        vs_ex.endpoints.insert("default/tea-svc:80".to_string(), vec!["10.0.0.1:80".to_string()]);
        vs_ex
    }

    fn compile(vs_ex: &VirtualServerEx, is_plus: bool) -> (VirtualServerConfig, Warnings) {
        let params = ConfigParams::default();
        let static_params = StaticConfigParams::default();
        let ctx = CompileContext::new(&params, &static_params, is_plus);
        generate_virtual_server_config(vs_ex, &ctx)
    }

    fn vs_key() -> ResourceKey {
        ResourceKey::new(ResourceKind::VirtualServer, "default", "cafe")
    }

    #[test]
    fn test_plain_routes() {
        let (config, warnings) = compile(&cafe(), false);

        assert!(warnings.is_empty());
        assert_eq!(config.server.server_name, "cafe.example.com");
        assert_eq!(config.server.status_zone, "cafe.example.com");
        assert_eq!(config.http_snippets, vec![String::new()]);
        assert_eq!(config.upstreams.len(), 2);
        assert_eq!(config.upstreams[0].name, "vs_default_cafe_tea");
        assert_eq!(config.upstreams[0].servers[0].address, "10.0.0.1:80");
        // OSS with no endpoints gets the 502 placeholder
        assert_eq!(config.upstreams[1].servers[0].address, crate::upstream::NGINX_502_SERVER);
        assert_eq!(config.upstreams[1].upstream_labels.resource_type, "virtualserver");

        let paths: Vec<_> = config.server.locations.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["/tea", "/coffee"]);
        assert!(config.server.ssl.is_none());
    }

    #[test]
    fn test_tls_secret_of_wrong_type() {
        let mut vs_ex = cafe();
        vs_ex.virtual_server.spec.tls = Some(Tls { secret: "cafe-secret".to_string(), redirect: None });
        let secret = Secret::new(ObjectMeta::new("default", "cafe-secret"), SecretType::Ca).with_data("ca.crt", "CA");
        vs_ex.secret_refs.insert("default/cafe-secret".to_string(), SecretReference::from_secret(secret, "/etc/nginx/secrets/default-cafe-secret"));

        let (config, warnings) = compile(&vs_ex, false);

        let ssl = config.server.ssl.unwrap();
        assert_eq!(ssl.certificate, PEM_FILE_FOR_MISSING_TLS_SECRET);
        assert_eq!(ssl.ciphers, "NULL");
        assert_eq!(
            warnings.get(&vs_key()),
            &["TLS secret cafe-secret is of a wrong type 'nginx.org/ca', must be 'kubernetes.io/tls'".to_string()]
        );
    }

    #[test]
    fn test_tls_redirect() {
        let tls = Tls {
            secret: String::new(),
            redirect: Some(crate::domain::TlsRedirect {
                enable: true,
                code: None,
                based_on: "x-forwarded-proto".to_string(),
            }),
        };
        assert_eq!(
            tls_redirect_config(Some(&tls)),
            Some(TlsRedirect { code: 301, based_on: "$http_x_forwarded_proto".to_string() })
        );
        assert_eq!(tls_redirect_config(None), None);
    }

    #[test]
    fn test_missing_route_policy_only_affects_its_route() {
        let mut vs_ex = cafe();
        vs_ex.virtual_server.spec.routes[0].policies = vec![PolicyReference::new("missing")];

        let (config, warnings) = compile(&vs_ex, false);

        let tea = &config.server.locations[0];
        let coffee = &config.server.locations[1];
        assert_eq!(tea.policies_error_return.as_ref().map(|r| r.code), Some(500));
        assert!(coffee.policies_error_return.is_none());
        assert_eq!(warnings.get(&vs_key()), &["Policy default/missing is missing or invalid".to_string()]);
    }

    #[test]
    fn test_subroutes_inherit_delegating_route_settings() {
        let mut vs_ex = cafe();
        let allow = Policy::new(
            ObjectMeta::new("default", "allow"),
            PolicySpec {
                access_control: Some(AccessControl { allow: vec!["10.0.0.0/8".to_string()], deny: Vec::new() }),
                ..Default::default()
            },
        );
        vs_ex.policies.insert("default/allow".to_string(), allow);
        vs_ex.virtual_server.spec.routes[1] = Route {
            path: "/coffee".to_string(),
            route: "coffee".to_string(),
            policies: vec![PolicyReference::new("allow")],
            ..Default::default()
        };
        vs_ex.virtual_server_routes.push(VirtualServerRoute {
            metadata: ObjectMeta::new("default", "coffee"),
            spec: VirtualServerRouteSpec {
                host: "cafe.example.com".to_string(),
                upstreams: vec![Upstream::new("latte", "latte-svc", 80)],
                subroutes: vec![Route::with_action("/coffee/latte", Action::pass("latte"))],
                ..Default::default()
            },
        });

        let (config, warnings) = compile(&vs_ex, false);

        assert!(warnings.is_empty());
        assert_eq!(config.upstreams[2].name, "vs_default_cafe_vsr_default_coffee_latte");
        assert_eq!(config.upstreams[2].upstream_labels.resource_type, "virtualserverroute");

        let latte = &config.server.locations[1];
        assert_eq!(latte.path, "/coffee/latte");
        assert!(latte.is_vsr);
        assert_eq!(latte.vsr_name, "coffee");
        assert_eq!(latte.allow, vec!["10.0.0.0/8".to_string()]);
        assert_eq!(latte.proxy_ssl_name, "latte-svc.default.svc");
    }
}
