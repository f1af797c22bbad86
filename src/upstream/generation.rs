//! Upstream blocks for VirtualServers and their routes.

use std::collections::BTreeMap;

use crate::domain::{endpoints_key, external_name_svc_key, ObjectMeta, ResourceKey, ResourceKind, Upstream, VirtualServerEx};
use crate::model::http::{self, HealthCheck, Queue, SessionCookie, StatusMatch, UpstreamServer};
use crate::model::UpstreamLabels;
use crate::nginx::ServerConfig;
use crate::params::ConfigParams;
use crate::warnings::Warnings;

use super::endpoints::{build_servers, NGINX_502_SERVER};
use super::namer::UpstreamNamer;

/// Load balancing methods that cannot be combined with slow start
const INCOMPATIBLE_LB_METHODS_FOR_SLOW_START: &[&str] = &[
    "random",
    "ip_hash",
    "random two",
    "random two least_conn",
    "random two least_time=header",
    "random two least_time=last_byte",
];

const DEFAULT_QUEUE_TIMEOUT: &str = "60s";

/// Resource that declares an upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    VirtualServer,
    VirtualServerRoute,
}

impl OwnerKind {
    /// Value of the `resource_type` metric label
    pub fn resource_type(&self) -> &'static str {
        match self {
            OwnerKind::VirtualServer => "virtualserver",
            OwnerKind::VirtualServerRoute => "virtualserverroute",
        }
    }

    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            OwnerKind::VirtualServer => ResourceKind::VirtualServer,
            OwnerKind::VirtualServerRoute => ResourceKind::VirtualServerRoute,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UpstreamOwner<'a> {
    pub kind: OwnerKind,
    pub meta: &'a ObjectMeta,
}

impl<'a> UpstreamOwner<'a> {
    pub fn new(kind: OwnerKind, meta: &'a ObjectMeta) -> Self {
        Self { kind, meta }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::from_meta(self.kind.resource_kind(), self.meta)
    }

    fn labels(&self, service: &str) -> UpstreamLabels {
        UpstreamLabels::new(service, self.kind.resource_type(), &self.meta.name, &self.meta.namespace)
    }
}

/// Builds upstream blocks from the effective parameters
#[derive(Debug, Clone, Copy)]
pub struct UpstreamGenerator<'a> {
    params: &'a ConfigParams,
    is_plus: bool,
    is_resolver_configured: bool,
}

impl<'a> UpstreamGenerator<'a> {
    pub fn new(params: &'a ConfigParams, is_plus: bool, is_resolver_configured: bool) -> Self {
        Self { params, is_plus, is_resolver_configured }
    }

    /// Endpoints of an upstream. OSS gets the 502 placeholder for an empty
    /// list; an ExternalName service without a resolver is dropped with a
    /// warning on the owner.
    pub fn endpoints_for(
        &self,
        owner: &UpstreamOwner<'_>,
        upstream: &Upstream,
        vs_ex: &VirtualServerEx,
        warnings: &mut Warnings,
    ) -> Vec<String> {
        let namespace = &owner.meta.namespace;
        let key = endpoints_key(namespace, &upstream.service, &upstream.subselector, upstream.port);
        let endpoints = vs_ex.endpoints.get(&key).map(Vec::as_slice).unwrap_or_default();
        let placeholder = if self.is_plus { None } else { Some(NGINX_502_SERVER) };

        let list = build_servers(
            endpoints,
            vs_ex.is_external_name(namespace, &upstream.service),
            self.is_resolver_configured,
            placeholder,
        );
        if list.external_name_ignored {
            warnings.add(
                &owner.key(),
                format!(
                    "Type ExternalName service {} in upstream {} will be ignored. To use ExternaName services, a resolver must be configured in the ConfigMap",
                    upstream.service, upstream.name
                ),
            );
        }
        list.addresses
    }

    pub fn generate(
        &self,
        owner: &UpstreamOwner<'_>,
        name: &str,
        upstream: &Upstream,
        is_external_name: bool,
        endpoints: &[String],
        warnings: &mut Warnings,
    ) -> http::Upstream {
        let lb_method = lb_method(&upstream.lb_method, &self.params.lb_method);

        let mut generated = http::Upstream {
            name: name.to_string(),
            servers: endpoints.iter().map(UpstreamServer::new).collect(),
            resolve: is_external_name,
            keepalive: upstream.keepalive.unwrap_or(self.params.keepalive),
            max_fails: upstream.max_fails.unwrap_or(self.params.max_fails),
            max_conns: upstream.max_conns.unwrap_or(self.params.max_conns),
            fail_timeout: or_default(&upstream.fail_timeout, &self.params.fail_timeout),
            upstream_zone_size: self.params.upstream_zone_size.clone(),
            upstream_labels: owner.labels(&upstream.service),
            lb_method,
            ..Default::default()
        };

        if self.is_plus {
            generated.slow_start = self.slow_start_for_plus(owner, upstream, &generated.lb_method, warnings);
            generated.queue = upstream.queue.as_ref().map(|q| Queue {
                size: q.size,
                timeout: or_default(&q.timeout, DEFAULT_QUEUE_TIMEOUT),
            });
            generated.session_cookie = session_cookie(upstream);
        }

        generated
    }

    fn slow_start_for_plus(
        &self,
        owner: &UpstreamOwner<'_>,
        upstream: &Upstream,
        lb_method: &str,
        warnings: &mut Warnings,
    ) -> String {
        if upstream.slow_start.is_empty() {
            return String::new();
        }

        if INCOMPATIBLE_LB_METHODS_FOR_SLOW_START.contains(&lb_method) || lb_method.starts_with("hash") {
            warnings.add(
                &owner.key(),
                format!(
                    "Slow start will be disabled for upstream {} because lb method '{}' is incompatible with slow start",
                    upstream.name, lb_method
                ),
            );
            return String::new();
        }

        upstream.slow_start.clone()
    }
}

/// Resolve an upstream's method against the default. `round_robin` is the
/// proxy default and is rendered as nothing.
pub fn lb_method(method: &str, default: &str) -> String {
    match method {
        "" => default.to_string(),
        "round_robin" => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn session_cookie(upstream: &Upstream) -> Option<SessionCookie> {
    let sc = upstream.session_cookie.as_ref().filter(|sc| sc.enable)?;
    Some(SessionCookie {
        enable: true,
        name: sc.name.clone(),
        path: sc.path.clone(),
        expires: sc.expires.clone(),
        domain: sc.domain.clone(),
        http_only: sc.http_only,
        secure: sc.secure,
    })
}

pub fn upstream_has_keepalive(upstream: &Upstream, params: &ConfigParams) -> bool {
    upstream.keepalive.unwrap_or(params.keepalive) != 0
}

pub fn proxy_pass_protocol(tls: bool) -> &'static str {
    if tls {
        "https"
    } else {
        "http"
    }
}

pub fn status_match_name(upstream_name: &str) -> String {
    format!("{}_match", upstream_name)
}

pub fn status_match(upstream_name: &str, code: &str) -> StatusMatch {
    StatusMatch { name: status_match_name(upstream_name), code: code.to_string() }
}

/// Active health check for an upstream, if enabled
pub fn generate_health_check(upstream: &Upstream, upstream_name: &str, params: &ConfigParams) -> Option<HealthCheck> {
    let spec = upstream.health_check.as_ref().filter(|hc| hc.enable)?;

    let tls = spec.tls.as_ref().map(|t| t.enable).unwrap_or(upstream.tls.enable);
    let port = if spec.port > 0 { spec.port } else { i64::from(upstream.port) };

    let headers: BTreeMap<String, String> =
        spec.headers.iter().map(|h| (h.name.clone(), h.value.clone())).collect();

    Some(HealthCheck {
        name: upstream_name.to_string(),
        uri: or_default(&spec.path, "/"),
        interval: or_default(&spec.interval, "5s"),
        jitter: or_default(&spec.jitter, "0s"),
        fails: if spec.fails > 0 { spec.fails } else { 1 },
        passes: if spec.passes > 0 { spec.passes } else { 1 },
        port,
        proxy_pass: format!("{}://{}", proxy_pass_protocol(tls), upstream_name),
        proxy_connect_timeout: or_default(
            &spec.connect_timeout,
            &or_default(&upstream.proxy_connect_timeout, &params.proxy_connect_timeout),
        ),
        proxy_read_timeout: or_default(
            &spec.read_timeout,
            &or_default(&upstream.proxy_read_timeout, &params.proxy_read_timeout),
        ),
        proxy_send_timeout: or_default(
            &spec.send_timeout,
            &or_default(&upstream.proxy_send_timeout, &params.proxy_send_timeout),
        ),
        headers,
        match_: if spec.status_match.is_empty() { String::new() } else { status_match_name(upstream_name) },
    })
}

/// Per-server parameters sent along with a dynamic server-list push
pub fn server_config_for_plus(upstream: &http::Upstream) -> ServerConfig {
    if upstream.servers.is_empty() {
        return ServerConfig::default();
    }
    ServerConfig {
        max_fails: upstream.max_fails,
        max_conns: upstream.max_conns,
        fail_timeout: upstream.fail_timeout.clone(),
        slow_start: upstream.slow_start.clone(),
    }
}

/// Upstreams of a VirtualServer cluster as they would be pushed to a live
/// Plus instance. ExternalName services are resolved by the proxy itself
/// and are skipped.
pub fn create_upstreams_for_plus(vs_ex: &VirtualServerEx, params: &ConfigParams) -> Vec<http::Upstream> {
    let generator = UpstreamGenerator::new(params, true, false);
    // Warnings were already reported by the full compile
    let mut ignored = Warnings::new();
    let mut upstreams = Vec::new();

    let vs = &vs_ex.virtual_server;
    let mut owners = vec![(
        UpstreamOwner::new(OwnerKind::VirtualServer, &vs.metadata),
        UpstreamNamer::for_virtual_server(vs),
        &vs.spec.upstreams,
    )];
    for vsr in &vs_ex.virtual_server_routes {
        owners.push((
            UpstreamOwner::new(OwnerKind::VirtualServerRoute, &vsr.metadata),
            UpstreamNamer::for_virtual_server_route(vs, vsr),
            &vsr.spec.upstreams,
        ));
    }

    for (owner, namer, declared) in owners {
        for u in declared {
            let namespace = &owner.meta.namespace;
            if vs_ex.external_name_svcs.contains_key(&external_name_svc_key(namespace, &u.service)) {
                tracing::debug!(
                    service = %u.service,
                    "Service is Type ExternalName, skipping NGINX Plus endpoints update via API"
                );
                continue;
            }

            let key = endpoints_key(namespace, &u.service, &u.subselector, u.port);
            let endpoints = vs_ex.endpoints.get(&key).cloned().unwrap_or_default();
            let name = namer.name_for_upstream(&u.name);
            upstreams.push(generator.generate(&owner, &name, u, false, &endpoints, &mut ignored));
        }
    }

    upstreams
}
