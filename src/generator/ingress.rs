//! Ingress compile pass, standalone and mergeable.
//!
//! Each valid rule host becomes one server. Upstreams are shared across
//! servers by name and emitted sorted. A mergeable group compiles the
//! master for its server-level settings and the minions for locations.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{
    lookup_secret, HealthProbe, IngressBackend, IngressEx, MergeableIngresses, ObjectMeta, PathType, ResourceKey,
    ResourceKind, SecretType,
};
use crate::model::ingress::{
    HealthCheck, IngressMeta, IngressNginxConfig, JwtAuth, JwtRedirectLocation, Location, Server, Upstream,
    UpstreamServer,
};
use crate::model::UpstreamLabels;
use crate::params::annotations::{
    grpc_services, rewrites, session_persistence_services, ssl_services, websocket_services,
};
use crate::params::{
    filter_master_annotations, filter_minion_annotations, merge_master_annotations_into_minion, parse_annotations,
    rejected_to_warnings, ConfigParams,
};
use crate::upstream::{ingress_upstream_name, jwt_redirect_location_name, proxy_ssl_name, split_address};
use crate::warnings::Warnings;

use super::{CompileContext, PEM_FILE_FOR_MISSING_TLS_SECRET, PEM_FILE_FOR_WILDCARD_TLS_SECRET};

/// Per-service annotation sets of one Ingress
#[derive(Debug, Default)]
struct Services {
    websocket: BTreeSet<String>,
    ssl: BTreeSet<String>,
    grpc: BTreeSet<String>,
    rewrites: BTreeMap<String, String>,
    sticky: BTreeMap<String, String>,
}

impl Services {
    fn from_ingress(ingress_ex: &IngressEx) -> Self {
        Self {
            websocket: websocket_services(ingress_ex),
            ssl: ssl_services(ingress_ex),
            grpc: grpc_services(ingress_ex),
            rewrites: rewrites(ingress_ex),
            sticky: session_persistence_services(ingress_ex),
        }
    }
}

/// Compile a standalone Ingress
pub fn generate_ingress_config(ingress_ex: &IngressEx, ctx: &CompileContext<'_>) -> (IngressNginxConfig, Warnings) {
    generate(ingress_ex, false, ctx)
}

/// Log annotations stripped from a master or minion and return the same
/// text for the resource's warnings
fn stripped_annotations_message(meta: &ObjectMeta, role: &str, removed: &[String]) -> Option<String> {
    if removed.is_empty() {
        return None;
    }
    let message = format!(
        "Ingress Resource {}/{} with the annotation 'nginx.org/mergeable-ingress-type' set to '{}' cannot contain the '{}' annotation(s). They will be ignored",
        meta.namespace,
        meta.name,
        role,
        removed.join(",")
    );
    tracing::error!("{}", message);
    Some(message)
}

/// Compile a master Ingress with its minions into one config.
///
/// The master contributes its first server without locations; every minion
/// contributes locations, health checks and JWT redirect locations.
pub fn generate_mergeable_config(
    mergeable: &MergeableIngresses,
    ctx: &CompileContext<'_>,
) -> (IngressNginxConfig, Warnings) {
    let mut master = mergeable.master.clone();
    let master_meta = &mut master.ingress.metadata;
    let removed = filter_master_annotations(&mut master_meta.annotations);
    let master_removed = stripped_annotations_message(master_meta, "master", &removed);

    let (master_config, mut warnings) = generate(&master, false, ctx);
    if let Some(message) = master_removed {
        warnings.add(&ResourceKey::from_meta(ResourceKind::Ingress, &master.ingress.metadata), message);
    }

    let mut master_server = master_config.servers.first().cloned().unwrap_or_default();
    master_server.locations.clear();

    let mut upstreams = master_config.upstreams;
    let mut locations = Vec::new();
    let mut health_checks = BTreeMap::new();

    for original in &mergeable.minions {
        let mut minion = original.clone();
        // "/" must come from the master only
        minion.ingress.spec.backend = None;

        let minion_meta = &mut minion.ingress.metadata;
        merge_master_annotations_into_minion(&mut minion_meta.annotations, &master.ingress.metadata.annotations);
        let removed = filter_minion_annotations(&mut minion_meta.annotations);
        if let Some(message) = stripped_annotations_message(minion_meta, "minion", &removed) {
            warnings.add(&ResourceKey::from_meta(ResourceKind::Ingress, minion_meta), message);
        }

        let (minion_config, minion_warnings) = generate(&minion, true, ctx);
        warnings.extend(minion_warnings);

        for server in minion_config.servers {
            for mut location in server.locations {
                location.minion_ingress = Some(minion_config.ingress.clone());
                locations.push(location);
            }
            health_checks.extend(server.health_checks);
            master_server.jwt_redirect_locations.extend(server.jwt_redirect_locations);
        }

        upstreams.extend(minion_config.upstreams);
    }

    master_server.health_checks = health_checks;
    master_server.locations = locations;

    let config = IngressNginxConfig {
        upstreams,
        servers: vec![master_server],
        keepalive: master_config.keepalive,
        ingress: master_config.ingress,
    };

    tracing::debug!(
        ingress = %mergeable.master.key(),
        minions = mergeable.minions.len(),
        warnings = warnings.len(),
        "compiled mergeable Ingress"
    );

    (config, warnings)
}

fn generate(ingress_ex: &IngressEx, is_minion: bool, ctx: &CompileContext<'_>) -> (IngressNginxConfig, Warnings) {
    let ingress = &ingress_ex.ingress;
    let meta = &ingress.metadata;
    let owner = ResourceKey::from_meta(ResourceKind::Ingress, meta);

    let (params, rejected) = parse_annotations(ingress_ex, ctx.params, ctx.is_plus);
    let mut warnings = rejected_to_warnings(&owner, &rejected);

    let mut services = Services::from_ingress(ingress_ex);
    if !services.grpc.is_empty() && !params.http2 {
        tracing::error!(
            "Ingress {}/{}: annotation nginx.org/grpc-services requires HTTP2, ignoring",
            meta.namespace,
            meta.name
        );
        services.grpc.clear();
    }

    let builder = UpstreamBuilder { ingress_ex, params: &params, ctx, sticky: &services.sticky };
    let mut upstreams: BTreeMap<String, Upstream> = BTreeMap::new();

    let default_backend = ingress.spec.backend.as_ref();
    if let Some(backend) = default_backend {
        let name = ingress_upstream_name(ingress, "", backend);
        upstreams.insert(name.clone(), builder.create(&name, backend));
    }

    let mut servers = Vec::new();

    for rule in &ingress.spec.rules {
        if !ingress_ex.valid_hosts.contains(&rule.host) {
            continue;
        }
        let paths = rule.http.as_ref().map(|http| http.paths.as_slice()).unwrap_or_default();

        let mut server = Server {
            name: rule.host.clone(),
            server_tokens: params.server_tokens.clone(),
            http2: params.http2,
            redirect_to_https: params.redirect_to_https,
            ssl_redirect: params.ssl_redirect,
            proxy_protocol: params.proxy_protocol,
            hsts: params.hsts,
            hsts_max_age: params.hsts_max_age,
            hsts_include_subdomains: params.hsts_include_subdomains,
            hsts_behind_proxy: params.hsts_behind_proxy,
            status_zone: rule.host.clone(),
            real_ip_header: params.real_ip_header.clone(),
            set_real_ip_from: params.set_real_ip_from.clone(),
            real_ip_recursive: params.real_ip_recursive,
            proxy_hide_headers: params.proxy_hide_headers.clone(),
            proxy_pass_headers: params.proxy_pass_headers.clone(),
            server_snippets: params.server_snippets.clone(),
            ports: params.ports.clone(),
            ssl_ports: params.ssl_ports.clone(),
            tls_passthrough: ctx.static_params.tls_passthrough,
            ..Default::default()
        };

        add_ssl_config(&mut server, &owner, ingress_ex, &rule.host, ctx.is_wildcard_enabled, &mut warnings);

        if !is_minion && !params.jwt_key.is_empty() {
            let (jwt_auth, redirect) = generate_jwt_config(&owner, ingress_ex, &params, &mut warnings);
            server.jwt_auth = Some(jwt_auth);
            server.jwt_redirect_locations.extend(redirect);
        }

        let mut grpc_only =
            !services.grpc.is_empty() && paths.iter().all(|p| services.grpc.contains(&p.backend.service_name));
        let mut root_location = false;

        for path in paths {
            if is_minion && !ingress_ex.valid_minion_paths.contains(&path.path) {
                continue;
            }

            let name = ingress_upstream_name(ingress, &rule.host, &path.backend);
            if let Some(hc) = builder.health_check(&name, &path.backend) {
                server.health_checks.insert(name.clone(), hc);
            }
            let upstream = upstreams.entry(name.clone()).or_insert_with(|| builder.create(&name, &path.backend));

            let mut location = create_location(
                path_or_default(&path.path),
                path.path_type,
                upstream,
                &params,
                &services,
                &path.backend,
                &meta.namespace,
            );

            if is_minion && !params.jwt_key.is_empty() {
                let (jwt_auth, redirect) = generate_jwt_config(&owner, ingress_ex, &params, &mut warnings);
                location.jwt_auth = Some(jwt_auth);
                server.jwt_redirect_locations.extend(redirect);
            }

            if location.path == "/" {
                root_location = true;
            }
            server.locations.push(location);
        }

        if let Some(backend) = default_backend.filter(|_| !root_location) {
            let name = ingress_upstream_name(ingress, "", backend);
            if let Some(upstream) = upstreams.get(&name) {
                server.locations.push(create_location(
                    "/",
                    Some(PathType::Prefix),
                    upstream,
                    &params,
                    &services,
                    backend,
                    &meta.namespace,
                ));
            }
            if let Some(hc) = builder.health_check(&name, backend) {
                server.health_checks.insert(name, hc);
            }
            if !services.grpc.contains(&backend.service_name) {
                grpc_only = false;
            }
        }

        server.grpc_only = grpc_only;
        servers.push(server);
    }

    let config = IngressNginxConfig {
        upstreams: upstreams.into_values().collect(),
        servers,
        keepalive: if params.keepalive > 0 { params.keepalive.to_string() } else { String::new() },
        ingress: IngressMeta {
            name: meta.name.clone(),
            namespace: meta.namespace.clone(),
            annotations: meta.annotations.clone(),
        },
    };

    tracing::debug!(
        ingress = %ingress_ex.key(),
        minion = is_minion,
        servers = config.servers.len(),
        upstreams = config.upstreams.len(),
        warnings = warnings.len(),
        "compiled Ingress"
    );

    (config, warnings)
}

/// Builds upstream blocks and health checks for one Ingress
struct UpstreamBuilder<'a> {
    ingress_ex: &'a IngressEx,
    params: &'a ConfigParams,
    ctx: &'a CompileContext<'a>,
    sticky: &'a BTreeMap<String, String>,
}

impl UpstreamBuilder<'_> {
    fn create(&self, name: &str, backend: &IngressBackend) -> Upstream {
        let meta = &self.ingress_ex.ingress.metadata;
        let labels = UpstreamLabels::new(&backend.service_name, "ingress", &meta.name, &meta.namespace);
        let key = backend.key();

        let mut upstream = if self.ctx.is_plus {
            let (queue, queue_timeout) = self.queue(&key);
            Upstream {
                name: name.to_string(),
                sticky_cookie: self.sticky.get(&backend.service_name).cloned().unwrap_or_default(),
                queue,
                queue_timeout,
                upstream_labels: labels,
                ..Default::default()
            }
        } else {
            let mut upstream = Upstream::with_default_server(name);
            if self.ctx.static_params.enable_latency_metrics {
                upstream.upstream_labels = labels;
            }
            upstream
        };

        if let Some(endpoints) = self.ingress_ex.endpoints.get(&key) {
            let is_external_name = self.ingress_ex.external_name_svcs.contains_key(&backend.service_name);
            let endpoints: &[String] = if is_external_name && !self.ctx.is_resolver_configured {
                tracing::warn!(
                    "A resolver must be configured for Type ExternalName service {}, no upstream servers will be created",
                    backend.service_name
                );
                &[]
            } else {
                endpoints
            };

            let servers: Vec<UpstreamServer> = endpoints
                .iter()
                .map(|endpoint| {
                    let (address, port) = split_address(endpoint);
                    UpstreamServer {
                        address: address.to_string(),
                        port: port.to_string(),
                        max_fails: self.params.max_fails,
                        max_conns: self.params.max_conns,
                        fail_timeout: self.params.fail_timeout.clone(),
                        slow_start: self.params.slow_start.clone(),
                        resolve: is_external_name,
                    }
                })
                .collect();
            if !servers.is_empty() {
                upstream.upstream_servers = servers;
            }
        }

        upstream.lb_method = self.params.lb_method.clone();
        upstream.upstream_zone_size = self.params.upstream_zone_size.clone();
        upstream
    }

    /// Mandatory health checks start every server unhealthy, so requests
    /// are queued instead of failed while the first checks run.
    fn queue(&self, backend_key: &str) -> (i64, i64) {
        let params = self.params;
        if params.health_check_enabled && params.health_check_mandatory && params.health_check_mandatory_queue > 0 {
            if let Some(probe) = self.ingress_ex.health_checks.get(backend_key) {
                return (params.health_check_mandatory_queue, i64::from(probe.timeout_seconds));
            }
        }
        (0, 0)
    }

    fn health_check(&self, upstream_name: &str, backend: &IngressBackend) -> Option<HealthCheck> {
        if !self.params.health_check_enabled {
            return None;
        }
        let probe = self.ingress_ex.health_checks.get(&backend.key())?;
        Some(create_health_check(probe, upstream_name, self.params))
    }
}

fn create_health_check(probe: &HealthProbe, upstream_name: &str, params: &ConfigParams) -> HealthCheck {
    HealthCheck {
        upstream_name: upstream_name.to_string(),
        uri: probe.http_get.path.clone(),
        interval: probe.period_seconds,
        fails: probe.failure_threshold,
        passes: probe.success_threshold,
        scheme: probe.http_get.scheme.to_lowercase(),
        mandatory: params.health_check_mandatory,
        headers: probe.http_get.http_headers.iter().map(|h| (h.name.clone(), h.value.clone())).collect(),
        timeout_seconds: i64::from(probe.timeout_seconds),
    }
}

fn create_location(
    path: &str,
    path_type: Option<PathType>,
    upstream: &Upstream,
    params: &ConfigParams,
    services: &Services,
    backend: &IngressBackend,
    namespace: &str,
) -> Location {
    let service = &backend.service_name;
    Location {
        path: ingress_path(path, path_type),
        upstream: upstream.clone(),
        proxy_connect_timeout: params.proxy_connect_timeout.clone(),
        proxy_read_timeout: params.proxy_read_timeout.clone(),
        proxy_send_timeout: params.proxy_send_timeout.clone(),
        client_max_body_size: params.client_max_body_size.clone(),
        websocket: services.websocket.contains(service),
        rewrite: services.rewrites.get(service).cloned().unwrap_or_default(),
        ssl: services.ssl.contains(service),
        grpc: services.grpc.contains(service),
        proxy_buffering: params.proxy_buffering,
        proxy_buffers: params.proxy_buffers.clone(),
        proxy_buffer_size: params.proxy_buffer_size.clone(),
        proxy_max_temp_file_size: params.proxy_max_temp_file_size.clone(),
        proxy_ssl_name: proxy_ssl_name(service, namespace),
        location_snippets: params.location_snippets.clone(),
        service_name: service.clone(),
        jwt_auth: None,
        minion_ingress: None,
    }
}

fn ingress_path(path: &str, path_type: Option<PathType>) -> String {
    match path_type {
        Some(PathType::Exact) => format!("= {}", path),
        _ => path.to_string(),
    }
}

fn path_or_default(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// TLS termination for one host. A host listed without a secret uses the
/// wildcard certificate when one is configured.
fn add_ssl_config(
    server: &mut Server,
    owner: &ResourceKey,
    ingress_ex: &IngressEx,
    host: &str,
    is_wildcard_enabled: bool,
    warnings: &mut Warnings,
) {
    let ingress = &ingress_ex.ingress;
    let Some(tls) = ingress.spec.tls.iter().rev().find(|tls| tls.hosts.iter().any(|h| h == host)) else {
        return;
    };

    let pem_file = if !tls.secret_name.is_empty() {
        let key = format!("{}/{}", ingress.metadata.namespace, tls.secret_name);
        let secret = lookup_secret(&ingress_ex.secret_refs, &key);
        if let Some(actual) = secret.secret_type().filter(|t| **t != SecretType::Tls) {
            warnings.add(
                owner,
                format!(
                    "TLS secret {} is of a wrong type '{}', must be '{}'",
                    tls.secret_name,
                    actual,
                    SecretType::Tls
                ),
            );
            PEM_FILE_FOR_MISSING_TLS_SECRET.to_string()
        } else if let Some(error) = &secret.error {
            warnings.add(owner, format!("TLS secret {} is invalid: {}", tls.secret_name, error));
            PEM_FILE_FOR_MISSING_TLS_SECRET.to_string()
        } else {
            secret.path.clone()
        }
    } else if is_wildcard_enabled {
        PEM_FILE_FOR_WILDCARD_TLS_SECRET.to_string()
    } else {
        warnings.add(
            owner,
            format!(
                "TLS termination for host '{}' requires specifying a TLS secret or configuring a global wildcard TLS secret",
                host
            ),
        );
        PEM_FILE_FOR_MISSING_TLS_SECRET.to_string()
    };

    server.ssl = true;
    if pem_file == PEM_FILE_FOR_MISSING_TLS_SECRET {
        server.ssl_ciphers = "NULL".to_string();
    }
    server.ssl_certificate = pem_file.clone();
    server.ssl_certificate_key = pem_file;
}

/// JWT validation for an Ingress. The key path is set even for a broken
/// secret; the proxy then rejects requests at runtime.
fn generate_jwt_config(
    owner: &ResourceKey,
    ingress_ex: &IngressEx,
    params: &ConfigParams,
    warnings: &mut Warnings,
) -> (JwtAuth, Option<JwtRedirectLocation>) {
    let ingress = &ingress_ex.ingress;
    let key = format!("{}/{}", ingress.metadata.namespace, params.jwt_key);
    let secret = lookup_secret(&ingress_ex.secret_refs, &key);

    if let Some(actual) = secret.secret_type().filter(|t| **t != SecretType::Jwk) {
        warnings.add(
            owner,
            format!(
                "JWK secret {} is of a wrong type '{}', must be '{}'",
                params.jwt_key,
                actual,
                SecretType::Jwk
            ),
        );
    } else if let Some(error) = &secret.error {
        warnings.add(owner, format!("JWK secret {} is invalid: {}", params.jwt_key, error));
    }

    let mut jwt_auth = JwtAuth {
        key: secret.path,
        realm: params.jwt_realm.clone(),
        token: params.jwt_token.clone(),
        redirect_location_name: String::new(),
    };

    if params.jwt_login_url.is_empty() {
        return (jwt_auth, None);
    }

    let name = jwt_redirect_location_name(ingress);
    jwt_auth.redirect_location_name = name.clone();
    (jwt_auth, Some(JwtRedirectLocation { name, login_url: params.jwt_login_url.clone() }))
}
