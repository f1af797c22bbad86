//! Compiled model for Ingress resources, standalone or merged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::UpstreamLabels;

/// Everything needed to render one Ingress (or a master with its minions)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngressNginxConfig {
    pub upstreams: Vec<Upstream>,
    pub servers: Vec<Server>,
    /// Upstream keepalive, empty when disabled
    pub keepalive: String,
    pub ingress: IngressMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngressMeta {
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub name: String,
    pub upstream_servers: Vec<UpstreamServer>,
    pub sticky_cookie: String,
    pub lb_method: String,
    pub queue: i64,
    pub queue_timeout: i64,
    pub upstream_zone_size: String,
    pub upstream_labels: UpstreamLabels,
}

impl Upstream {
    /// Upstream holding a single placeholder server that always fails
    pub fn with_default_server(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upstream_zone_size: "256k".to_string(),
            upstream_servers: vec![UpstreamServer {
                address: "127.0.0.1".to_string(),
                port: "8181".to_string(),
                max_fails: 1,
                fail_timeout: "10s".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub address: String,
    pub port: String,
    pub max_fails: i64,
    pub max_conns: i64,
    pub fail_timeout: String,
    pub slow_start: String,
    pub resolve: bool,
}

/// Active health check derived from a readiness probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub upstream_name: String,
    pub uri: String,
    pub interval: i32,
    pub fails: i32,
    pub passes: i32,
    pub scheme: String,
    pub mandatory: bool,
    pub headers: BTreeMap<String, String>,
    pub timeout_seconds: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub server_snippets: Vec<String>,
    pub name: String,
    pub server_tokens: String,
    pub locations: Vec<Location>,
    pub ssl: bool,
    pub ssl_certificate: String,
    pub ssl_certificate_key: String,
    pub ssl_ciphers: String,
    pub tls_passthrough: bool,
    pub grpc_only: bool,
    pub status_zone: String,
    pub http2: bool,
    pub redirect_to_https: bool,
    pub ssl_redirect: bool,
    pub proxy_protocol: bool,
    pub hsts: bool,
    pub hsts_max_age: i64,
    pub hsts_include_subdomains: bool,
    pub hsts_behind_proxy: bool,
    pub proxy_hide_headers: Vec<String>,
    pub proxy_pass_headers: Vec<String>,
    /// Keyed by upstream name
    pub health_checks: BTreeMap<String, HealthCheck>,
    pub real_ip_header: String,
    pub set_real_ip_from: Vec<String>,
    pub real_ip_recursive: bool,
    pub jwt_auth: Option<JwtAuth>,
    pub jwt_redirect_locations: Vec<JwtRedirectLocation>,
    pub ports: Vec<u16>,
    pub ssl_ports: Vec<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtRedirectLocation {
    pub name: String,
    pub login_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtAuth {
    pub key: String,
    pub realm: String,
    pub token: String,
    pub redirect_location_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub location_snippets: Vec<String>,
    pub path: String,
    pub upstream: Upstream,
    pub proxy_connect_timeout: String,
    pub proxy_read_timeout: String,
    pub proxy_send_timeout: String,
    pub client_max_body_size: String,
    pub websocket: bool,
    pub rewrite: String,
    pub ssl: bool,
    pub grpc: bool,
    pub proxy_buffering: bool,
    pub proxy_buffers: String,
    pub proxy_buffer_size: String,
    pub proxy_max_temp_file_size: String,
    pub proxy_ssl_name: String,
    pub jwt_auth: Option<JwtAuth>,
    pub service_name: String,
    pub minion_ingress: Option<IngressMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_with_default_server() {
        let upstream = Upstream::with_default_server("default-cafe-cafe.example.com-tea-svc-80");
        assert_eq!(upstream.upstream_servers.len(), 1);
        assert_eq!(upstream.upstream_servers[0].address, "127.0.0.1");
        assert_eq!(upstream.upstream_servers[0].port, "8181");
        assert_eq!(upstream.upstream_zone_size, "256k");
    }
}
