//! # Effective Parameters
//!
//! The flat parameter record every compile starts from, plus the static
//! (startup-only) parameters and the global listener table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::transport_server::{
    TLS_PASSTHROUGH_LISTENER_NAME, TLS_PASSTHROUGH_LISTENER_PORT, TLS_PASSTHROUGH_LISTENER_PROTOCOL,
};

/// Proxy settings shared by the main config and per-resource configs.
///
/// Resolution steps never mutate a `ConfigParams` in place: each layer
/// clones its base and returns the modified copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigParams {
    pub client_max_body_size: String,
    pub default_server_access_log_off: bool,
    pub fail_timeout: String,
    pub health_check_enabled: bool,
    pub health_check_mandatory: bool,
    pub health_check_mandatory_queue: i64,
    pub hsts: bool,
    pub hsts_behind_proxy: bool,
    pub hsts_include_subdomains: bool,
    pub hsts_max_age: i64,
    pub http2: bool,
    pub keepalive: i64,
    /// Empty means round robin
    pub lb_method: String,
    pub location_snippets: Vec<String>,
    pub main_access_log_off: bool,
    pub main_error_log_level: String,
    pub main_http_snippets: Vec<String>,
    pub main_keepalive_requests: i64,
    pub main_keepalive_timeout: String,
    pub main_log_format: Vec<String>,
    pub main_log_format_escaping: String,
    pub main_main_snippets: Vec<String>,
    pub main_opentracing_enabled: bool,
    pub main_opentracing_load_module: bool,
    pub main_opentracing_tracer: String,
    pub main_opentracing_tracer_config: String,
    pub main_server_names_hash_bucket_size: String,
    pub main_server_names_hash_max_size: String,
    pub main_stream_log_format: Vec<String>,
    pub main_stream_log_format_escaping: String,
    pub main_stream_snippets: Vec<String>,
    pub main_worker_connections: String,
    pub main_worker_cpu_affinity: String,
    pub main_worker_processes: String,
    pub main_worker_rlimit_nofile: String,
    pub main_worker_shutdown_timeout: String,
    pub max_conns: i64,
    pub max_fails: i64,
    pub proxy_buffering: bool,
    pub proxy_buffers: String,
    pub proxy_buffer_size: String,
    pub proxy_connect_timeout: String,
    pub proxy_hide_headers: Vec<String>,
    pub proxy_max_temp_file_size: String,
    pub proxy_pass_headers: Vec<String>,
    pub proxy_protocol: bool,
    pub proxy_read_timeout: String,
    pub proxy_send_timeout: String,
    pub redirect_to_https: bool,
    pub resolver_addresses: Vec<String>,
    pub resolver_ipv6: bool,
    pub resolver_timeout: String,
    pub resolver_valid: String,
    pub server_snippets: Vec<String>,
    pub server_tokens: String,
    pub slow_start: String,
    pub ssl_redirect: bool,
    pub upstream_zone_size: String,
    pub variables_hash_bucket_size: u64,
    pub variables_hash_max_size: u64,

    pub real_ip_header: String,
    pub real_ip_recursive: bool,
    pub set_real_ip_from: Vec<String>,

    pub main_server_ssl_ciphers: String,
    /// Path of the written dhparam file, filled in by the orchestrator
    pub main_server_ssl_dhparam: String,
    pub main_server_ssl_dhparam_file_content: Option<String>,
    pub main_server_ssl_prefer_server_ciphers: bool,
    pub main_server_ssl_protocols: String,

    pub ingress_template: Option<String>,
    pub virtual_server_template: Option<String>,
    pub main_template: Option<String>,

    pub jwt_key: String,
    pub jwt_login_url: String,
    pub jwt_realm: String,
    pub jwt_token: String,

    pub ports: Vec<u16>,
    pub ssl_ports: Vec<u16>,
}

impl Default for ConfigParams {
    fn default() -> Self {
        Self {
            client_max_body_size: "1m".to_string(),
            default_server_access_log_off: false,
            fail_timeout: "10s".to_string(),
            health_check_enabled: false,
            health_check_mandatory: false,
            health_check_mandatory_queue: 0,
            hsts: false,
            hsts_behind_proxy: false,
            hsts_include_subdomains: false,
            hsts_max_age: 2_592_000,
            http2: false,
            keepalive: 0,
            lb_method: "random two least_conn".to_string(),
            location_snippets: Vec::new(),
            main_access_log_off: false,
            main_error_log_level: "notice".to_string(),
            main_http_snippets: Vec::new(),
            main_keepalive_requests: 100,
            main_keepalive_timeout: "65s".to_string(),
            main_log_format: Vec::new(),
            main_log_format_escaping: String::new(),
            main_main_snippets: Vec::new(),
            main_opentracing_enabled: false,
            main_opentracing_load_module: false,
            main_opentracing_tracer: String::new(),
            main_opentracing_tracer_config: String::new(),
            main_server_names_hash_bucket_size: "256".to_string(),
            main_server_names_hash_max_size: "1024".to_string(),
            main_stream_log_format: Vec::new(),
            main_stream_log_format_escaping: String::new(),
            main_stream_snippets: Vec::new(),
            main_worker_connections: "1024".to_string(),
            main_worker_cpu_affinity: String::new(),
            main_worker_processes: "auto".to_string(),
            main_worker_rlimit_nofile: String::new(),
            main_worker_shutdown_timeout: String::new(),
            max_conns: 0,
            max_fails: 1,
            proxy_buffering: true,
            proxy_buffers: String::new(),
            proxy_buffer_size: String::new(),
            proxy_connect_timeout: "60s".to_string(),
            proxy_hide_headers: Vec::new(),
            proxy_max_temp_file_size: String::new(),
            proxy_pass_headers: Vec::new(),
            proxy_protocol: false,
            proxy_read_timeout: "60s".to_string(),
            proxy_send_timeout: "60s".to_string(),
            redirect_to_https: false,
            resolver_addresses: Vec::new(),
            resolver_ipv6: true,
            resolver_timeout: String::new(),
            resolver_valid: String::new(),
            server_snippets: Vec::new(),
            server_tokens: "on".to_string(),
            slow_start: String::new(),
            ssl_redirect: true,
            upstream_zone_size: "256k".to_string(),
            variables_hash_bucket_size: 256,
            variables_hash_max_size: 1024,
            real_ip_header: String::new(),
            real_ip_recursive: false,
            set_real_ip_from: Vec::new(),
            main_server_ssl_ciphers: String::new(),
            main_server_ssl_dhparam: String::new(),
            main_server_ssl_dhparam_file_content: None,
            main_server_ssl_prefer_server_ciphers: false,
            main_server_ssl_protocols: String::new(),
            ingress_template: None,
            virtual_server_template: None,
            main_template: None,
            jwt_key: String::new(),
            jwt_login_url: String::new(),
            jwt_realm: String::new(),
            jwt_token: String::new(),
            ports: vec![80],
            ssl_ports: vec![443],
        }
    }
}

impl ConfigParams {
    /// A resolver is configured when at least one address is set
    pub fn is_resolver_configured(&self) -> bool {
        !self.resolver_addresses.is_empty()
    }
}

/// Parameters fixed at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticConfigParams {
    pub health_status: bool,
    pub health_status_uri: String,
    pub nginx_status: bool,
    pub nginx_status_allow_cidrs: Vec<String>,
    pub nginx_status_port: u16,
    pub stub_status_over_unix_socket_for_oss: bool,
    pub tls_passthrough: bool,
    pub enable_snippets: bool,
    pub enable_internal_routes: bool,
    pub pod_name: String,
    pub enable_latency_metrics: bool,
    pub enable_preview_policies: bool,
}

/// A listener usable by TransportServers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerParams {
    pub port: u16,
    pub protocol: String,
}

/// Listeners from the GlobalConfiguration, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfigParams {
    pub listeners: BTreeMap<String, ListenerParams>,
}

impl GlobalConfigParams {
    /// Listener table holding only the built-in TLS passthrough listener
    pub fn with_tls_passthrough() -> Self {
        let mut listeners = BTreeMap::new();
        listeners.insert(
            TLS_PASSTHROUGH_LISTENER_NAME.to_string(),
            ListenerParams {
                port: TLS_PASSTHROUGH_LISTENER_PORT,
                protocol: TLS_PASSTHROUGH_LISTENER_PROTOCOL.to_string(),
            },
        );
        Self { listeners }
    }

    /// True if a listener with this name exists and speaks `protocol`
    pub fn listener_exists(&self, name: &str, protocol: &str) -> bool {
        self.listeners.get(name).is_some_and(|l| l.protocol == protocol)
    }

    pub fn listener_port(&self, name: &str) -> Option<u16> {
        self.listeners.get(name).map(|l| l.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = ConfigParams::default();
        assert_eq!(params.proxy_connect_timeout, "60s");
        assert_eq!(params.lb_method, "random two least_conn");
        assert_eq!(params.ports, vec![80]);
        assert_eq!(params.ssl_ports, vec![443]);
        assert!(params.ssl_redirect);
        assert!(!params.is_resolver_configured());
    }

    #[test]
    fn test_listener_exists_checks_protocol() {
        let gc = GlobalConfigParams::with_tls_passthrough();
        assert!(gc.listener_exists("tls-passthrough", "TLS_PASSTHROUGH"));
        assert!(!gc.listener_exists("tls-passthrough", "TCP"));
        assert!(!gc.listener_exists("dns-udp", "UDP"));
    }
}
