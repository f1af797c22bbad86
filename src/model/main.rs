//! Compiled model of the global proxy configuration.

use serde::{Deserialize, Serialize};

/// Main configuration: process, `http` and `stream` level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainConfig {
    pub access_log_off: bool,
    pub default_server_access_log_off: bool,
    pub error_log_level: String,
    pub health_status: bool,
    pub health_status_uri: String,
    pub http2: bool,
    pub http_snippets: Vec<String>,
    pub keepalive_requests: i64,
    pub keepalive_timeout: String,
    pub log_format: Vec<String>,
    pub log_format_escaping: String,
    pub main_snippets: Vec<String>,
    pub nginx_status: bool,
    pub nginx_status_allow_cidrs: Vec<String>,
    pub nginx_status_port: u16,
    pub opentracing_enabled: bool,
    pub opentracing_load_module: bool,
    pub opentracing_tracer: String,
    pub opentracing_tracer_config: String,
    pub proxy_protocol: bool,
    pub resolver_addresses: Vec<String>,
    pub resolver_ipv6: bool,
    pub resolver_timeout: String,
    pub resolver_valid: String,
    pub real_ip_header: String,
    pub real_ip_recursive: bool,
    pub set_real_ip_from: Vec<String>,
    pub server_names_hash_bucket_size: String,
    pub server_names_hash_max_size: String,
    pub server_tokens: String,
    pub ssl_ciphers: String,
    pub ssl_dhparam: String,
    pub ssl_prefer_server_ciphers: bool,
    pub ssl_protocols: String,
    pub tls_passthrough: bool,
    pub stream_log_format: Vec<String>,
    pub stream_log_format_escaping: String,
    pub stream_snippets: Vec<String>,
    pub stub_status_over_unix_socket_for_oss: bool,
    pub worker_cpu_affinity: String,
    pub worker_processes: String,
    pub worker_shutdown_timeout: String,
    pub worker_connections: String,
    pub worker_rlimit_nofile: String,
    pub variables_hash_bucket_size: u64,
    pub variables_hash_max_size: u64,
    pub internal_route_server: bool,
    pub internal_route_server_name: String,
    pub latency_metrics: bool,
    pub preview_policies: bool,
}
