//! Compiled HTTP model for a VirtualServer and its routes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::UpstreamLabels;

/// Everything needed to render one VirtualServer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualServerConfig {
    pub http_snippets: Vec<String>,
    pub limit_req_zones: Vec<LimitReqZone>,
    pub maps: Vec<Map>,
    pub server: Server,
    pub split_clients: Vec<SplitClient>,
    pub status_matches: Vec<StatusMatch>,
    pub upstreams: Vec<Upstream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub name: String,
    pub servers: Vec<UpstreamServer>,
    pub lb_method: String,
    pub resolve: bool,
    pub keepalive: i64,
    pub max_fails: i64,
    pub max_conns: i64,
    pub slow_start: String,
    pub fail_timeout: String,
    pub upstream_zone_size: String,
    pub queue: Option<Queue>,
    pub session_cookie: Option<SessionCookie>,
    pub upstream_labels: UpstreamLabels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub address: String,
}

impl UpstreamServer {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub server_name: String,
    pub status_zone: String,
    pub proxy_protocol: bool,
    pub ssl: Option<Ssl>,
    pub server_tokens: String,
    pub real_ip_header: String,
    pub set_real_ip_from: Vec<String>,
    pub real_ip_recursive: bool,
    pub snippets: Vec<String>,
    pub internal_redirect_locations: Vec<InternalRedirectLocation>,
    pub locations: Vec<Location>,
    pub error_page_locations: Vec<ErrorPageLocation>,
    pub return_locations: Vec<ReturnLocation>,
    pub health_checks: Vec<HealthCheck>,
    pub tls_redirect: Option<TlsRedirect>,
    pub tls_passthrough: bool,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub limit_req_options: LimitReqOptions,
    pub limit_reqs: Vec<LimitReq>,
    pub jwt_auth: Option<JwtAuth>,
    pub ingress_mtls: Option<IngressMtls>,
    pub egress_mtls: Option<EgressMtls>,
    pub oidc: Option<Oidc>,
    pub policies_error_return: Option<Return>,
    pub vs_namespace: String,
    pub vs_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ssl {
    pub http2: bool,
    pub certificate: String,
    pub certificate_key: String,
    pub ciphers: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressMtls {
    pub client_cert: String,
    pub verify_client: String,
    pub verify_depth: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressMtls {
    pub certificate: String,
    pub certificate_key: String,
    pub verify_server: bool,
    pub verify_depth: i64,
    pub ciphers: String,
    pub protocols: String,
    pub trusted_cert: String,
    pub session_reuse: bool,
    pub server_name: bool,
    pub ssl_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oidc {
    pub auth_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub jwks_uri: String,
    pub scope: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub internal: bool,
    pub snippets: Vec<String>,
    pub proxy_connect_timeout: String,
    pub proxy_read_timeout: String,
    pub proxy_send_timeout: String,
    pub client_max_body_size: String,
    pub proxy_max_temp_file_size: String,
    pub proxy_buffering: bool,
    pub proxy_buffers: String,
    pub proxy_buffer_size: String,
    pub proxy_pass: String,
    pub proxy_next_upstream: String,
    pub proxy_next_upstream_timeout: String,
    pub proxy_next_upstream_tries: i64,
    pub proxy_intercept_errors: bool,
    pub proxy_pass_request_headers: bool,
    pub proxy_set_headers: Vec<Header>,
    pub proxy_hide_headers: Vec<String>,
    pub proxy_pass_headers: Vec<String>,
    pub proxy_ignore_headers: String,
    pub proxy_pass_rewrite: String,
    pub add_headers: Vec<AddHeader>,
    pub rewrites: Vec<String>,
    pub has_keepalive: bool,
    pub error_pages: Vec<ErrorPage>,
    pub proxy_ssl_name: String,
    pub internal_proxy_pass: String,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub limit_req_options: LimitReqOptions,
    pub limit_reqs: Vec<LimitReq>,
    pub jwt_auth: Option<JwtAuth>,
    pub egress_mtls: Option<EgressMtls>,
    pub oidc: bool,
    pub policies_error_return: Option<Return>,
    pub service_name: String,
    pub is_vsr: bool,
    pub vsr_name: String,
    pub vsr_namespace: String,
}

/// Named location answering with a canned response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLocation {
    pub name: String,
    pub default_type: String,
    #[serde(rename = "return")]
    pub return_: Return,
}

/// Weighted distribution block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitClient {
    pub source: String,
    pub variable: String,
    pub distributions: Vec<Distribution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Return {
    pub code: i64,
    pub text: String,
}

impl Return {
    pub fn new(code: i64, text: impl Into<String>) -> Self {
        Self { code, text: text.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPage {
    pub name: String,
    pub codes: String,
    pub response_code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPageLocation {
    pub name: String,
    pub default_type: String,
    #[serde(rename = "return")]
    pub return_: Option<Return>,
    pub headers: Vec<Header>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddHeader {
    #[serde(flatten)]
    pub header: Header,
    pub always: bool,
}

/// Active health check of one upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub uri: String,
    pub interval: String,
    pub jitter: String,
    pub fails: i64,
    pub passes: i64,
    pub port: i64,
    pub proxy_pass: String,
    pub proxy_connect_timeout: String,
    pub proxy_read_timeout: String,
    pub proxy_send_timeout: String,
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "match")]
    pub match_: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsRedirect {
    pub code: i64,
    pub based_on: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub enable: bool,
    pub name: String,
    pub path: String,
    pub expires: String,
    pub domain: String,
    pub http_only: bool,
    pub secure: bool,
}

/// One outcome of a split: `weight` is a percentage string like `"90%"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub weight: String,
    pub value: String,
}

impl Distribution {
    pub fn new(weight: impl Into<String>, value: impl Into<String>) -> Self {
        Self { weight: weight.into(), value: value.into() }
    }
}

/// Wires an externally reachable path to an internal destination variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalRedirectLocation {
    pub path: String,
    pub destination: String,
}

/// Single-key multi-way map from `source` to `variable`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    pub source: String,
    pub variable: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: String,
    pub result: String,
}

impl Parameter {
    pub fn new(value: impl Into<String>, result: impl Into<String>) -> Self {
        Self { value: value.into(), result: result.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMatch {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub size: i64,
    pub timeout: String,
}

/// Rate limit shared memory zone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitReqZone {
    pub key: String,
    pub zone_name: String,
    pub zone_size: String,
    pub rate: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitReq {
    pub zone_name: String,
    pub burst: i64,
    pub no_delay: bool,
    pub delay: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitReqOptions {
    pub dry_run: bool,
    pub log_level: String,
    pub reject_code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtAuth {
    pub secret: String,
    pub realm: String,
    pub token: String,
}
