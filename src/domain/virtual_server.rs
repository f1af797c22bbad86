//! VirtualServer and VirtualServerRoute resources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::endpoints::{EndpointMap, PodInfo};
use super::meta::ObjectMeta;
use super::policy::{Policy, PolicyReference};
use super::secret::SecretRefs;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualServer {
    pub metadata: ObjectMeta,
    pub spec: VirtualServerSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualServerSpec {
    #[serde(rename = "ingressClassName")]
    pub ingress_class: String,
    pub host: String,
    pub tls: Option<Tls>,
    pub policies: Vec<PolicyReference>,
    pub upstreams: Vec<Upstream>,
    pub routes: Vec<Route>,
    #[serde(rename = "http-snippets")]
    pub http_snippets: String,
    #[serde(rename = "server-snippets")]
    pub server_snippets: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualServerRoute {
    pub metadata: ObjectMeta,
    pub spec: VirtualServerRouteSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualServerRouteSpec {
    #[serde(rename = "ingressClassName")]
    pub ingress_class: String,
    pub host: String,
    pub upstreams: Vec<Upstream>,
    pub subroutes: Vec<Route>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Upstream {
    pub name: String,
    pub service: String,
    pub subselector: BTreeMap<String, String>,
    pub port: u16,
    #[serde(rename = "lb-method")]
    pub lb_method: String,
    #[serde(rename = "fail-timeout")]
    pub fail_timeout: String,
    #[serde(rename = "max-fails")]
    pub max_fails: Option<i64>,
    #[serde(rename = "max-conns")]
    pub max_conns: Option<i64>,
    pub keepalive: Option<i64>,
    #[serde(rename = "connect-timeout")]
    pub proxy_connect_timeout: String,
    #[serde(rename = "read-timeout")]
    pub proxy_read_timeout: String,
    #[serde(rename = "send-timeout")]
    pub proxy_send_timeout: String,
    #[serde(rename = "next-upstream")]
    pub proxy_next_upstream: String,
    #[serde(rename = "next-upstream-timeout")]
    pub proxy_next_upstream_timeout: String,
    #[serde(rename = "next-upstream-tries")]
    pub proxy_next_upstream_tries: i64,
    pub buffering: Option<bool>,
    pub buffers: Option<UpstreamBuffers>,
    #[serde(rename = "buffer-size")]
    pub proxy_buffer_size: String,
    #[serde(rename = "client-max-body-size")]
    pub client_max_body_size: String,
    pub tls: UpstreamTls,
    #[serde(rename = "healthCheck")]
    pub health_check: Option<HealthCheck>,
    #[serde(rename = "slow-start")]
    pub slow_start: String,
    pub queue: Option<UpstreamQueue>,
    #[serde(rename = "sessionCookie")]
    pub session_cookie: Option<SessionCookie>,
}

impl Upstream {
    pub fn new(name: impl Into<String>, service: impl Into<String>, port: u16) -> Self {
        Self { name: name.into(), service: service.into(), port, ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamBuffers {
    pub number: i64,
    pub size: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamTls {
    #[serde(default)]
    pub enable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheck {
    pub enable: bool,
    pub path: String,
    pub interval: String,
    pub jitter: String,
    pub fails: i64,
    pub passes: i64,
    pub port: i64,
    pub tls: Option<UpstreamTls>,
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: String,
    #[serde(rename = "read-timeout")]
    pub read_timeout: String,
    #[serde(rename = "send-timeout")]
    pub send_timeout: String,
    pub headers: Vec<Header>,
    #[serde(rename = "statusMatch")]
    pub status_match: String,
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

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCookie {
    pub enable: bool,
    pub name: String,
    pub path: String,
    pub expires: String,
    pub domain: String,
    #[serde(rename = "httpOnly")]
    pub http_only: bool,
    pub secure: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamQueue {
    pub size: i64,
    #[serde(default)]
    pub timeout: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    pub path: String,
    pub policies: Vec<PolicyReference>,
    /// Delegation to a VirtualServerRoute, `namespace/name` or `name`
    pub route: String,
    pub action: Option<Action>,
    pub splits: Vec<Split>,
    pub matches: Vec<Match>,
    #[serde(rename = "errorPages")]
    pub error_pages: Option<Vec<ErrorPage>>,
    #[serde(rename = "location-snippets")]
    pub location_snippets: String,
}

impl Route {
    pub fn with_action(path: impl Into<String>, action: Action) -> Self {
        Self { path: path.into(), action: Some(action), ..Default::default() }
    }

    pub fn error_pages(&self) -> &[ErrorPage] {
        self.error_pages.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Action {
    pub pass: String,
    pub redirect: Option<ActionRedirect>,
    #[serde(rename = "return")]
    pub return_: Option<ActionReturn>,
    pub proxy: Option<ActionProxy>,
}

impl Action {
    pub fn pass(upstream: impl Into<String>) -> Self {
        Self { pass: upstream.into(), ..Default::default() }
    }

    pub fn redirect(url: impl Into<String>, code: i64) -> Self {
        Self { redirect: Some(ActionRedirect { url: url.into(), code }), ..Default::default() }
    }

    pub fn returns(code: i64, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            return_: Some(ActionReturn {
                code,
                content_type: content_type.into(),
                body: body.into(),
            }),
            ..Default::default()
        }
    }

    pub fn proxy(proxy: ActionProxy) -> Self {
        Self { proxy: Some(proxy), ..Default::default() }
    }

    /// Upstream this action targets: the proxy upstream, else `pass`
    pub fn upstream_name(&self) -> &str {
        match &self.proxy {
            Some(proxy) if !proxy.upstream.is_empty() => &proxy.upstream,
            _ => &self.pass,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRedirect {
    pub url: String,
    #[serde(default)]
    pub code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionReturn {
    pub code: i64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionProxy {
    pub upstream: String,
    #[serde(rename = "rewritePath")]
    pub rewrite_path: String,
    #[serde(rename = "requestHeaders")]
    pub request_headers: Option<ProxyRequestHeaders>,
    #[serde(rename = "responseHeaders")]
    pub response_headers: Option<ProxyResponseHeaders>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyRequestHeaders {
    pub pass: Option<bool>,
    pub set: Vec<Header>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyResponseHeaders {
    pub hide: Vec<String>,
    pub pass: Vec<String>,
    pub ignore: Vec<String>,
    pub add: Vec<AddHeader>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddHeader {
    #[serde(flatten)]
    pub header: Header,
    #[serde(default)]
    pub always: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub weight: i64,
    pub action: Option<Action>,
}

impl Split {
    pub fn new(weight: i64, action: Action) -> Self {
        Self { weight, action: Some(action) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    pub header: String,
    pub cookie: String,
    pub argument: String,
    pub variable: String,
    pub value: String,
}

impl Condition {
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { header: name.into(), value: value.into(), ..Default::default() }
    }

    pub fn cookie(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { cookie: name.into(), value: value.into(), ..Default::default() }
    }

    pub fn argument(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { argument: name.into(), value: value.into(), ..Default::default() }
    }

    pub fn variable(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { variable: name.into(), value: value.into(), ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Match {
    pub conditions: Vec<Condition>,
    pub action: Option<Action>,
    pub splits: Vec<Split>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPage {
    pub codes: Vec<i64>,
    #[serde(rename = "return")]
    pub return_: Option<ErrorPageReturn>,
    pub redirect: Option<ActionRedirect>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPageReturn {
    #[serde(flatten)]
    pub action_return: ActionReturn,
    #[serde(default)]
    pub headers: Vec<Header>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tls {
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub redirect: Option<TlsRedirect>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsRedirect {
    pub enable: bool,
    pub code: Option<i64>,
    #[serde(rename = "basedOn")]
    pub based_on: String,
}

/// A VirtualServer with everything it references, as one immutable
/// compile snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualServerEx {
    pub virtual_server: VirtualServer,
    /// Endpoints keyed by [`super::endpoints::endpoints_key`]
    pub endpoints: EndpointMap,
    pub virtual_server_routes: Vec<VirtualServerRoute>,
    /// Services of type ExternalName, keyed `namespace/service`
    pub external_name_svcs: BTreeMap<String, bool>,
    /// Policies keyed `namespace/name`
    pub policies: BTreeMap<String, Policy>,
    pub pods_by_ip: BTreeMap<String, PodInfo>,
    pub secret_refs: SecretRefs,
}

impl VirtualServerEx {
    pub fn new(virtual_server: VirtualServer) -> Self {
        Self { virtual_server, ..Default::default() }
    }

    pub fn key(&self) -> String {
        self.virtual_server.metadata.key()
    }

    pub fn is_external_name(&self, namespace: &str, service: &str) -> bool {
        self.external_name_svcs.contains_key(&format!("{}/{}", namespace, service))
    }
}
