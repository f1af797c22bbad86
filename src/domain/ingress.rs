//! Ingress resources and the mergeable master/minion grouping.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::endpoints::{EndpointMap, PodInfo};
use super::meta::ObjectMeta;
use super::secret::SecretRefs;

pub const MERGEABLE_INGRESS_TYPE_ANNOTATION: &str = "nginx.org/mergeable-ingress-type";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ingress {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: IngressSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressSpec {
    pub backend: Option<IngressBackend>,
    pub tls: Vec<IngressTls>,
    pub rules: Vec<IngressRule>,
}

/// Service port, by number or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServicePort {
    Number(i32),
    Name(String),
}

impl Default for ServicePort {
    fn default() -> Self {
        ServicePort::Number(80)
    }
}

impl fmt::Display for ServicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServicePort::Number(n) => write!(f, "{}", n),
            ServicePort::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressBackend {
    #[serde(rename = "serviceName")]
    pub service_name: String,
    #[serde(rename = "servicePort", default)]
    pub service_port: ServicePort,
}

impl IngressBackend {
    pub fn new(service_name: impl Into<String>, port: i32) -> Self {
        Self { service_name: service_name.into(), service_port: ServicePort::Number(port) }
    }

    /// Key used by the endpoint and health-check maps: service name
    /// immediately followed by the port
    pub fn key(&self) -> String {
        format!("{}{}", self.service_name, self.service_port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressTls {
    pub hosts: Vec<String>,
    #[serde(rename = "secretName")]
    pub secret_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressRule {
    pub host: String,
    pub http: Option<HttpIngressRuleValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpIngressRuleValue {
    pub paths: Vec<HttpIngressPath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathType {
    Exact,
    Prefix,
    ImplementationSpecific,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpIngressPath {
    #[serde(default)]
    pub path: String,
    #[serde(rename = "pathType", default)]
    pub path_type: Option<PathType>,
    pub backend: IngressBackend,
}

impl HttpIngressPath {
    pub fn new(path: impl Into<String>, backend: IngressBackend) -> Self {
        Self { path: path.into(), path_type: None, backend }
    }
}

/// Readiness probe of a backend pod, used to derive active health checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthProbe {
    #[serde(rename = "failureThreshold")]
    pub failure_threshold: i32,
    #[serde(rename = "periodSeconds")]
    pub period_seconds: i32,
    #[serde(rename = "successThreshold")]
    pub success_threshold: i32,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: i32,
    #[serde(rename = "httpGet")]
    pub http_get: HttpGetAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpGetAction {
    pub path: String,
    pub scheme: String,
    #[serde(rename = "httpHeaders")]
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

/// An Ingress with everything it references
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressEx {
    pub ingress: Ingress,
    /// Endpoints keyed by [`IngressBackend::key`]
    pub endpoints: EndpointMap,
    /// Readiness probes keyed by [`IngressBackend::key`]
    pub health_checks: BTreeMap<String, HealthProbe>,
    /// ExternalName services, keyed by service name
    pub external_name_svcs: BTreeMap<String, bool>,
    pub pods_by_ip: BTreeMap<String, PodInfo>,
    pub valid_hosts: BTreeSet<String>,
    pub valid_minion_paths: BTreeSet<String>,
    /// Secret references keyed `namespace/name`
    pub secret_refs: SecretRefs,
}

impl IngressEx {
    /// Wrap an ingress, treating every rule host and path as valid
    pub fn new(ingress: Ingress) -> Self {
        let mut valid_hosts = BTreeSet::new();
        let mut valid_minion_paths = BTreeSet::new();
        for rule in &ingress.spec.rules {
            valid_hosts.insert(rule.host.clone());
            if let Some(http) = &rule.http {
                for path in &http.paths {
                    valid_minion_paths.insert(path.path.clone());
                }
            }
        }
        Self { ingress, valid_hosts, valid_minion_paths, ..Default::default() }
    }

    pub fn key(&self) -> String {
        self.ingress.metadata.key()
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.ingress.metadata.annotations
    }

    pub fn is_master(&self) -> bool {
        self.annotations().get(MERGEABLE_INGRESS_TYPE_ANNOTATION).map(String::as_str) == Some("master")
    }
}

/// A master Ingress and its minions, compiled into one config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeableIngresses {
    pub master: IngressEx,
    #[serde(default)]
    pub minions: Vec<IngressEx>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_key() {
        assert_eq!(IngressBackend::new("tea-svc", 80).key(), "tea-svc80");
        let named = IngressBackend {
            service_name: "tea-svc".to_string(),
            service_port: ServicePort::Name("http".to_string()),
        };
        assert_eq!(named.key(), "tea-svchttp");
    }

    #[test]
    fn test_ingress_ex_marks_hosts_valid() {
        let ingress = Ingress {
            metadata: ObjectMeta::new("default", "cafe"),
            spec: IngressSpec {
                rules: vec![IngressRule {
                    host: "cafe.example.com".to_string(),
                    http: Some(HttpIngressRuleValue {
                        paths: vec![HttpIngressPath::new("/tea", IngressBackend::new("tea-svc", 80))],
                    }),
                }],
                ..Default::default()
            },
        };
        let ex = IngressEx::new(ingress);
        assert!(ex.valid_hosts.contains("cafe.example.com"));
        assert!(ex.valid_minion_paths.contains("/tea"));
        assert!(!ex.is_master());
    }

    #[test]
    fn test_service_port_untagged() {
        let backend: IngressBackend =
            serde_json::from_str(r#"{"serviceName":"tea","servicePort":"http"}"#).unwrap();
        assert_eq!(backend.service_port, ServicePort::Name("http".to_string()));
        let backend: IngressBackend =
            serde_json::from_str(r#"{"serviceName":"tea","servicePort":8080}"#).unwrap();
        assert_eq!(backend.service_port, ServicePort::Number(8080));
    }
}
