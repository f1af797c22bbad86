//! TransportServer and GlobalConfiguration resources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::endpoints::{EndpointMap, PodInfo};
use super::meta::ObjectMeta;

/// Name of the built-in listener for TLS passthrough
pub const TLS_PASSTHROUGH_LISTENER_NAME: &str = "tls-passthrough";
pub const TLS_PASSTHROUGH_LISTENER_PROTOCOL: &str = "TLS_PASSTHROUGH";
pub const TLS_PASSTHROUGH_LISTENER_PORT: u16 = 443;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportServer {
    pub metadata: ObjectMeta,
    pub spec: TransportServerSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportServerSpec {
    pub listener: TransportServerListener,
    pub host: String,
    pub upstreams: Vec<TransportServerUpstream>,
    #[serde(rename = "upstreamParameters")]
    pub upstream_parameters: Option<UpstreamParameters>,
    pub action: Option<TransportServerAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportServerListener {
    pub name: String,
    pub protocol: String,
}

impl TransportServerListener {
    pub fn new(name: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self { name: name.into(), protocol: protocol.into() }
    }

    pub fn is_tls_passthrough(&self) -> bool {
        self.name == TLS_PASSTHROUGH_LISTENER_NAME
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportServerUpstream {
    pub name: String,
    pub service: String,
    pub port: u16,
}

impl TransportServerUpstream {
    pub fn new(name: impl Into<String>, service: impl Into<String>, port: u16) -> Self {
        Self { name: name.into(), service: service.into(), port }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamParameters {
    #[serde(rename = "udpRequests")]
    pub udp_requests: Option<i64>,
    #[serde(rename = "udpResponses")]
    pub udp_responses: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportServerAction {
    pub pass: String,
}

/// Cluster-wide listener definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfiguration {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: GlobalConfigurationSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfigurationSpec {
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub name: String,
    pub port: u16,
    pub protocol: String,
}

impl Listener {
    pub fn new(name: impl Into<String>, port: u16, protocol: impl Into<String>) -> Self {
        Self { name: name.into(), port, protocol: protocol.into() }
    }
}

/// A TransportServer with its endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportServerEx {
    pub transport_server: TransportServer,
    pub endpoints: EndpointMap,
    pub pods_by_ip: BTreeMap<String, PodInfo>,
}

impl TransportServerEx {
    pub fn new(transport_server: TransportServer) -> Self {
        Self { transport_server, ..Default::default() }
    }

    pub fn key(&self) -> String {
        self.transport_server.metadata.key()
    }

    pub fn is_tls_passthrough(&self) -> bool {
        self.transport_server.spec.listener.is_tls_passthrough()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_transport_server() {
        let yaml = r#"
metadata:
  name: dns
  namespace: default
spec:
  listener:
    name: dns-udp
    protocol: UDP
  upstreams:
    - name: dns-app
      service: coredns
      port: 5353
  upstreamParameters:
    udpRequests: 1
  action:
    pass: dns-app
"#;
        let ts: TransportServer = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(ts.spec.listener.protocol, "UDP");
        assert_eq!(ts.spec.upstreams[0].port, 5353);
        assert_eq!(ts.spec.upstream_parameters.unwrap().udp_requests, Some(1));
        assert!(!ts.spec.listener.is_tls_passthrough());
    }
}
