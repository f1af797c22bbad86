//! Compiled model for TransportServers and the TLS passthrough routing map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::UpstreamLabels;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportServerConfig {
    pub server: StreamServer,
    pub upstreams: Vec<StreamUpstream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamServer {
    pub tls_passthrough: bool,
    pub unix_socket: String,
    pub port: u16,
    pub udp: bool,
    pub status_zone: String,
    pub proxy_requests: Option<i64>,
    pub proxy_responses: Option<i64>,
    pub proxy_pass: String,
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamUpstream {
    pub name: String,
    pub servers: Vec<StreamUpstreamServer>,
    pub upstream_labels: UpstreamLabels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUpstreamServer {
    pub address: String,
}

impl StreamUpstreamServer {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }
}

/// Public hostname to local unix socket, one entry per passthrough host
pub type TlsPassthroughHostsConfig = BTreeMap<String, String>;
