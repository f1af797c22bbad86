//! # Compiled Model
//!
//! Output of the compile passes and input of the render executor. Every
//! collection here is ordered so that serializing the same model twice
//! yields identical bytes.

pub mod http;
pub mod ingress;
pub mod main;
pub mod stream;

use serde::{Deserialize, Serialize};

pub use http::VirtualServerConfig;
pub use ingress::IngressNginxConfig;
pub use main::MainConfig;
pub use stream::{TlsPassthroughHostsConfig, TransportServerConfig};

/// Metric labels of an upstream: which service and resource it serves
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpstreamLabels {
    pub service: String,
    pub resource_type: String,
    pub resource_name: String,
    pub resource_namespace: String,
}

impl UpstreamLabels {
    pub fn new(
        service: impl Into<String>,
        resource_type: impl Into<String>,
        resource_name: impl Into<String>,
        resource_namespace: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            resource_type: resource_type.into(),
            resource_name: resource_name.into(),
            resource_namespace: resource_namespace.into(),
        }
    }

    /// Label values in sink order
    pub fn values(&self) -> Vec<String> {
        vec![
            self.service.clone(),
            self.resource_type.clone(),
            self.resource_name.clone(),
            self.resource_namespace.clone(),
        ]
    }
}
