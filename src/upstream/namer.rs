//! Deterministic upstream names.
//!
//! Names are unique within one compiled resource as long as upstream names
//! are unique within each owning resource, which admission guarantees.

use crate::domain::{Action, Ingress, IngressBackend, TransportServer, VirtualServer, VirtualServerRoute};

/// Names upstreams owned by one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamNamer {
    prefix: String,
    namespace: String,
}

impl UpstreamNamer {
    /// `vs_{ns}_{name}`
    pub fn for_virtual_server(vs: &VirtualServer) -> Self {
        let meta = &vs.metadata;
        Self { prefix: format!("vs_{}_{}", meta.namespace, meta.name), namespace: meta.namespace.clone() }
    }

    /// `vs_{ns}_{name}_vsr_{vsr_ns}_{vsr_name}`. Services resolve in the
    /// route's namespace.
    pub fn for_virtual_server_route(vs: &VirtualServer, vsr: &VirtualServerRoute) -> Self {
        Self {
            prefix: format!(
                "vs_{}_{}_vsr_{}_{}",
                vs.metadata.namespace, vs.metadata.name, vsr.metadata.namespace, vsr.metadata.name
            ),
            namespace: vsr.metadata.namespace.clone(),
        }
    }

    /// `ts_{ns}_{name}`
    pub fn for_transport_server(ts: &TransportServer) -> Self {
        let meta = &ts.metadata;
        Self { prefix: format!("ts_{}_{}", meta.namespace, meta.name), namespace: meta.namespace.clone() }
    }

    pub fn name_for_upstream(&self, upstream: &str) -> String {
        format!("{}_{}", self.prefix, upstream)
    }

    pub fn name_for_action(&self, action: &Action) -> String {
        self.name_for_upstream(action.upstream_name())
    }

    /// Namespace the owner's services live in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// `{ns}-{name}-{host}-{service}-{port}`; the host is empty for the
/// default backend
pub fn ingress_upstream_name(ingress: &Ingress, host: &str, backend: &IngressBackend) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        ingress.metadata.namespace, ingress.metadata.name, host, backend.service_name, backend.service_port
    )
}

/// Named location used for the JWT login redirect of an Ingress
pub fn jwt_redirect_location_name(ingress: &Ingress) -> String {
    format!("@login_url_{}-{}", ingress.metadata.namespace, ingress.metadata.name)
}

/// Server name presented to TLS upstreams
pub fn proxy_ssl_name(service: &str, namespace: &str) -> String {
    format!("{}.{}.svc", service, namespace)
}
