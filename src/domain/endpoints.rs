//! Live endpoint snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Endpoint addresses (`ip:port`) keyed by [`endpoints_key`]
pub type EndpointMap = BTreeMap<String, Vec<String>>;

/// Pod owning an endpoint address, used for peer metric labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
}

impl PodInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Key of an endpoint list: `ns/svc:port`, or with a subselector
/// `ns/svc_k1=v1,k2=v2:port` with the labels sorted by key.
pub fn endpoints_key(
    namespace: &str,
    service: &str,
    subselector: &BTreeMap<String, String>,
    port: u16,
) -> String {
    if subselector.is_empty() {
        return format!("{}/{}:{}", namespace, service, port);
    }

    let labels: Vec<String> = subselector.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}/{}_{}:{}", namespace, service, labels.join(","), port)
}

/// Key of an ExternalName service: `ns/svc`
pub fn external_name_svc_key(namespace: &str, service: &str) -> String {
    format!("{}/{}", namespace, service)
}
