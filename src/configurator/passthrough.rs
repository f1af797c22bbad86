//! TLS passthrough routing table.

use std::collections::BTreeMap;

use crate::model::TlsPassthroughHostsConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PassthroughPair {
    host: String,
    unix_socket: String,
}

/// Host to socket pairs, one per passthrough TransportServer, keyed by
/// `namespace/name` of the owner
#[derive(Debug, Clone, Default)]
pub struct PassthroughTable {
    pairs: BTreeMap<String, PassthroughPair>,
}

impl PassthroughTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, owner: impl Into<String>, host: impl Into<String>, unix_socket: impl Into<String>) {
        self.pairs.insert(owner.into(), PassthroughPair { host: host.into(), unix_socket: unix_socket.into() });
    }

    /// Remove the pair of `owner`, returning whether it existed
    pub fn remove(&mut self, owner: &str) -> bool {
        self.pairs.remove(owner).is_some()
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.pairs.contains_key(owner)
    }

    /// Rebuild the host map from every pair in owner order. A host claimed
    /// twice keeps the socket of the last owner and is reported once per
    /// extra claim.
    pub fn generate(&self) -> (TlsPassthroughHostsConfig, Vec<String>) {
        let mut config = TlsPassthroughHostsConfig::new();
        let mut duplicated = Vec::new();

        for pair in self.pairs.values() {
            if config.insert(pair.host.clone(), pair.unix_socket.clone()).is_some() {
                duplicated.push(pair.host.clone());
            }
        }

        (config, duplicated)
    }
}
