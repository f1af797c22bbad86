//! Registry of applied resources and the content hash of every artifact
//! written for them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{IngressEx, TransportServerEx, VirtualServerEx};

/// Hex SHA-256 of rendered bytes
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Kind of a written artifact, which decides the directory it lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Main,
    Http,
    Stream,
    PassthroughHosts,
}

/// Number of resources in the current configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    pub regular_ingresses: usize,
    pub master_ingresses: usize,
    pub minion_ingresses: usize,
    pub virtual_servers: usize,
    pub virtual_server_routes: usize,
    pub transport_servers: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    /// Regular and master Ingresses keyed by file name
    pub(crate) ingresses: BTreeMap<String, IngressEx>,
    /// Minion file names keyed by master file name
    pub(crate) minions: BTreeMap<String, BTreeSet<String>>,
    pub(crate) virtual_servers: BTreeMap<String, VirtualServerEx>,
    pub(crate) transport_servers: BTreeMap<String, TransportServerEx>,
    hashes: BTreeMap<(ArtifactKind, String), String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the hash of an artifact, returning true when it differs
    /// from the previously recorded one
    pub fn record(&mut self, kind: ArtifactKind, name: &str, content: &[u8]) -> bool {
        let hash = content_hash(content);
        match self.hashes.insert((kind, name.to_string()), hash.clone()) {
            Some(previous) => previous != hash,
            None => true,
        }
    }

    /// True when `content` hashes to what was last recorded for the artifact
    pub fn is_current(&self, kind: ArtifactKind, name: &str, content: &[u8]) -> bool {
        self.hash_of(kind, name).is_some_and(|hash| hash == content_hash(content))
    }

    pub fn forget(&mut self, kind: ArtifactKind, name: &str) -> bool {
        self.hashes.remove(&(kind, name.to_string())).is_some()
    }

    pub fn hash_of(&self, kind: ArtifactKind, name: &str) -> Option<&str> {
        self.hashes.get(&(kind, name.to_string())).map(String::as_str)
    }

    pub fn counts(&self) -> ResourceCounts {
        let master_ingresses = self.ingresses.values().filter(|i| i.is_master()).count();
        ResourceCounts {
            regular_ingresses: self.ingresses.len() - master_ingresses,
            master_ingresses,
            minion_ingresses: self.minions.values().map(BTreeSet::len).sum(),
            virtual_servers: self.virtual_servers.len(),
            virtual_server_routes: self.virtual_servers.values().map(|vs| vs.virtual_server_routes.len()).sum(),
            transport_servers: self.transport_servers.len(),
        }
    }
}
