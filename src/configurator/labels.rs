//! Metric label indices.
//!
//! Each applied resource owns a snapshot of the label sets it published.
//! On every apply the new snapshot is diffed against the previous one and
//! keys that disappeared are retracted, so stale series do not linger.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::domain::{IngressEx, ResourceKey, ResourceKind, TransportServerEx, VirtualServerEx};
use crate::model::{http, ingress, stream};

/// Label sets keyed by upstream name, peer (`upstream/address`) or zone
pub type LabelSet = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LabelGroup {
    Upstream,
    UpstreamPeer,
    ServerZone,
    StreamUpstream,
    StreamUpstreamPeer,
    StreamServerZone,
}

/// Receiver of label updates, typically a metrics collector
pub trait LabelSink: Send + Sync {
    fn upsert(&self, group: LabelGroup, labels: &LabelSet);

    fn retract(&self, group: LabelGroup, keys: &[String]);
}

/// Label sink holding the current labels in memory and logging every
/// retraction
#[derive(Debug, Default)]
pub struct InMemoryLabelSink {
    labels: DashMap<(LabelGroup, String), Vec<String>>,
    retractions: Mutex<Vec<(LabelGroup, Vec<String>)>>,
}

impl InMemoryLabelSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, group: LabelGroup, key: &str) -> Option<Vec<String>> {
        self.labels.get(&(group, key.to_string())).map(|v| v.value().clone())
    }

    pub fn len(&self, group: LabelGroup) -> usize {
        self.labels.iter().filter(|entry| entry.key().0 == group).count()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn retractions(&self) -> Vec<(LabelGroup, Vec<String>)> {
        self.retractions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LabelSink for InMemoryLabelSink {
    fn upsert(&self, group: LabelGroup, labels: &LabelSet) {
        for (key, values) in labels {
            self.labels.insert((group, key.clone()), values.clone());
        }
    }

    fn retract(&self, group: LabelGroup, keys: &[String]) {
        for key in keys {
            self.labels.remove(&(group, key.clone()));
        }
        self.retractions.lock().unwrap_or_else(PoisonError::into_inner).push((group, keys.to_vec()));
    }
}

/// Labels one resource published in its last apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSnapshot {
    pub upstreams: LabelSet,
    pub peers: LabelSet,
    pub zones: LabelSet,
}

impl LabelSnapshot {
    pub fn for_ingress(ingress_ex: &IngressEx, upstreams: &[ingress::Upstream]) -> Self {
        let mut snapshot = Self::default();
        let meta = &ingress_ex.ingress.metadata;

        for u in upstreams {
            snapshot.upstreams.insert(u.name.clone(), u.upstream_labels.values());
            for server in &u.upstream_servers {
                let address = format!("{}:{}", server.address, server.port);
                let pod = ingress_ex.pods_by_ip.get(&address).map(|p| p.name.clone()).unwrap_or_default();
                snapshot.peers.insert(format!("{}/{}", u.name, address), vec![pod]);
            }
        }

        for rule in &ingress_ex.ingress.spec.rules {
            snapshot
                .zones
                .insert(rule.host.clone(), vec!["ingress".to_string(), meta.name.clone(), meta.namespace.clone()]);
        }

        snapshot
    }

    pub fn for_virtual_server(vs_ex: &VirtualServerEx, upstreams: &[http::Upstream]) -> Self {
        let mut snapshot = Self::default();
        let vs = &vs_ex.virtual_server;

        for u in upstreams {
            snapshot.upstreams.insert(u.name.clone(), u.upstream_labels.values());
            for server in &u.servers {
                let pod = vs_ex.pods_by_ip.get(&server.address).map(|p| p.name.clone()).unwrap_or_default();
                snapshot.peers.insert(format!("{}/{}", u.name, server.address), vec![pod]);
            }
        }

        snapshot.zones.insert(
            vs.spec.host.clone(),
            vec!["virtualserver".to_string(), vs.metadata.name.clone(), vs.metadata.namespace.clone()],
        );

        snapshot
    }

    pub fn for_transport_server(ts_ex: &TransportServerEx, upstreams: &[stream::StreamUpstream]) -> Self {
        let mut snapshot = Self::default();
        let ts = &ts_ex.transport_server;

        for u in upstreams {
            snapshot.upstreams.insert(u.name.clone(), u.upstream_labels.values());
            for server in &u.servers {
                let pod = ts_ex.pods_by_ip.get(&server.address).map(|p| p.name.clone()).unwrap_or_default();
                snapshot.peers.insert(format!("{}/{}", u.name, server.address), vec![pod]);
            }
        }

        let zone = if ts.spec.host.is_empty() { &ts.spec.listener.name } else { &ts.spec.host };
        snapshot.zones.insert(
            zone.clone(),
            vec!["transportserver".to_string(), ts.metadata.name.clone(), ts.metadata.namespace.clone()],
        );

        snapshot
    }
}

/// Sinks an apply publishes to. The latency sink never sees zone labels
/// or stream labels.
#[derive(Clone, Copy, Default)]
pub struct LabelTargets<'a> {
    pub general: Option<&'a dyn LabelSink>,
    pub latency: Option<&'a dyn LabelSink>,
}

impl LabelTargets<'_> {
    pub fn is_empty(&self) -> bool {
        self.general.is_none() && self.latency.is_none()
    }
}

fn removed_keys(old: &LabelSet, new: &LabelSet) -> Vec<String> {
    old.keys().filter(|k| !new.contains_key(*k)).cloned().collect()
}

fn retract(sink: &dyn LabelSink, group: LabelGroup, keys: &[String]) {
    if !keys.is_empty() {
        sink.retract(group, keys);
    }
}

/// Per-resource label snapshots
#[derive(Debug, Default)]
pub struct LabelIndex {
    snapshots: BTreeMap<ResourceKey, LabelSnapshot>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, key: &ResourceKey) -> Option<&LabelSnapshot> {
        self.snapshots.get(key)
    }

    /// Publish `snapshot` for `key` and retract what the previous snapshot
    /// had and this one lacks
    pub fn update(&mut self, key: ResourceKey, snapshot: LabelSnapshot, targets: LabelTargets<'_>) {
        let previous = self.snapshots.get(&key).cloned().unwrap_or_default();
        let removed_upstreams = removed_keys(&previous.upstreams, &snapshot.upstreams);
        let removed_peers = removed_keys(&previous.peers, &snapshot.peers);
        let removed_zones = removed_keys(&previous.zones, &snapshot.zones);

        let groups = Groups::for_kind(key.kind);

        if let (Some(latency), false) = (targets.latency, groups.stream) {
            latency.upsert(groups.upstream, &snapshot.upstreams);
            retract(latency, groups.upstream, &removed_upstreams);
            latency.upsert(groups.peer, &snapshot.peers);
            retract(latency, groups.peer, &removed_peers);
        }

        if let Some(general) = targets.general {
            general.upsert(groups.peer, &snapshot.peers);
            retract(general, groups.peer, &removed_peers);
            general.upsert(groups.upstream, &snapshot.upstreams);
            retract(general, groups.upstream, &removed_upstreams);
            general.upsert(groups.zone, &snapshot.zones);
            retract(general, groups.zone, &removed_zones);
        }

        tracing::debug!(
            resource = %key,
            removed_upstreams = removed_upstreams.len(),
            removed_peers = removed_peers.len(),
            "Updated metric labels"
        );
        self.snapshots.insert(key, snapshot);
    }

    /// Retract every label of `key` and forget it
    pub fn delete(&mut self, key: &ResourceKey, targets: LabelTargets<'_>) {
        let Some(snapshot) = self.snapshots.remove(key) else {
            return;
        };
        let groups = Groups::for_kind(key.kind);
        let upstreams: Vec<String> = snapshot.upstreams.into_keys().collect();
        let peers: Vec<String> = snapshot.peers.into_keys().collect();
        let zones: Vec<String> = snapshot.zones.into_keys().collect();

        if let (Some(latency), false) = (targets.latency, groups.stream) {
            retract(latency, groups.upstream, &upstreams);
            retract(latency, groups.peer, &peers);
        }

        if let Some(general) = targets.general {
            retract(general, groups.upstream, &upstreams);
            retract(general, groups.zone, &zones);
            retract(general, groups.peer, &peers);
        }
    }
}

struct Groups {
    stream: bool,
    upstream: LabelGroup,
    peer: LabelGroup,
    zone: LabelGroup,
}

impl Groups {
    fn for_kind(kind: ResourceKind) -> Self {
        if kind == ResourceKind::TransportServer {
            Self {
                stream: true,
                upstream: LabelGroup::StreamUpstream,
                peer: LabelGroup::StreamUpstreamPeer,
                zone: LabelGroup::StreamServerZone,
            }
        } else {
            Self {
                stream: false,
                upstream: LabelGroup::Upstream,
                peer: LabelGroup::UpstreamPeer,
                zone: LabelGroup::ServerZone,
            }
        }
    }
}
