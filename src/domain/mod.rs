//! Domain layer
//!
//! Input resources as the compiler sees them: immutable snapshots of
//! Ingresses, VirtualServers and their routes, TransportServers, policies,
//! secret references and live endpoints. Nothing in here performs I/O.
//!
//! ## Module Organization
//!
//! - `meta`: object metadata and stable resource keys
//! - `ingress`: Ingress and mergeable master/minion groups
//! - `virtual_server`: VirtualServer, VirtualServerRoute and the route tree
//! - `transport_server`: TransportServer and GlobalConfiguration listeners
//! - `policy`: Policy resources and the `PolicyKind` sum type
//! - `secret`: secret references handed over by the secret store
//! - `endpoints`: endpoint snapshots and their keys

pub mod config_map;
pub mod endpoints;
pub mod ingress;
pub mod meta;
pub mod policy;
pub mod secret;
pub mod transport_server;
pub mod virtual_server;

pub use config_map::ConfigMap;
pub use endpoints::{endpoints_key, external_name_svc_key, EndpointMap, PodInfo};
pub use ingress::{
    HealthProbe, HttpIngressPath, HttpIngressRuleValue, Ingress, IngressBackend, IngressEx,
    IngressRule, IngressSpec, IngressTls, MergeableIngresses, PathType, ServicePort,
};
pub use meta::{split_namespaced_name, ObjectMeta, ResourceKey, ResourceKind};
pub use policy::{Policy, PolicyKind, PolicyReference, PolicySpec};
pub use secret::{lookup_secret, Secret, SecretReference, SecretRefs, SecretType};
pub use transport_server::{
    GlobalConfiguration, Listener, TransportServer, TransportServerEx, TransportServerListener,
    TransportServerUpstream,
};
pub use virtual_server::{
    Action, ActionProxy, ActionRedirect, ActionReturn, Condition, ErrorPage, ErrorPageReturn, Header,
    Match, Route, Split, Tls, TlsRedirect, Upstream, VirtualServer, VirtualServerEx, VirtualServerRoute,
    VirtualServerRouteSpec, VirtualServerSpec,
};
