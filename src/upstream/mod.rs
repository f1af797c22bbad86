//! # Upstream Namer and Endpoint Builder
//!
//! Deterministic upstream names, server lists with placeholder fallback,
//! and the upstream blocks of VirtualServers and their routes.

pub mod endpoints;
pub mod generation;
pub mod namer;

pub use endpoints::{build_servers, split_address, ServerList, NGINX_418_SERVER, NGINX_502_SERVER, NON_EXISTING_UNIX_SOCKET};
pub use generation::{
    create_upstreams_for_plus, generate_health_check, lb_method, server_config_for_plus, status_match,
    upstream_has_keepalive, OwnerKind, UpstreamGenerator, UpstreamOwner,
};
pub use namer::{ingress_upstream_name, jwt_redirect_location_name, proxy_ssl_name, UpstreamNamer};
