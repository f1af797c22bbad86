//! TransportServer compile pass.

use std::collections::BTreeMap;

use crate::domain::{endpoints_key, TransportServerEx};
use crate::model::stream::{StreamServer, StreamUpstream, StreamUpstreamServer, TransportServerConfig};
use crate::model::UpstreamLabels;
use crate::upstream::{UpstreamNamer, NON_EXISTING_UNIX_SOCKET};

/// Compile a TransportServer bound to the listener on `listener_port`
pub fn generate_transport_server_config(
    ts_ex: &TransportServerEx,
    listener_port: u16,
    is_plus: bool,
) -> TransportServerConfig {
    let ts = &ts_ex.transport_server;
    let meta = &ts.metadata;
    let namer = UpstreamNamer::for_transport_server(ts);
    let passthrough = ts_ex.is_tls_passthrough();

    let upstreams = ts
        .spec
        .upstreams
        .iter()
        .map(|u| {
            // Subselectors are not supported on stream upstreams
            let key = endpoints_key(&meta.namespace, &u.service, &BTreeMap::new(), u.port);
            let endpoints = ts_ex.endpoints.get(&key).map(Vec::as_slice).unwrap_or_default();

            let mut servers: Vec<StreamUpstreamServer> = endpoints.iter().map(StreamUpstreamServer::new).collect();
            if !is_plus && servers.is_empty() {
                servers.push(StreamUpstreamServer::new(NON_EXISTING_UNIX_SOCKET));
            }

            StreamUpstream {
                name: namer.name_for_upstream(&u.name),
                servers,
                upstream_labels: UpstreamLabels::new(&u.service, "transportserver", &meta.name, &meta.namespace),
            }
        })
        .collect();

    let parameters = ts.spec.upstream_parameters.as_ref();
    let pass = ts.spec.action.as_ref().map(|a| a.pass.as_str()).unwrap_or_default();

    let server = StreamServer {
        tls_passthrough: passthrough,
        unix_socket: if passthrough { passthrough_socket(&meta.namespace, &meta.name) } else { String::new() },
        port: listener_port,
        udp: ts.spec.listener.protocol == "UDP",
        status_zone: if passthrough { ts.spec.host.clone() } else { ts.spec.listener.name.clone() },
        proxy_requests: parameters.and_then(|p| p.udp_requests),
        proxy_responses: parameters.and_then(|p| p.udp_responses),
        proxy_pass: namer.name_for_upstream(pass),
        name: meta.name.clone(),
        namespace: meta.namespace.clone(),
    };

    tracing::debug!(transport_server = %ts_ex.key(), port = listener_port, "compiled TransportServer");

    TransportServerConfig { server, upstreams }
}

/// Local socket the passthrough map forwards a host to
pub fn passthrough_socket(namespace: &str, name: &str) -> String {
    format!("unix:/var/lib/nginx/passthrough-{}_{}.sock", namespace, name)
}
