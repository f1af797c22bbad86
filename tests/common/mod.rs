//! Shared fixtures for integration tests.

#![allow(dead_code)]

use ingress_configurator::domain::transport_server::{GlobalConfigurationSpec, TransportServerAction, TransportServerSpec};
use ingress_configurator::domain::{
    Action, Condition, GlobalConfiguration, HttpIngressPath, HttpIngressRuleValue, Ingress, IngressBackend, IngressEx,
    IngressRule, IngressSpec, Listener, Match, ObjectMeta, Route, Split, TransportServer, TransportServerEx,
    TransportServerListener, TransportServerUpstream, Upstream, VirtualServer, VirtualServerEx, VirtualServerRoute,
    VirtualServerRouteSpec, VirtualServerSpec,
};

/// The cafe VirtualServer: `/tea` split 90/10 between two versions and
/// `/coffee` delegated to a VirtualServerRoute matching on `x-version`
pub fn cafe_virtual_server() -> VirtualServerEx {
    let mut vs_ex = VirtualServerEx::new(VirtualServer {
        metadata: ObjectMeta::new("default", "cafe"),
        spec: VirtualServerSpec {
            host: "cafe.example.com".to_string(),
            upstreams: vec![Upstream::new("tea-v1", "tea-v1-svc", 80), Upstream::new("tea-v2", "tea-v2-svc", 80)],
            routes: vec![
                Route {
                    path: "/tea".to_string(),
                    splits: vec![Split::new(90, Action::pass("tea-v1")), Split::new(10, Action::pass("tea-v2"))],
                    ..Default::default()
                },
                Route { path: "/coffee".to_string(), route: "coffee".to_string(), ..Default::default() },
            ],
            ..Default::default()
        },
    });

    vs_ex.virtual_server_routes.push(VirtualServerRoute {
        metadata: ObjectMeta::new("default", "coffee"),
        spec: VirtualServerRouteSpec {
            host: "cafe.example.com".to_string(),
            upstreams: vec![
                Upstream::new("coffee-v1", "coffee-v1-svc", 80),
                Upstream::new("coffee-v2", "coffee-v2-svc", 80),
            ],
            subroutes: vec![Route {
                path: "/coffee".to_string(),
                matches: vec![Match {
                    conditions: vec![Condition::header("x-version", "v2")],
                    action: Some(Action::pass("coffee-v2")),
                    ..Default::default()
                }],
                action: Some(Action::pass("coffee-v1")),
                ..Default::default()
            }],
            ..Default::default()
        },
    });

    for (svc, ip) in [
        ("tea-v1-svc", "10.0.0.1"),
        ("tea-v2-svc", "10.0.0.2"),
        ("coffee-v1-svc", "10.0.0.3"),
        ("coffee-v2-svc", "10.0.0.4"),
    ] {
        vs_ex.endpoints.insert(format!("default/{}:80", svc), vec![format!("{}:80", ip)]);
    }
    vs_ex
}

/// Plain Ingress routing `cafe.example.com/tea` to `tea-svc:80`
pub fn cafe_ingress() -> IngressEx {
    let mut ingress_ex = IngressEx::new(Ingress {
        metadata: ObjectMeta::new("default", "cafe-ingress"),
        spec: IngressSpec {
            rules: vec![IngressRule {
                host: "cafe.example.com".to_string(),
                http: Some(HttpIngressRuleValue {
                    paths: vec![HttpIngressPath::new("/tea", IngressBackend::new("tea-svc", 80))],
                }),
            }],
            ..Default::default()
        },
    });
    ingress_ex.endpoints.insert("tea-svc80".to_string(), vec!["10.0.0.10:80".to_string()]);
    ingress_ex
}

pub fn passthrough_transport_server(name: &str, host: &str) -> TransportServerEx {
    let mut ts_ex = TransportServerEx::new(TransportServer {
        metadata: ObjectMeta::new("default", name),
        spec: TransportServerSpec {
            listener: TransportServerListener::new("tls-passthrough", "TLS_PASSTHROUGH"),
            host: host.to_string(),
            upstreams: vec![TransportServerUpstream::new("app", "app-svc", 8443)],
            action: Some(TransportServerAction { pass: "app".to_string() }),
            ..Default::default()
        },
    });
    ts_ex.endpoints.insert("default/app-svc:8443".to_string(), vec!["10.0.0.30:8443".to_string()]);
    ts_ex
}

pub fn dns_transport_server() -> TransportServerEx {
    let mut ts_ex = TransportServerEx::new(TransportServer {
        metadata: ObjectMeta::new("default", "dns"),
        spec: TransportServerSpec {
            listener: TransportServerListener::new("dns-udp", "UDP"),
            upstreams: vec![TransportServerUpstream::new("dns-app", "coredns", 5353)],
            action: Some(TransportServerAction { pass: "dns-app".to_string() }),
            ..Default::default()
        },
    });
    ts_ex.endpoints.insert("default/coredns:5353".to_string(), vec!["10.0.0.20:5353".to_string()]);
    ts_ex
}

pub fn global_configuration(listeners: Vec<Listener>) -> GlobalConfiguration {
    GlobalConfiguration {
        metadata: ObjectMeta::new("nginx-ingress", "nginx-configuration"),
        spec: GlobalConfigurationSpec { listeners },
    }
}
