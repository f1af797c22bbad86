//! Ingress annotation layer and master/minion annotation filtering.

use std::collections::{BTreeMap, BTreeSet};

use super::config_params::ConfigParams;
use super::parsing::{self, OverrideMap};
use super::{HstsKeys, Layer, RejectedOverride};
use crate::domain::{IngressEx, ResourceKey, ResourceKind};

pub const JWT_KEY_ANNOTATION: &str = "nginx.com/jwt-key";

/// Annotations a master Ingress may not carry
pub const MASTER_DENYLIST: &[&str] = &[
    "nginx.org/rewrites",
    "nginx.org/ssl-services",
    "nginx.org/grpc-services",
    "nginx.org/websocket-services",
    "nginx.com/sticky-cookie-services",
    "nginx.com/health-checks",
    "nginx.com/health-checks-mandatory",
    "nginx.com/health-checks-mandatory-queue",
];

/// Annotations a minion Ingress may not carry
pub const MINION_DENYLIST: &[&str] = &[
    "nginx.org/proxy-hide-headers",
    "nginx.org/proxy-pass-headers",
    "nginx.org/redirect-to-https",
    "ingress.kubernetes.io/ssl-redirect",
    "nginx.org/hsts",
    "nginx.org/hsts-max-age",
    "nginx.org/hsts-include-subdomains",
    "nginx.org/server-tokens",
    "nginx.org/listen-ports",
    "nginx.org/listen-ports-ssl",
    "nginx.org/server-snippets",
];

/// Master annotations a minion inherits unless it sets them itself
pub const MINION_INHERITANCE_LIST: &[&str] = &[
    "nginx.org/proxy-connect-timeout",
    "nginx.org/proxy-read-timeout",
    "nginx.org/proxy-send-timeout",
    "nginx.org/client-max-body-size",
    "nginx.org/proxy-buffering",
    "nginx.org/proxy-buffers",
    "nginx.org/proxy-buffer-size",
    "nginx.org/proxy-max-temp-file-size",
    "nginx.org/upstream-zone-size",
    "nginx.org/location-snippets",
    "nginx.org/lb-method",
    "nginx.org/keepalive",
    "nginx.org/max-fails",
    "nginx.org/max-conns",
    "nginx.org/fail-timeout",
];

const INGRESS_HSTS_KEYS: HstsKeys = HstsKeys {
    enabled: "nginx.org/hsts",
    max_age: "nginx.org/hsts-max-age",
    include_subdomains: "nginx.org/hsts-include-subdomains",
    behind_proxy: "nginx.org/hsts-behind-proxy",
};

/// Apply an Ingress's annotations on top of `base`
pub fn parse_annotations(
    ingress_ex: &IngressEx,
    base: &ConfigParams,
    is_plus: bool,
) -> (ConfigParams, Vec<RejectedOverride>) {
    let meta = &ingress_ex.ingress.metadata;
    let context = ResourceKey::from_meta(ResourceKind::Ingress, meta);
    let mut layer = Layer::new(OverrideMap::new(&meta.annotations, &context));
    let mut params = base.clone();

    layer.set_lb_method("nginx.org/lb-method", is_plus, &mut params.lb_method);

    match layer.overrides.get_bool("nginx.com/health-checks") {
        Some(Ok(enabled)) if is_plus => params.health_check_enabled = enabled,
        Some(Ok(_)) => layer.ignored(
            "nginx.com/health-checks",
            "Annotation 'nginx.com/health-checks' requires NGINX Plus",
        ),
        Some(Err(e)) => layer.invalid("nginx.com/health-checks", e.to_string()),
        None => {}
    }

    // Both queue keys are only read when the gate before them is open
    if params.health_check_enabled {
        layer.set_bool("nginx.com/health-checks-mandatory", &mut params.health_check_mandatory);
    }
    if params.health_check_mandatory {
        layer.set_int(
            "nginx.com/health-checks-mandatory-queue",
            &mut params.health_check_mandatory_queue,
        );
    }

    if let Some(slow_start) = layer.overrides.raw("nginx.com/slow-start") {
        match parsing::parse_time(slow_start) {
            Err(e) => layer.invalid(
                "nginx.com/slow-start",
                format!(
                    "Ingress {}/{}: Invalid value nginx.org/slow-start: got {:?}: {}",
                    meta.namespace, meta.name, slow_start, e
                ),
            ),
            Ok(parsed) if is_plus => params.slow_start = parsed,
            Ok(_) => layer.ignored(
                "nginx.com/slow-start",
                "Annotation 'nginx.com/slow-start' requires NGINX Plus",
            ),
        }
    }

    layer.set_server_tokens("nginx.org/server-tokens", is_plus, &mut params.server_tokens);
    layer.set_list("nginx.org/server-snippets", "\n", &mut params.server_snippets);
    layer.set_list("nginx.org/location-snippets", "\n", &mut params.location_snippets);
    layer.set_string("nginx.org/proxy-connect-timeout", &mut params.proxy_connect_timeout);
    layer.set_string("nginx.org/proxy-read-timeout", &mut params.proxy_read_timeout);
    layer.set_string("nginx.org/proxy-send-timeout", &mut params.proxy_send_timeout);
    layer.set_list("nginx.org/proxy-hide-headers", ",", &mut params.proxy_hide_headers);
    layer.set_list("nginx.org/proxy-pass-headers", ",", &mut params.proxy_pass_headers);
    layer.set_string("nginx.org/client-max-body-size", &mut params.client_max_body_size);
    layer.set_bool("nginx.org/redirect-to-https", &mut params.redirect_to_https);
    layer.set_bool("ingress.kubernetes.io/ssl-redirect", &mut params.ssl_redirect);
    layer.set_bool("nginx.org/proxy-buffering", &mut params.proxy_buffering);
    layer.set_hsts_group(&INGRESS_HSTS_KEYS, &mut params);
    layer.set_string("nginx.org/proxy-buffers", &mut params.proxy_buffers);
    layer.set_string("nginx.org/proxy-buffer-size", &mut params.proxy_buffer_size);
    layer.set_string("nginx.org/upstream-zone-size", &mut params.upstream_zone_size);
    layer.set_string("nginx.org/proxy-max-temp-file-size", &mut params.proxy_max_temp_file_size);

    if is_plus {
        layer.set_string("nginx.com/jwt-realm", &mut params.jwt_realm);
        layer.set_string(JWT_KEY_ANNOTATION, &mut params.jwt_key);
        layer.set_string("nginx.com/jwt-token", &mut params.jwt_token);
        layer.set_string("nginx.com/jwt-login-url", &mut params.jwt_login_url);
    }

    set_ports(&mut layer, "nginx.org/listen-ports", &meta.name, &mut params.ports);
    set_ports(&mut layer, "nginx.org/listen-ports-ssl", &meta.name, &mut params.ssl_ports);

    layer.set_int("nginx.org/keepalive", &mut params.keepalive);
    layer.set_int("nginx.org/max-fails", &mut params.max_fails);
    layer.set_int("nginx.org/max-conns", &mut params.max_conns);
    layer.set_string("nginx.org/fail-timeout", &mut params.fail_timeout);

    (params, layer.finish())
}

fn set_ports(layer: &mut Layer<'_>, key: &str, name: &str, target: &mut Vec<u16>) {
    let Some(values) = layer.overrides.raw(key) else {
        return;
    };
    match parsing::parse_port_list(values) {
        Ok(ports) if !ports.is_empty() => *target = ports,
        Ok(_) => {}
        Err(e) => layer.invalid(key, format!("In {} {} contains invalid declaration: {}, ignoring", name, key, e)),
    }
}

pub fn websocket_services(ingress_ex: &IngressEx) -> BTreeSet<String> {
    service_list(ingress_ex, "nginx.org/websocket-services")
}

pub fn ssl_services(ingress_ex: &IngressEx) -> BTreeSet<String> {
    service_list(ingress_ex, "nginx.org/ssl-services")
}

pub fn grpc_services(ingress_ex: &IngressEx) -> BTreeSet<String> {
    service_list(ingress_ex, "nginx.org/grpc-services")
}

fn service_list(ingress_ex: &IngressEx, key: &str) -> BTreeSet<String> {
    ingress_ex.annotations().get(key).map(|v| parsing::parse_service_list(v)).unwrap_or_default()
}

/// Per-service rewrites. A malformed list yields no rewrites at all.
pub fn rewrites(ingress_ex: &IngressEx) -> BTreeMap<String, String> {
    match ingress_ex.annotations().get("nginx.org/rewrites") {
        Some(value) => parsing::parse_rewrite_list(value).unwrap_or_else(|e| {
            tracing::error!(ingress = %ingress_ex.key(), "{}", e);
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    }
}

/// Per-service sticky cookie arguments
pub fn session_persistence_services(ingress_ex: &IngressEx) -> BTreeMap<String, String> {
    match ingress_ex.annotations().get("nginx.com/sticky-cookie-services") {
        Some(value) => parsing::parse_sticky_service_list(value).unwrap_or_else(|e| {
            tracing::error!(ingress = %ingress_ex.key(), "{}", e);
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    }
}

/// Strip master-denied annotations, returning the removed keys in order
pub fn filter_master_annotations(annotations: &mut BTreeMap<String, String>) -> Vec<String> {
    filter_annotations(annotations, MASTER_DENYLIST)
}

/// Strip minion-denied annotations, returning the removed keys in order
pub fn filter_minion_annotations(annotations: &mut BTreeMap<String, String>) -> Vec<String> {
    filter_annotations(annotations, MINION_DENYLIST)
}

fn filter_annotations(annotations: &mut BTreeMap<String, String>, denylist: &[&str]) -> Vec<String> {
    let removed: Vec<String> =
        annotations.keys().filter(|k| denylist.contains(&k.as_str())).cloned().collect();
    for key in &removed {
        annotations.remove(key);
    }
    removed
}

/// Copy inheritable master annotations the minion does not define itself
pub fn merge_master_annotations_into_minion(
    minion: &mut BTreeMap<String, String>,
    master: &BTreeMap<String, String>,
) {
    for (key, value) in master {
        if MINION_INHERITANCE_LIST.contains(&key.as_str()) && !minion.contains_key(key) {
            minion.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Ingress, ObjectMeta};

    fn ingress_with(annotations: &[(&str, &str)]) -> IngressEx {
        let mut meta = ObjectMeta::new("default", "cafe-ingress");
        for (k, v) in annotations {
            meta = meta.with_annotation(*k, *v);
        }
        IngressEx::new(Ingress { metadata: meta, ..Default::default() })
    }

    #[test]
    fn test_invalid_bool_keeps_previous_value() {
        let ex = ingress_with(&[("nginx.org/proxy-buffering", "notabool")]);
        let (params, rejected) = parse_annotations(&ex, &ConfigParams::default(), false);
        assert!(params.proxy_buffering);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].key, "nginx.org/proxy-buffering");
    }

    #[test]
    fn test_hsts_group_is_atomic() {
        let ex = ingress_with(&[
            ("nginx.org/hsts", "true"),
            ("nginx.org/hsts-max-age", "not-a-number"),
            ("nginx.org/hsts-include-subdomains", "true"),
        ]);
        let base = ConfigParams::default();
        let (params, rejected) = parse_annotations(&ex, &base, false);
        assert!(!params.hsts);
        assert!(!params.hsts_include_subdomains);
        assert_eq!(params.hsts_max_age, base.hsts_max_age);
        assert_eq!(rejected.len(), 1);

        let ex = ingress_with(&[("nginx.org/hsts", "true"), ("nginx.org/hsts-max-age", "100")]);
        let (params, rejected) = parse_annotations(&ex, &base, false);
        assert!(params.hsts);
        assert_eq!(params.hsts_max_age, 100);
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_plus_only_keys_ignored_on_oss() {
        let ex = ingress_with(&[
            ("nginx.com/health-checks", "true"),
            ("nginx.com/slow-start", "10s"),
            ("nginx.com/jwt-key", "jwk-secret"),
        ]);
        let (params, rejected) = parse_annotations(&ex, &ConfigParams::default(), false);
        assert!(!params.health_check_enabled);
        assert!(params.slow_start.is_empty());
        assert!(params.jwt_key.is_empty());
        assert_eq!(rejected.len(), 2);

        let (params, rejected) = parse_annotations(&ex, &ConfigParams::default(), true);
        assert!(params.health_check_enabled);
        assert_eq!(params.slow_start, "10s");
        assert_eq!(params.jwt_key, "jwk-secret");
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_mandatory_queue_requires_both_gates() {
        let ex = ingress_with(&[
            ("nginx.com/health-checks-mandatory", "true"),
            ("nginx.com/health-checks-mandatory-queue", "10"),
        ]);
        let (params, _) = parse_annotations(&ex, &ConfigParams::default(), true);
        assert!(!params.health_check_mandatory);
        assert_eq!(params.health_check_mandatory_queue, 0);

        let ex = ingress_with(&[
            ("nginx.com/health-checks", "true"),
            ("nginx.com/health-checks-mandatory", "true"),
            ("nginx.com/health-checks-mandatory-queue", "10"),
        ]);
        let (params, _) = parse_annotations(&ex, &ConfigParams::default(), true);
        assert!(params.health_check_mandatory);
        assert_eq!(params.health_check_mandatory_queue, 10);
    }

    #[test]
    fn test_server_tokens_custom_string_on_plus() {
        let ex = ingress_with(&[("nginx.org/server-tokens", "my-server")]);
        let (params, _) = parse_annotations(&ex, &ConfigParams::default(), true);
        assert_eq!(params.server_tokens, "my-server");
        let (params, rejected) = parse_annotations(&ex, &ConfigParams::default(), false);
        assert_eq!(params.server_tokens, "on");
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_listen_ports() {
        let ex = ingress_with(&[("nginx.org/listen-ports", "80,8080"), ("nginx.org/listen-ports-ssl", "bad")]);
        let (params, rejected) = parse_annotations(&ex, &ConfigParams::default(), false);
        assert_eq!(params.ports, vec![80, 8080]);
        assert_eq!(params.ssl_ports, vec![443]);
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_filter_and_merge() {
        let mut master: BTreeMap<String, String> = [
            ("nginx.org/rewrites", "serviceName=tea rewrite=/"),
            ("nginx.org/proxy-read-timeout", "30s"),
            ("nginx.org/lb-method", "ip_hash"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let removed = filter_master_annotations(&mut master);
        assert_eq!(removed, vec!["nginx.org/rewrites".to_string()]);

        let mut minion: BTreeMap<String, String> = [
            ("nginx.org/lb-method", "least_conn"),
            ("nginx.org/server-tokens", "off"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let removed = filter_minion_annotations(&mut minion);
        assert_eq!(removed, vec!["nginx.org/server-tokens".to_string()]);

        merge_master_annotations_into_minion(&mut minion, &master);
        assert_eq!(minion["nginx.org/lb-method"], "least_conn");
        assert_eq!(minion["nginx.org/proxy-read-timeout"], "30s");
    }

    #[test]
    fn test_service_annotations() {
        let ex = ingress_with(&[
            ("nginx.org/ssl-services", "tea-svc,coffee-svc"),
            ("nginx.org/rewrites", "broken"),
        ]);
        assert!(ssl_services(&ex).contains("coffee-svc"));
        assert!(grpc_services(&ex).is_empty());
        assert!(rewrites(&ex).is_empty());
    }
}
