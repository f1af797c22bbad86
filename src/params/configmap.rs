//! Global settings layer: the controller ConfigMap, and the main config
//! generated from it.

use super::config_params::{ConfigParams, StaticConfigParams};
use super::parsing::OverrideMap;
use super::{HstsKeys, Layer, RejectedOverride};
use crate::domain::{ConfigMap, ResourceKey, ResourceKind};
use crate::model::MainConfig;

const CONFIGMAP_HSTS_KEYS: HstsKeys = HstsKeys {
    enabled: "hsts",
    max_age: "hsts-max-age",
    include_subdomains: "hsts-include-subdomains",
    behind_proxy: "hsts-behind-proxy",
};

/// Resolve the ConfigMap on top of the compiled defaults
pub fn parse_config_map(config_map: &ConfigMap, is_plus: bool) -> (ConfigParams, Vec<RejectedOverride>) {
    let meta = &config_map.metadata;
    let context = ResourceKey::from_meta(ResourceKind::ConfigMap, meta);
    let mut layer = Layer::new(OverrideMap::new(&config_map.data, &context));
    let mut params = ConfigParams::default();

    layer.set_server_tokens("server-tokens", is_plus, &mut params.server_tokens);
    layer.set_lb_method("lb-method", is_plus, &mut params.lb_method);
    layer.set_string("proxy-connect-timeout", &mut params.proxy_connect_timeout);
    layer.set_string("proxy-read-timeout", &mut params.proxy_read_timeout);
    layer.set_string("proxy-send-timeout", &mut params.proxy_send_timeout);
    layer.set_list("proxy-hide-headers", ",", &mut params.proxy_hide_headers);
    layer.set_list("proxy-pass-headers", ",", &mut params.proxy_pass_headers);
    layer.set_string("client-max-body-size", &mut params.client_max_body_size);
    layer.set_string("server-names-hash-bucket-size", &mut params.main_server_names_hash_bucket_size);
    layer.set_string("server-names-hash-max-size", &mut params.main_server_names_hash_max_size);
    layer.set_bool("http2", &mut params.http2);
    layer.set_bool("redirect-to-https", &mut params.redirect_to_https);
    layer.set_bool("ssl-redirect", &mut params.ssl_redirect);
    layer.set_hsts_group(&CONFIGMAP_HSTS_KEYS, &mut params);
    layer.set_bool("proxy-protocol", &mut params.proxy_protocol);
    layer.set_string("real-ip-header", &mut params.real_ip_header);
    layer.set_list("set-real-ip-from", ",", &mut params.set_real_ip_from);
    layer.set_bool("real-ip-recursive", &mut params.real_ip_recursive);
    layer.set_string("ssl-protocols", &mut params.main_server_ssl_protocols);
    layer.set_bool("ssl-prefer-server-ciphers", &mut params.main_server_ssl_prefer_server_ciphers);

    if let Some(ciphers) = layer.overrides.raw("ssl-ciphers") {
        params.main_server_ssl_ciphers = ciphers.trim_matches('\n').to_string();
    }
    if let Some(dhparam) = layer.overrides.raw("ssl-dhparam-file") {
        params.main_server_ssl_dhparam_file_content = Some(dhparam.trim_matches('\n').to_string());
    }

    layer.set_string("error-log-level", &mut params.main_error_log_level);
    layer.set_bool("access-log-off", &mut params.main_access_log_off);
    layer.set_list("log-format", "\n", &mut params.main_log_format);
    set_escaping(&layer, "log-format-escaping", &mut params.main_log_format_escaping);
    layer.set_list("stream-log-format", "\n", &mut params.main_stream_log_format);
    set_escaping(&layer, "stream-log-format-escaping", &mut params.main_stream_log_format_escaping);
    layer.set_bool("default-server-access-log-off", &mut params.default_server_access_log_off);
    layer.set_bool("proxy-buffering", &mut params.proxy_buffering);
    layer.set_string("proxy-buffers", &mut params.proxy_buffers);
    layer.set_string("proxy-buffer-size", &mut params.proxy_buffer_size);
    layer.set_string("proxy-max-temp-file-size", &mut params.proxy_max_temp_file_size);
    layer.set_list("main-snippets", "\n", &mut params.main_main_snippets);
    layer.set_list("http-snippets", "\n", &mut params.main_http_snippets);
    layer.set_list("location-snippets", "\n", &mut params.location_snippets);
    layer.set_list("server-snippets", "\n", &mut params.server_snippets);

    if let Some(workers) = layer.overrides.raw("worker-processes") {
        if workers == "auto" || workers.parse::<i64>().is_ok() {
            params.main_worker_processes = workers.to_string();
        } else {
            layer.invalid(
                "worker-processes",
                format!(
                    "Configmap {}/{}: Invalid value for worker-processes key: must be an integer or the string 'auto', got {:?}",
                    meta.namespace, meta.name, workers
                ),
            );
        }
    }

    layer.set_string("worker-cpu-affinity", &mut params.main_worker_cpu_affinity);
    layer.set_string("worker-shutdown-timeout", &mut params.main_worker_shutdown_timeout);
    layer.set_string("worker-connections", &mut params.main_worker_connections);
    layer.set_string("worker-rlimit-nofile", &mut params.main_worker_rlimit_nofile);
    layer.set_int("keepalive", &mut params.keepalive);
    layer.set_int("max-fails", &mut params.max_fails);
    layer.set_string("upstream-zone-size", &mut params.upstream_zone_size);
    layer.set_string("fail-timeout", &mut params.fail_timeout);

    if let Some(template) = layer.overrides.raw("main-template") {
        params.main_template = Some(template.to_string());
    }
    if let Some(template) = layer.overrides.raw("ingress-template") {
        params.ingress_template = Some(template.to_string());
    }
    if let Some(template) = layer.overrides.raw("virtualserver-template") {
        params.virtual_server_template = Some(template.to_string());
    }

    layer.set_list("stream-snippets", "\n", &mut params.main_stream_snippets);

    if let Some(addresses) = layer.overrides.get_string_list("resolver-addresses", ",") {
        if is_plus {
            params.resolver_addresses = addresses;
        } else {
            layer.ignored("resolver-addresses", "ConfigMap key 'resolver-addresses' requires NGINX Plus");
        }
    }
    match layer.overrides.get_bool("resolver-ipv6") {
        Some(Ok(ipv6)) if is_plus => params.resolver_ipv6 = ipv6,
        Some(Ok(_)) => layer.ignored("resolver-ipv6", "ConfigMap key 'resolver-ipv6' requires NGINX Plus"),
        Some(Err(e)) => layer.invalid("resolver-ipv6", e.to_string()),
        None => {}
    }
    for (key, target) in [
        ("resolver-valid", &mut params.resolver_valid),
        ("resolver-timeout", &mut params.resolver_timeout),
    ] {
        if let Some(value) = layer.overrides.raw(key) {
            if is_plus {
                *target = value.to_string();
            } else {
                layer.ignored(key, format!("ConfigMap key '{}' requires NGINX Plus", key));
            }
        }
    }

    layer.set_string("keepalive-timeout", &mut params.main_keepalive_timeout);
    layer.set_int("keepalive-requests", &mut params.main_keepalive_requests);
    layer.set_uint64("variables-hash-bucket-size", true, &mut params.variables_hash_bucket_size);
    layer.set_uint64("variables-hash-max-size", false, &mut params.variables_hash_max_size);

    layer.set_string("opentracing-tracer", &mut params.main_opentracing_tracer);
    layer.set_string("opentracing-tracer-config", &mut params.main_opentracing_tracer_config);
    if !params.main_opentracing_tracer.is_empty() || !params.main_opentracing_tracer_config.is_empty() {
        params.main_opentracing_load_module = true;
    }
    match layer.overrides.get_bool("opentracing") {
        Some(Ok(enabled)) if params.main_opentracing_load_module => params.main_opentracing_enabled = enabled,
        Some(Ok(_)) => layer.invalid(
            "opentracing",
            "ConfigMap Key 'opentracing' requires both 'opentracing-tracer' and 'opentracing-tracer-config' Keys configured, Opentracing will be disabled",
        ),
        Some(Err(e)) => layer.invalid("opentracing", e.to_string()),
        None => {}
    }

    (params, layer.finish())
}

fn set_escaping(layer: &Layer<'_>, key: &str, target: &mut String) {
    if let Some(value) = layer.overrides.raw(key) {
        let value = value.trim();
        if !value.is_empty() {
            *target = value.to_string();
        }
    }
}

/// Build the main (global) config from static and resolved parameters
pub fn generate_main_config(static_params: &StaticConfigParams, params: &ConfigParams) -> MainConfig {
    MainConfig {
        access_log_off: params.main_access_log_off,
        default_server_access_log_off: params.default_server_access_log_off,
        error_log_level: params.main_error_log_level.clone(),
        health_status: static_params.health_status,
        health_status_uri: static_params.health_status_uri.clone(),
        http2: params.http2,
        http_snippets: params.main_http_snippets.clone(),
        keepalive_requests: params.main_keepalive_requests,
        keepalive_timeout: params.main_keepalive_timeout.clone(),
        log_format: params.main_log_format.clone(),
        log_format_escaping: params.main_log_format_escaping.clone(),
        main_snippets: params.main_main_snippets.clone(),
        nginx_status: static_params.nginx_status,
        nginx_status_allow_cidrs: static_params.nginx_status_allow_cidrs.clone(),
        nginx_status_port: static_params.nginx_status_port,
        opentracing_enabled: params.main_opentracing_enabled,
        opentracing_load_module: params.main_opentracing_load_module,
        opentracing_tracer: params.main_opentracing_tracer.clone(),
        opentracing_tracer_config: params.main_opentracing_tracer_config.clone(),
        proxy_protocol: params.proxy_protocol,
        resolver_addresses: params.resolver_addresses.clone(),
        resolver_ipv6: params.resolver_ipv6,
        resolver_timeout: params.resolver_timeout.clone(),
        resolver_valid: params.resolver_valid.clone(),
        real_ip_header: params.real_ip_header.clone(),
        real_ip_recursive: params.real_ip_recursive,
        set_real_ip_from: params.set_real_ip_from.clone(),
        server_names_hash_bucket_size: params.main_server_names_hash_bucket_size.clone(),
        server_names_hash_max_size: params.main_server_names_hash_max_size.clone(),
        server_tokens: params.server_tokens.clone(),
        ssl_ciphers: params.main_server_ssl_ciphers.clone(),
        ssl_dhparam: params.main_server_ssl_dhparam.clone(),
        ssl_prefer_server_ciphers: params.main_server_ssl_prefer_server_ciphers,
        ssl_protocols: params.main_server_ssl_protocols.clone(),
        tls_passthrough: static_params.tls_passthrough,
        stream_log_format: params.main_stream_log_format.clone(),
        stream_log_format_escaping: params.main_stream_log_format_escaping.clone(),
        stream_snippets: params.main_stream_snippets.clone(),
        stub_status_over_unix_socket_for_oss: static_params.stub_status_over_unix_socket_for_oss,
        worker_cpu_affinity: params.main_worker_cpu_affinity.clone(),
        worker_processes: params.main_worker_processes.clone(),
        worker_shutdown_timeout: params.main_worker_shutdown_timeout.clone(),
        worker_connections: params.main_worker_connections.clone(),
        worker_rlimit_nofile: params.main_worker_rlimit_nofile.clone(),
        variables_hash_bucket_size: params.variables_hash_bucket_size,
        variables_hash_max_size: params.variables_hash_max_size,
        internal_route_server: static_params.enable_internal_routes,
        internal_route_server_name: static_params.pod_name.clone(),
        latency_metrics: static_params.enable_latency_metrics,
        preview_policies: static_params.enable_preview_policies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObjectMeta;

    fn config_map(entries: &[(&str, &str)]) -> ConfigMap {
        entries
            .iter()
            .fold(ConfigMap::new(ObjectMeta::new("nginx-ingress", "nginx-config")), |cm, (k, v)| {
                cm.with_entry(*k, *v)
            })
    }

    #[test]
    fn test_empty_config_map_yields_defaults() {
        let (params, rejected) = parse_config_map(&config_map(&[]), false);
        assert_eq!(params, ConfigParams::default());
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_fail_soft_per_key() {
        let cm = config_map(&[
            ("http2", "notabool"),
            ("proxy-read-timeout", "30s"),
            ("keepalive", "x"),
            ("max-fails", "3"),
        ]);
        let (params, rejected) = parse_config_map(&cm, false);
        assert!(!params.http2);
        assert_eq!(params.proxy_read_timeout, "30s");
        assert_eq!(params.keepalive, 0);
        assert_eq!(params.max_fails, 3);
        let keys: Vec<&str> = rejected.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["http2", "keepalive"]);
        assert!(rejected[0].message.contains("ConfigMap nginx-ingress/nginx-config 'http2' contains invalid bool"));
    }

    #[test]
    fn test_resolver_requires_plus() {
        let cm = config_map(&[("resolver-addresses", "10.0.0.1,10.0.0.2"), ("resolver-valid", "5s")]);
        let (params, rejected) = parse_config_map(&cm, false);
        assert!(params.resolver_addresses.is_empty());
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].message, "ConfigMap key 'resolver-addresses' requires NGINX Plus");

        let (params, rejected) = parse_config_map(&cm, true);
        assert_eq!(params.resolver_addresses, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(params.resolver_valid, "5s");
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_worker_processes() {
        let (params, _) = parse_config_map(&config_map(&[("worker-processes", "4")]), false);
        assert_eq!(params.main_worker_processes, "4");
        let (params, rejected) = parse_config_map(&config_map(&[("worker-processes", "many")]), false);
        assert_eq!(params.main_worker_processes, "auto");
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_opentracing_requires_tracer() {
        let (params, rejected) = parse_config_map(&config_map(&[("opentracing", "true")]), false);
        assert!(!params.main_opentracing_enabled);
        assert_eq!(rejected.len(), 1);

        let cm = config_map(&[
            ("opentracing", "true"),
            ("opentracing-tracer", "/usr/local/lib/libjaegertracing_plugin.so"),
        ]);
        let (params, _) = parse_config_map(&cm, false);
        assert!(params.main_opentracing_load_module);
        assert!(params.main_opentracing_enabled);
    }

    #[test]
    fn test_variables_hash_bucket_size_must_be_positive() {
        let cm = config_map(&[("variables-hash-bucket-size", "0"), ("variables-hash-max-size", "0")]);
        let (params, rejected) = parse_config_map(&cm, false);
        assert_eq!(params.variables_hash_bucket_size, 256);
        assert_eq!(params.variables_hash_max_size, 0);
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_generate_main_config() {
        let static_params = StaticConfigParams {
            nginx_status: true,
            nginx_status_port: 8080,
            tls_passthrough: true,
            ..Default::default()
        };
        let (params, _) = parse_config_map(&config_map(&[("worker-connections", "2048")]), false);
        let main = generate_main_config(&static_params, &params);
        assert!(main.nginx_status);
        assert_eq!(main.nginx_status_port, 8080);
        assert!(main.tls_passthrough);
        assert_eq!(main.worker_connections, "2048");
        assert_eq!(main.server_tokens, "on");
    }
}
