//! Location blocks for proxy, redirect and return actions.

use crate::domain::{ActionProxy, ErrorPage as ErrorPageSpec, Upstream};
use crate::model::http::{AddHeader, ErrorPage, Header, Location, Return, ReturnLocation};
use crate::params::ConfigParams;
use crate::upstream::generation::{or_default, proxy_pass_protocol};
use crate::upstream::{upstream_has_keepalive, NGINX_418_SERVER};

use super::error_pages::generate_error_pages;

/// Settings shared by every location compiled for one route
#[derive(Debug, Clone, Copy)]
pub struct LocationSettings<'a> {
    pub params: &'a ConfigParams,
    pub error_pages: &'a [ErrorPageSpec],
    pub error_page_index: usize,
    pub snippets: &'a [String],
    /// Public path of the route
    pub original_path: &'a str,
    /// `(name, namespace)` of the owning VirtualServerRoute
    pub vsr: Option<(&'a str, &'a str)>,
}

/// Quote a regex path so the proxy does not choke on special characters
pub fn generate_path(path: &str) -> String {
    if let Some(regex) = path.strip_prefix("~*") {
        return format!(r#"~* "{}""#, regex.trim_start_matches(' '));
    }
    if let Some(regex) = path.strip_prefix('~') {
        return format!(r#"~ "{}""#, regex.trim_start_matches(' '));
    }
    path.to_string()
}

/// Rewrites for a proxied location. Internal locations always recover the
/// original request URI first.
pub fn generate_rewrites(path: &str, proxy: Option<&ActionProxy>, internal: bool, original_path: &str) -> Vec<String> {
    let Some(proxy) = proxy.filter(|p| !p.rewrite_path.is_empty()) else {
        return Vec::new();
    };

    let path = if original_path.is_empty() { path } else { original_path };
    let is_regex = path.starts_with('~');
    let trimmed = path.trim_start_matches('~').trim_start_matches('*').trim();

    let mut rewrites = Vec::new();
    if internal {
        rewrites.push("^ $request_uri".to_string());
    }

    if is_regex {
        rewrites.push(format!(r#""^{}" "{}" break"#, trimmed, proxy.rewrite_path));
    } else if internal {
        rewrites.push(format!(r#""^{}(.*)$" "{}$1" break"#, trimmed, proxy.rewrite_path));
    }

    rewrites
}

/// Rewrite carried by `proxy_pass` itself, only for external prefix and
/// exact locations
pub fn proxy_pass_rewrite(path: &str, proxy: Option<&ActionProxy>, internal: bool) -> String {
    match proxy {
        Some(proxy) if !internal && (path.starts_with('/') || path.starts_with('=')) => proxy.rewrite_path.clone(),
        _ => String::new(),
    }
}

pub fn proxy_pass(tls: bool, upstream_name: &str, internal: bool, proxy: Option<&ActionProxy>) -> String {
    let pass = format!("{}://{}", proxy_pass_protocol(tls), upstream_name);
    let rewrites = proxy.is_some_and(|p| !p.rewrite_path.is_empty());
    if internal && !rewrites {
        return format!("{}$request_uri", pass);
    }
    pass
}

fn proxy_set_headers(proxy: Option<&ActionProxy>) -> Vec<Header> {
    proxy
        .and_then(|p| p.request_headers.as_ref())
        .map(|rh| rh.set.iter().map(|h| Header::new(&h.name, &h.value)).collect())
        .unwrap_or_default()
}

fn proxy_pass_request_headers(proxy: Option<&ActionProxy>) -> bool {
    proxy.and_then(|p| p.request_headers.as_ref()).and_then(|rh| rh.pass).unwrap_or(true)
}

/// Location that proxies to an upstream
pub fn location_for_proxying(
    path: &str,
    upstream_name: &str,
    upstream: &Upstream,
    settings: &LocationSettings<'_>,
    internal: bool,
    proxy_ssl_name: &str,
    proxy: Option<&ActionProxy>,
) -> Location {
    let params = settings.params;
    let response_headers = proxy.and_then(|p| p.response_headers.as_ref());
    let (vsr_name, vsr_namespace) = settings.vsr.unwrap_or_default();

    Location {
        path: generate_path(path),
        internal,
        snippets: settings.snippets.to_vec(),
        proxy_connect_timeout: or_default(&upstream.proxy_connect_timeout, &params.proxy_connect_timeout),
        proxy_read_timeout: or_default(&upstream.proxy_read_timeout, &params.proxy_read_timeout),
        proxy_send_timeout: or_default(&upstream.proxy_send_timeout, &params.proxy_send_timeout),
        client_max_body_size: or_default(&upstream.client_max_body_size, &params.client_max_body_size),
        proxy_max_temp_file_size: params.proxy_max_temp_file_size.clone(),
        proxy_buffering: upstream.buffering.unwrap_or(params.proxy_buffering),
        proxy_buffers: upstream
            .buffers
            .as_ref()
            .map(|b| format!("{} {}", b.number, b.size))
            .unwrap_or_else(|| params.proxy_buffers.clone()),
        proxy_buffer_size: or_default(&upstream.proxy_buffer_size, &params.proxy_buffer_size),
        proxy_pass: proxy_pass(upstream.tls.enable, upstream_name, internal, proxy),
        proxy_next_upstream: or_default(&upstream.proxy_next_upstream, "error timeout"),
        proxy_next_upstream_timeout: or_default(&upstream.proxy_next_upstream_timeout, "0s"),
        proxy_next_upstream_tries: upstream.proxy_next_upstream_tries,
        proxy_intercept_errors: !settings.error_pages.is_empty(),
        proxy_pass_request_headers: proxy_pass_request_headers(proxy),
        proxy_set_headers: proxy_set_headers(proxy),
        proxy_hide_headers: response_headers.map(|rh| rh.hide.clone()).unwrap_or_default(),
        proxy_pass_headers: response_headers.map(|rh| rh.pass.clone()).unwrap_or_default(),
        proxy_ignore_headers: response_headers.map(|rh| rh.ignore.join(" ")).unwrap_or_default(),
        add_headers: response_headers
            .map(|rh| {
                rh.add
                    .iter()
                    .map(|h| AddHeader { header: Header::new(&h.header.name, &h.header.value), always: h.always })
                    .collect()
            })
            .unwrap_or_default(),
        proxy_pass_rewrite: proxy_pass_rewrite(path, proxy, internal),
        rewrites: generate_rewrites(path, proxy, internal, settings.original_path),
        has_keepalive: upstream_has_keepalive(upstream, params),
        error_pages: generate_error_pages(settings.error_page_index, settings.error_pages),
        proxy_ssl_name: proxy_ssl_name.to_string(),
        service_name: upstream.service.clone(),
        is_vsr: settings.vsr.is_some(),
        vsr_name: vsr_name.to_string(),
        vsr_namespace: vsr_namespace.to_string(),
        ..Default::default()
    }
}

/// Location answering 418 internally, turned into a redirect by its error page
pub fn location_for_redirect(path: &str, snippets: &[String], url: &str, code: i64) -> Location {
    Location {
        path: path.to_string(),
        snippets: snippets.to_vec(),
        proxy_intercept_errors: true,
        internal_proxy_pass: format!("http://{}", NGINX_418_SERVER),
        error_pages: vec![ErrorPage {
            name: url.to_string(),
            codes: "418".to_string(),
            response_code: if code == 0 { 301 } else { code },
        }],
        ..Default::default()
    }
}

/// Location answering 418 internally, turned into a canned response by a
/// named return location `@return_{index}`
pub fn location_for_return(
    path: &str,
    snippets: &[String],
    code: i64,
    content_type: &str,
    body: &str,
    return_index: usize,
) -> (Location, ReturnLocation) {
    let name = format!("@return_{}", return_index);
    let location = Location {
        path: path.to_string(),
        snippets: snippets.to_vec(),
        proxy_intercept_errors: true,
        internal_proxy_pass: format!("http://{}", NGINX_418_SERVER),
        error_pages: vec![ErrorPage {
            name: name.clone(),
            codes: "418".to_string(),
            response_code: if code == 0 { 200 } else { code },
        }],
        ..Default::default()
    };
    let return_location = ReturnLocation {
        name,
        default_type: if content_type.is_empty() { "text/plain".to_string() } else { content_type.to_string() },
        return_: Return::new(0, body),
    };
    (location, return_location)
}
