//! Server lists for upstreams, with placeholder fallback.

/// Placeholder for HTTP upstreams without endpoints; answers 502
pub const NGINX_502_SERVER: &str = "unix:/var/lib/nginx/nginx-502-server.sock";

/// Internal target used to turn redirects and returns into error pages
pub const NGINX_418_SERVER: &str = "unix:/var/lib/nginx/nginx-418-server.sock";

/// Placeholder for stream upstreams without endpoints
pub const NON_EXISTING_UNIX_SOCKET: &str = "unix:/var/lib/nginx/non-existing-unix-socket.sock";

/// Servers built for one upstream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerList {
    pub addresses: Vec<String>,
    /// True when the backend is an ExternalName service that was dropped
    /// because no resolver is configured
    pub external_name_ignored: bool,
}

impl ServerList {
    pub fn is_placeholder(&self, placeholder: &str) -> bool {
        self.addresses.len() == 1 && self.addresses[0] == placeholder
    }
}

/// Build the server list of an upstream.
///
/// An ExternalName backend cannot be resolved without a resolver, so its
/// list is emptied. `placeholder` is the server substituted for an empty
/// list; pass `None` when the proxy accepts empty upstream blocks.
pub fn build_servers(
    endpoints: &[String],
    is_external_name: bool,
    is_resolver_configured: bool,
    placeholder: Option<&str>,
) -> ServerList {
    let mut list = ServerList { addresses: endpoints.to_vec(), external_name_ignored: false };

    if is_external_name && !is_resolver_configured {
        list.addresses.clear();
        list.external_name_ignored = true;
    }

    if list.addresses.is_empty() {
        if let Some(placeholder) = placeholder {
            list.addresses.push(placeholder.to_string());
        }
    }

    list
}

/// Split an `ip:port` endpoint. The port is empty when absent.
pub fn split_address(endpoint: &str) -> (&str, &str) {
    match endpoint.rsplit_once(':') {
        Some((address, port)) => (address, port),
        None => (endpoint, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Vec<String> {
        vec!["10.0.0.1:80".to_string(), "10.0.0.2:80".to_string()]
    }

    #[test]
    fn test_build_servers_keeps_endpoint_order() {
        let list = build_servers(&endpoints(), false, false, Some(NGINX_502_SERVER));
        assert_eq!(list.addresses, endpoints());
        assert!(!list.external_name_ignored);
    }

    #[test]
    fn test_empty_endpoints_get_one_placeholder() {
        let list = build_servers(&[], false, false, Some(NGINX_502_SERVER));
        assert_eq!(list.addresses, vec![NGINX_502_SERVER.to_string()]);
        assert!(list.is_placeholder(NGINX_502_SERVER));

        let plus = build_servers(&[], false, false, None);
        assert!(plus.addresses.is_empty());
    }

    #[test]
    fn test_external_name_without_resolver_is_emptied() {
        let external = vec!["tea.example.com:80".to_string()];
        let list = build_servers(&external, true, false, None);
        assert!(list.addresses.is_empty());
        assert!(list.external_name_ignored);

        let resolved = build_servers(&external, true, true, None);
        assert_eq!(resolved.addresses, external);
        assert!(!resolved.external_name_ignored);
    }

    #[test]
    fn test_split_address() {
        assert_eq!(split_address("10.0.0.1:8080"), ("10.0.0.1", "8080"));
        assert_eq!(split_address("tea.example.com"), ("tea.example.com", ""));
    }
}
