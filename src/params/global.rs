//! Listener table from the GlobalConfiguration resource.

use super::config_params::{GlobalConfigParams, ListenerParams};
use crate::domain::GlobalConfiguration;

/// Build the listener table. The TLS passthrough listener is always
/// present when passthrough is enabled; names from the resource are
/// assumed unique.
pub fn parse_global_configuration(gc: &GlobalConfiguration, tls_passthrough: bool) -> GlobalConfigParams {
    let mut params =
        if tls_passthrough { GlobalConfigParams::with_tls_passthrough() } else { GlobalConfigParams::default() };

    for listener in &gc.spec.listeners {
        params.listeners.insert(
            listener.name.clone(),
            ListenerParams { port: listener.port, protocol: listener.protocol.clone() },
        );
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Listener, ObjectMeta};
    use crate::domain::transport_server::GlobalConfigurationSpec;

    #[test]
    fn test_parse_global_configuration() {
        let gc = GlobalConfiguration {
            metadata: ObjectMeta::new("nginx-ingress", "nginx-configuration"),
            spec: GlobalConfigurationSpec {
                listeners: vec![Listener::new("dns-udp", 5353, "UDP"), Listener::new("dns-tcp", 5353, "TCP")],
            },
        };

        let params = parse_global_configuration(&gc, false);
        assert_eq!(params.listeners.len(), 2);
        assert_eq!(params.listener_port("dns-udp"), Some(5353));

        let params = parse_global_configuration(&gc, true);
        assert_eq!(params.listeners.len(), 3);
        assert!(params.listener_exists("tls-passthrough", "TLS_PASSTHROUGH"));
    }
}
