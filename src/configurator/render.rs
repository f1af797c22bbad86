//! Render executor: compiled model to configuration bytes.

use serde::Serialize;

use crate::errors::{ConfiguratorError, Result};
use crate::model::{IngressNginxConfig, MainConfig, TlsPassthroughHostsConfig, TransportServerConfig, VirtualServerConfig};
use crate::params::ConfigParams;

/// Turns a compiled model into the bytes written for the proxy
pub trait Renderer: Send + Sync {
    fn render_virtual_server(&self, config: &VirtualServerConfig) -> Result<Vec<u8>>;

    fn render_ingress(&self, config: &IngressNginxConfig) -> Result<Vec<u8>>;

    fn render_transport_server(&self, config: &TransportServerConfig) -> Result<Vec<u8>>;

    fn render_main(&self, config: &MainConfig) -> Result<Vec<u8>>;

    fn render_passthrough_hosts(&self, config: &TlsPassthroughHostsConfig) -> Result<Vec<u8>>;

    /// Swap in the template overrides carried by `params`. Renderers
    /// without templates keep their output unchanged.
    fn update_templates(&mut self, _params: &ConfigParams) -> Result<()> {
        Ok(())
    }
}

/// Renders every model as pretty JSON. Field order follows the model and
/// every map in it is sorted, so equal models give equal bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl JsonRenderer {
    pub fn new() -> Self {
        Self
    }

    fn render<T: Serialize>(resource: &str, value: &T) -> Result<Vec<u8>> {
        let mut bytes =
            serde_json::to_vec_pretty(value).map_err(|e| ConfiguratorError::render(resource, e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl Renderer for JsonRenderer {
    fn render_virtual_server(&self, config: &VirtualServerConfig) -> Result<Vec<u8>> {
        Self::render("VirtualServer", config)
    }

    fn render_ingress(&self, config: &IngressNginxConfig) -> Result<Vec<u8>> {
        Self::render("Ingress", config)
    }

    fn render_transport_server(&self, config: &TransportServerConfig) -> Result<Vec<u8>> {
        Self::render("TransportServer", config)
    }

    fn render_main(&self, config: &MainConfig) -> Result<Vec<u8>> {
        Self::render("main", config)
    }

    fn render_passthrough_hosts(&self, config: &TlsPassthroughHostsConfig) -> Result<Vec<u8>> {
        Self::render("TLS passthrough hosts", config)
    }

    fn update_templates(&mut self, params: &ConfigParams) -> Result<()> {
        if params.main_template.is_some() || params.ingress_template.is_some() || params.virtual_server_template.is_some() {
            tracing::warn!("Template overrides are not used by the JSON renderer");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_renderer_is_deterministic() {
        let mut hosts = TlsPassthroughHostsConfig::new();
        hosts.insert("b.example.com".to_string(), "unix:/b.sock".to_string());
        hosts.insert("a.example.com".to_string(), "unix:/a.sock".to_string());

        let renderer = JsonRenderer::new();
        let first = renderer.render_passthrough_hosts(&hosts).unwrap();
        let second = renderer.render_passthrough_hosts(&hosts.clone()).unwrap();

        assert_eq!(first, second);
        let text = String::from_utf8(first).unwrap();
        assert!(text.find("a.example.com").unwrap() < text.find("b.example.com").unwrap());
    }

    /// Renders the main config only, relying on the trait defaults
    struct MainOnly;

    impl Renderer for MainOnly {
        fn render_virtual_server(&self, _config: &VirtualServerConfig) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn render_ingress(&self, _config: &IngressNginxConfig) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn render_transport_server(&self, _config: &TransportServerConfig) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn render_main(&self, config: &MainConfig) -> Result<Vec<u8>> {
            JsonRenderer::new().render_main(config)
        }

        fn render_passthrough_hosts(&self, _config: &TlsPassthroughHostsConfig) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_default_template_update_keeps_output() {
        let mut renderer = MainOnly;
        let main = MainConfig::default();
        let before = renderer.render_main(&main).unwrap();

        let params = ConfigParams { main_template: Some("worker_processes 1;".to_string()), ..Default::default() };
        renderer.update_templates(&params).unwrap();

        assert_eq!(renderer.render_main(&main).unwrap(), before);
    }
}
