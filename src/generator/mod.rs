//! # Generators
//!
//! One compile pass per routing resource. Each pass takes an immutable
//! snapshot (`*Ex`) plus a [`CompileContext`] and returns the compiled
//! model along with the warnings it collected. Nothing here touches the
//! proxy or the filesystem.

pub mod ingress;
pub mod transport_server;
pub mod virtual_server;

use crate::params::{ConfigParams, StaticConfigParams};

pub use ingress::{generate_ingress_config, generate_mergeable_config};
pub use transport_server::{generate_transport_server_config, passthrough_socket};
pub use virtual_server::generate_virtual_server_config;

/// Certificate used when a server has no usable TLS secret. Paired with
/// the `NULL` cipher list so handshakes fail.
pub const PEM_FILE_FOR_MISSING_TLS_SECRET: &str = "/etc/nginx/secrets/default";
pub const PEM_FILE_FOR_WILDCARD_TLS_SECRET: &str = "/etc/nginx/secrets/wildcard";

/// Controller-wide inputs shared by every compile
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub params: &'a ConfigParams,
    pub static_params: &'a StaticConfigParams,
    pub is_plus: bool,
    pub is_resolver_configured: bool,
    pub is_wildcard_enabled: bool,
}

impl<'a> CompileContext<'a> {
    pub fn new(params: &'a ConfigParams, static_params: &'a StaticConfigParams, is_plus: bool) -> Self {
        Self {
            params,
            static_params,
            is_plus,
            is_resolver_configured: params.is_resolver_configured(),
            is_wildcard_enabled: false,
        }
    }

    pub fn with_wildcard(mut self, enabled: bool) -> Self {
        self.is_wildcard_enabled = enabled;
        self
    }

    /// Same context over different effective parameters
    pub fn with_params(mut self, params: &'a ConfigParams) -> Self {
        self.params = params;
        self
    }
}

/// User snippets split into lines when snippets are enabled, else the default
pub fn generate_snippets(enable_snippets: bool, snippets: &str, default: &[String]) -> Vec<String> {
    if !enable_snippets || snippets.is_empty() {
        return default.to_vec();
    }
    snippets.split('\n').map(str::to_string).collect()
}
