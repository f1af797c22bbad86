//! # Configuration Settings
//!
//! Controller settings fixed at startup plus observability settings.

use crate::errors::{ConfiguratorError, Result};
use crate::params::{GlobalConfigParams, StaticConfigParams};
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    #[validate(nested)]
    pub controller: ControllerConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Layer defaults, an optional YAML/JSON file and `INGRESS__*`
    /// environment variables, then validate.
    ///
    /// `INGRESS__CONTROLLER__IS_PLUS=true` sets `controller.is_plus`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: AppConfig = builder
            .add_source(config::Environment::with_prefix("INGRESS").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Build from flat environment variables
    pub fn from_env() -> Result<Self> {
        let config =
            Self { controller: ControllerConfig::from_env(), observability: ObservabilityConfig::from_env() };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(ConfiguratorError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    fn validate_custom(&self) -> Result<()> {
        let controller = &self.controller;

        if controller.nginx_status && controller.nginx_status_port == controller.tls_passthrough_port {
            return Err(ConfiguratorError::validation_field(
                "NGINX status and TLS passthrough ports cannot be the same",
                "nginx_status_port",
            ));
        }

        if controller.health_status && !controller.health_status_uri.starts_with('/') {
            return Err(ConfiguratorError::validation_field(
                "Health status URI must start with '/'",
                "health_status_uri",
            ));
        }

        if self.observability.enable_metrics
            && controller.enable_prometheus_metrics
            && self.observability.metrics_port == controller.nginx_status_port
        {
            return Err(ConfiguratorError::validation_field(
                "Metrics and NGINX status ports cannot be the same",
                "metrics_port",
            ));
        }

        Ok(())
    }
}

/// Controller settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ControllerConfig {
    /// Target NGINX Plus instead of OSS
    pub is_plus: bool,

    /// Directory that receives the rendered configuration
    #[validate(length(min = 1, message = "Config directory cannot be empty"))]
    pub config_dir: String,

    pub enable_tls_passthrough: bool,

    #[validate(range(min = 1, message = "TLS passthrough port must be between 1 and 65535"))]
    pub tls_passthrough_port: u16,

    /// Keep Prometheus label indices for Plus upstreams and zones
    pub enable_prometheus_metrics: bool,

    pub enable_latency_metrics: bool,
    pub enable_snippets: bool,
    pub enable_internal_routes: bool,
    pub enable_preview_policies: bool,

    /// `namespace/name` of the wildcard TLS secret, empty when unset
    pub wildcard_tls_secret: String,

    /// Certificate served when a TLS secret is missing
    #[validate(length(min = 1, message = "Default pem cannot be empty"))]
    pub default_pem: String,

    pub health_status: bool,
    pub health_status_uri: String,

    pub nginx_status: bool,

    #[validate(range(min = 1, message = "NGINX status port must be between 1 and 65535"))]
    pub nginx_status_port: u16,

    pub nginx_status_allow_cidrs: Vec<String>,

    /// Template files replacing the built-in templates
    pub main_template: Option<String>,
    pub ingress_template: Option<String>,
    pub virtual_server_template: Option<String>,

    /// Trusted addresses for the real IP module
    pub real_ip_from: Vec<String>,

    pub pod_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            is_plus: false,
            config_dir: "/etc/nginx".to_string(),
            enable_tls_passthrough: false,
            tls_passthrough_port: 443,
            enable_prometheus_metrics: false,
            enable_latency_metrics: false,
            enable_snippets: false,
            enable_internal_routes: false,
            enable_preview_policies: false,
            wildcard_tls_secret: String::new(),
            default_pem: "/etc/nginx/secrets/default".to_string(),
            health_status: false,
            health_status_uri: "/nginx-health".to_string(),
            nginx_status: true,
            nginx_status_port: 8080,
            nginx_status_allow_cidrs: vec!["127.0.0.1".to_string()],
            main_template: None,
            ingress_template: None,
            virtual_server_template: None,
            real_ip_from: Vec::new(),
            pod_name: String::new(),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name).map(|s| s.to_lowercase() == "true" || s == "1").unwrap_or(default)
}

fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name)
        .ok()
        .map(|s| s.split(',').map(str::trim).filter(|v| !v.is_empty()).map(str::to_string).collect())
}

impl ControllerConfig {
    /// Create ControllerConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            is_plus: env_bool("INGRESS_IS_PLUS", defaults.is_plus),
            config_dir: std::env::var("INGRESS_CONFIG_DIR").unwrap_or(defaults.config_dir),
            enable_tls_passthrough: env_bool("INGRESS_ENABLE_TLS_PASSTHROUGH", defaults.enable_tls_passthrough),
            tls_passthrough_port: std::env::var("INGRESS_TLS_PASSTHROUGH_PORT")
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(defaults.tls_passthrough_port),
            enable_prometheus_metrics: env_bool(
                "INGRESS_ENABLE_PROMETHEUS_METRICS",
                defaults.enable_prometheus_metrics,
            ),
            enable_latency_metrics: env_bool("INGRESS_ENABLE_LATENCY_METRICS", defaults.enable_latency_metrics),
            enable_snippets: env_bool("INGRESS_ENABLE_SNIPPETS", defaults.enable_snippets),
            enable_internal_routes: env_bool("INGRESS_ENABLE_INTERNAL_ROUTES", defaults.enable_internal_routes),
            enable_preview_policies: env_bool("INGRESS_ENABLE_PREVIEW_POLICIES", defaults.enable_preview_policies),
            wildcard_tls_secret: std::env::var("INGRESS_WILDCARD_TLS_SECRET").unwrap_or_default(),
            default_pem: std::env::var("INGRESS_DEFAULT_PEM").unwrap_or(defaults.default_pem),
            health_status: env_bool("INGRESS_HEALTH_STATUS", defaults.health_status),
            health_status_uri: std::env::var("INGRESS_HEALTH_STATUS_URI").unwrap_or(defaults.health_status_uri),
            nginx_status: env_bool("INGRESS_NGINX_STATUS", defaults.nginx_status),
            nginx_status_port: std::env::var("INGRESS_NGINX_STATUS_PORT")
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(defaults.nginx_status_port),
            nginx_status_allow_cidrs: env_list("INGRESS_NGINX_STATUS_ALLOW_CIDRS")
                .unwrap_or(defaults.nginx_status_allow_cidrs),
            main_template: std::env::var("INGRESS_MAIN_TEMPLATE").ok(),
            ingress_template: std::env::var("INGRESS_INGRESS_TEMPLATE").ok(),
            virtual_server_template: std::env::var("INGRESS_VIRTUAL_SERVER_TEMPLATE").ok(),
            real_ip_from: env_list("INGRESS_REAL_IP_FROM").unwrap_or_default(),
            pod_name: std::env::var("POD_NAME").unwrap_or_default(),
        }
    }

    /// Parameters fixed for the lifetime of the process
    pub fn static_params(&self) -> StaticConfigParams {
        StaticConfigParams {
            health_status: self.health_status,
            health_status_uri: self.health_status_uri.clone(),
            nginx_status: self.nginx_status,
            nginx_status_allow_cidrs: self.nginx_status_allow_cidrs.clone(),
            nginx_status_port: self.nginx_status_port,
            stub_status_over_unix_socket_for_oss: false,
            tls_passthrough: self.enable_tls_passthrough,
            enable_snippets: self.enable_snippets,
            enable_internal_routes: self.enable_internal_routes,
            pod_name: self.pod_name.clone(),
            enable_latency_metrics: self.enable_latency_metrics,
            enable_preview_policies: self.enable_preview_policies,
        }
    }

    /// Listener table before any GlobalConfiguration is seen
    pub fn global_config_params(&self) -> GlobalConfigParams {
        if !self.enable_tls_passthrough {
            return GlobalConfigParams::default();
        }
        let mut params = GlobalConfigParams::with_tls_passthrough();
        for listener in params.listeners.values_mut() {
            listener.port = self.tls_passthrough_port;
        }
        params
    }

    pub fn is_wildcard_enabled(&self) -> bool {
        !self.wildcard_tls_secret.is_empty()
    }
}

/// Observability configuration for metrics and logging
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 9113,
            service_name: "ingress-configurator".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            enable_metrics: env_bool("INGRESS_ENABLE_METRICS", defaults.enable_metrics),
            metrics_port: std::env::var("INGRESS_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(defaults.metrics_port),
            service_name: std::env::var("INGRESS_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: std::env::var("INGRESS_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: env_bool("INGRESS_JSON_LOGGING", defaults.json_logging),
        }
    }

    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

/// Read an optional template override from disk
pub fn read_template(path: Option<&str>) -> Result<Option<String>> {
    match path {
        None => Ok(None),
        Some(p) => std::fs::read_to_string(Path::new(p))
            .map(Some)
            .map_err(|e| ConfiguratorError::io(e, format!("Failed to read template {}", p))),
    }
}
