//! # Structured Logging
//!
//! Subscriber setup and span macros. Every compile and apply runs inside a
//! span carrying a fresh `operation_id`, so all events of one reconcile
//! step can be correlated, in JSON mode as plain fields.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{ConfiguratorError, Result};

/// Create a tracing span for one compile pass.
///
/// ```rust,ignore
/// let span = compile_span!("VirtualServer", vs_ex.key());
/// ```
#[macro_export]
macro_rules! compile_span {
    ($kind:expr, $key:expr) => {
        tracing::debug_span!(
            "compile",
            kind = %$kind,
            resource = %$key,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($kind:expr, $key:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "compile",
            kind = %$kind,
            resource = %$key,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for one orchestrator operation
#[macro_export]
macro_rules! apply_span {
    ($operation:expr, $key:expr) => {
        tracing::info_span!(
            "apply",
            operation = %$operation,
            resource = %$key,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $key:expr, $($field:tt)*) => {
        tracing::info_span!(
            "apply",
            operation = %$operation,
            resource = %$key,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level)).map_err(
        |e| ConfiguratorError::config(format!("Invalid log level '{}': {}", config.log_level, e)),
    )?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    result.map_err(|e| ConfiguratorError::config(format!("Failed to initialize logging: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        is_plus = %config.controller.is_plus,
        config_dir = %config.controller.config_dir,
        tls_passthrough = %config.controller.enable_tls_passthrough,
        prometheus_metrics = %config.controller.enable_prometheus_metrics,
        latency_metrics = %config.controller.enable_latency_metrics,
        metrics_enabled = %config.observability.enable_metrics,
        "Ingress configurator configuration"
    );
}
