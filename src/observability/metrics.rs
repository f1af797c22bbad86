//! # Metrics Collection
//!
//! Prometheus metrics for the reconciliation loop: reloads, dynamic
//! server pushes, reload fallbacks, compile warnings and managed resources.

use crate::config::ObservabilityConfig;
use crate::errors::{ConfiguratorError, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Metrics recorder that tracks configurator metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record a reload, labelled by why it was requested
    pub fn record_reload(&self, reason: &str, success: bool) {
        counter!("nginx_reloads_total", "reason" => reason.to_string()).increment(1);
        if !success {
            counter!("nginx_reload_errors_total").increment(1);
        }
    }

    /// Record one dynamic server-list push
    pub fn record_endpoint_push(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!("upstream_endpoint_pushes_total", "status" => status).increment(1);
    }

    /// Record a failed push that fell back to a reload
    pub fn record_reload_fallback(&self) {
        counter!("reload_fallbacks_total").increment(1);
    }

    pub fn record_config_warnings(&self, kind: &str, count: usize) {
        if count == 0 {
            return;
        }
        counter!("config_warnings_total", "kind" => kind.to_string()).increment(count as u64);
    }

    pub fn set_managed_resources(&self, kind: &str, count: usize) {
        gauge!("managed_resources_total", "kind" => kind.to_string()).set(count as f64);
    }

    /// Describe every metric and start the counters at zero
    pub fn register_configurator_metrics(&self) {
        describe_counter!("nginx_reloads_total", Unit::Count, "Total number of NGINX reloads");
        describe_counter!("nginx_reload_errors_total", Unit::Count, "Total number of failed NGINX reloads");
        describe_counter!(
            "upstream_endpoint_pushes_total",
            Unit::Count,
            "Total number of upstream server lists pushed through the API"
        );
        describe_counter!(
            "reload_fallbacks_total",
            Unit::Count,
            "Total number of failed pushes replaced by a reload"
        );
        describe_counter!("config_warnings_total", Unit::Count, "Total number of compile warnings");
        describe_gauge!("managed_resources_total", Unit::Count, "Number of resources in the NGINX configuration");

        counter!("nginx_reloads_total", "reason" => "endpoints").absolute(0);
        counter!("nginx_reloads_total", "reason" => "other").absolute(0);
        counter!("nginx_reload_errors_total").absolute(0);
        counter!("upstream_endpoint_pushes_total", "status" => "success").absolute(0);
        counter!("upstream_endpoint_pushes_total", "status" => "error").absolute(0);
        counter!("reload_fallbacks_total").absolute(0);
    }
}

/// Global metrics recorder instance
static METRICS: once_cell::sync::Lazy<Arc<RwLock<Option<MetricsRecorder>>>> =
    once_cell::sync::Lazy::new(|| Arc::new(RwLock::new(None)));

/// Initialize metrics collection and the Prometheus exporter
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        ConfiguratorError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| ConfiguratorError::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    let recorder = MetricsRecorder::new();
    {
        let mut metrics = METRICS.write().await;
        *metrics = Some(recorder.clone());
    }
    recorder.register_configurator_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}

/// Get the global metrics recorder
pub async fn get_metrics() -> Option<MetricsRecorder> {
    METRICS.read().await.clone()
}

pub async fn record_reload(reason: &str, success: bool) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_reload(reason, success);
    }
}

pub async fn record_endpoint_push(success: bool) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_endpoint_push(success);
    }
}

pub async fn record_reload_fallback() {
    if let Some(metrics) = get_metrics().await {
        metrics.record_reload_fallback();
    }
}

pub async fn record_config_warnings(kind: &str, count: usize) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_config_warnings(kind, count);
    }
}

pub async fn set_managed_resources(kind: &str, count: usize) {
    if let Some(metrics) = get_metrics().await {
        metrics.set_managed_resources(kind, count);
    }
}
