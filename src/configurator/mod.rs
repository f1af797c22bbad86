//! # Reconciliation Orchestrator
//!
//! [`Configurator`] owns the mutable state of the controller core: the
//! registry of applied resources with the content hash of every artifact,
//! the TLS passthrough table and the metric label snapshots. Each operation
//! compiles, renders and writes through the [`ProxyManager`], then applies
//! the result with a single reload or, on Plus, a dynamic server push.
//!
//! All operations take `&mut self`, so one apply is in flight at a time.

pub mod labels;
pub mod passthrough;
pub mod registry;
pub mod render;

use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::ControllerConfig;
use crate::domain::secret::JWK_KEY;
use crate::domain::transport_server::TLS_PASSTHROUGH_LISTENER_NAME;
use crate::domain::{
    endpoints_key, split_namespaced_name, GlobalConfiguration, Ingress, IngressBackend, IngressEx,
    MergeableIngresses, ObjectMeta, ResourceKey, ResourceKind, Secret, SecretReference, SecretType,
    TransportServer, TransportServerEx, TransportServerListener, VirtualServer, VirtualServerEx, VirtualServerRoute,
};
use crate::errors::{ConfiguratorError, Result};
use crate::generator::{
    generate_ingress_config, generate_mergeable_config, generate_transport_server_config,
    generate_virtual_server_config, passthrough_socket, CompileContext,
};
use crate::nginx::{ProxyManager, ReloadReason, ServerConfig, JWK_SECRET_FILE_MODE, TLS_SECRET_FILE_MODE};
use crate::observability::metrics;
use crate::params::annotations::JWT_KEY_ANNOTATION;
use crate::params::{
    generate_main_config, parse_annotations, parse_global_configuration, ConfigParams, GlobalConfigParams,
    StaticConfigParams,
};
use crate::upstream::{create_upstreams_for_plus, ingress_upstream_name, server_config_for_plus, UpstreamNamer};
use crate::warnings::Warnings;

pub use labels::{InMemoryLabelSink, LabelGroup, LabelIndex, LabelSet, LabelSink, LabelSnapshot, LabelTargets};
pub use passthrough::PassthroughTable;
pub use registry::{content_hash, ArtifactKind, Registry, ResourceCounts};
pub use render::{JsonRenderer, Renderer};

/// Secret file backing the default server certificate
pub const DEFAULT_SERVER_SECRET_NAME: &str = "default";
/// Secret file backing the wildcard certificate
pub const WILDCARD_SECRET_NAME: &str = "wildcard";

const PASSTHROUGH_HOSTS_ARTIFACT: &str = "tls-passthrough-hosts";
const MAIN_ARTIFACT: &str = "nginx";

/// File name of an Ingress config: `namespace-name`
pub fn ingress_file_name(meta: &ObjectMeta) -> String {
    meta.file_name()
}

pub fn virtual_server_file_name(meta: &ObjectMeta) -> String {
    format!("vs_{}_{}", meta.namespace, meta.name)
}

pub fn transport_server_file_name(meta: &ObjectMeta) -> String {
    format!("ts_{}_{}", meta.namespace, meta.name)
}

/// Feature switches fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguratorOptions {
    pub is_plus: bool,
    pub is_wildcard_enabled: bool,
    pub is_prometheus_enabled: bool,
    pub is_latency_metrics_enabled: bool,
    pub tls_passthrough_port: u16,
}

impl Default for ConfiguratorOptions {
    fn default() -> Self {
        Self {
            is_plus: false,
            is_wildcard_enabled: false,
            is_prometheus_enabled: false,
            is_latency_metrics_enabled: false,
            tls_passthrough_port: crate::domain::transport_server::TLS_PASSTHROUGH_LISTENER_PORT,
        }
    }
}

impl ConfiguratorOptions {
    pub fn from_controller(config: &ControllerConfig) -> Self {
        Self {
            is_plus: config.is_plus,
            is_wildcard_enabled: config.is_wildcard_enabled(),
            is_prometheus_enabled: config.enable_prometheus_metrics,
            is_latency_metrics_enabled: config.enable_latency_metrics,
            tls_passthrough_port: config.tls_passthrough_port,
        }
    }
}

/// Label sinks kept only when their feature is enabled
#[derive(Clone, Default)]
struct LabelSinks {
    general: Option<Arc<dyn LabelSink>>,
    latency: Option<Arc<dyn LabelSink>>,
}

impl LabelSinks {
    fn targets(&self) -> LabelTargets<'_> {
        LabelTargets { general: self.general.as_deref(), latency: self.latency.as_deref() }
    }
}

pub struct Configurator {
    manager: Arc<dyn ProxyManager>,
    renderer: Box<dyn Renderer>,
    params: ConfigParams,
    static_params: StaticConfigParams,
    global_params: GlobalConfigParams,
    options: ConfiguratorOptions,
    registry: Registry,
    passthrough: PassthroughTable,
    labels: LabelIndex,
    sinks: LabelSinks,
    /// A reload failed and nothing has been applied since
    pending_reload: bool,
}

impl Configurator {
    pub fn new(
        manager: Arc<dyn ProxyManager>,
        static_params: StaticConfigParams,
        params: ConfigParams,
        options: ConfiguratorOptions,
    ) -> Self {
        let mut global_params =
            if static_params.tls_passthrough { GlobalConfigParams::with_tls_passthrough() } else { GlobalConfigParams::default() };
        override_passthrough_port(&mut global_params, options.tls_passthrough_port);

        Self {
            manager,
            renderer: Box::new(JsonRenderer::new()),
            params,
            static_params,
            global_params,
            options,
            registry: Registry::new(),
            passthrough: PassthroughTable::new(),
            labels: LabelIndex::new(),
            sinks: LabelSinks::default(),
            pending_reload: false,
        }
    }

    /// Build a configurator from the controller settings
    pub fn from_controller(manager: Arc<dyn ProxyManager>, config: &ControllerConfig, params: ConfigParams) -> Self {
        let mut configurator =
            Self::new(manager, config.static_params(), params, ConfiguratorOptions::from_controller(config));
        configurator.global_params = config.global_config_params();
        configurator
    }

    /// Attach label sinks. The general sink is used on Plus with Prometheus
    /// enabled, the latency sink when latency metrics are enabled.
    pub fn with_label_sinks(
        mut self,
        general: Option<Arc<dyn LabelSink>>,
        latency: Option<Arc<dyn LabelSink>>,
    ) -> Self {
        if self.options.is_plus && self.options.is_prometheus_enabled {
            self.sinks.general = general;
        }
        if self.options.is_latency_metrics_enabled {
            self.sinks.latency = latency;
        }
        self
    }

    /// Replace the render executor. Artifacts are re-rendered on their next apply.
    pub fn set_renderer(&mut self, renderer: Box<dyn Renderer>) {
        self.renderer = renderer;
    }

    pub fn params(&self) -> &ConfigParams {
        &self.params
    }

    pub fn global_params(&self) -> &GlobalConfigParams {
        &self.global_params
    }

    pub fn is_resolver_configured(&self) -> bool {
        self.params.is_resolver_configured()
    }

    fn context(&self) -> CompileContext<'_> {
        CompileContext::new(&self.params, &self.static_params, self.options.is_plus)
            .with_wildcard(self.options.is_wildcard_enabled)
    }

    // ---- artifacts and reloads ----

    /// Write an artifact unless its content is unchanged. Returns whether
    /// anything was written.
    async fn write_artifact(&mut self, kind: ArtifactKind, name: &str, content: &[u8]) -> Result<bool> {
        if self.registry.is_current(kind, name, content) {
            debug!(artifact = %name, "Artifact unchanged, skipping write");
            return Ok(false);
        }

        match kind {
            ArtifactKind::Main => self.manager.create_main_config(content).await?,
            ArtifactKind::Http => self.manager.create_config(name, content).await?,
            ArtifactKind::Stream => self.manager.create_stream_config(name, content).await?,
            ArtifactKind::PassthroughHosts => self.manager.create_tls_passthrough_hosts_config(content).await?,
        }
        self.registry.record(kind, name, content);
        Ok(true)
    }

    async fn reload(&mut self, reason: ReloadReason) -> Result<()> {
        let result = self.manager.reload(reason).await;
        metrics::record_reload(reason.as_str(), result.is_ok()).await;

        match &result {
            Ok(()) => {
                self.pending_reload = false;
                info!(%reason, "NGINX reloaded");
            }
            Err(e) => {
                self.pending_reload = true;
                error!(%reason, error = %e, "Failed to reload NGINX");
            }
        }
        result
    }

    /// Reload when something was written or an earlier reload failed
    async fn apply(&mut self, changed: bool) -> Result<()> {
        if !changed && !self.pending_reload {
            debug!("Configuration unchanged, no need to reload nginx");
            return Ok(());
        }
        self.reload(ReloadReason::OtherUpdate).await
    }

    async fn publish_counts(&self) {
        let counts = self.registry.counts();
        metrics::set_managed_resources("ingress", counts.regular_ingresses + counts.master_ingresses).await;
        metrics::set_managed_resources("minion", counts.minion_ingresses).await;
        metrics::set_managed_resources("virtualserver", counts.virtual_servers).await;
        metrics::set_managed_resources("virtualserverroute", counts.virtual_server_routes).await;
        metrics::set_managed_resources("transportserver", counts.transport_servers).await;
    }

    /// Write the main configuration without reloading
    pub async fn write_main_config(&mut self) -> Result<bool> {
        let main = generate_main_config(&self.static_params, &self.params);
        let content = self.renderer.render_main(&main)?;
        self.write_artifact(ArtifactKind::Main, MAIN_ARTIFACT, &content).await
    }

    /// Enable the internal route server in the main config and reload
    pub async fn add_internal_route_config(&mut self, pod_name: &str) -> Result<()> {
        self.static_params.enable_internal_routes = true;
        self.static_params.pod_name = pod_name.to_string();
        let changed = self.write_main_config().await?;
        self.apply(changed).await
    }

    // ---- staging: compile, render, write, index ----

    /// The generator relies on the JWK path being set even when the secret
    /// is not on the filesystem
    fn fill_jwk_path(&self, ingress_ex: &mut IngressEx) {
        let meta = &ingress_ex.ingress.metadata;
        let Some(jwt_key) = meta.annotations.get(JWT_KEY_ANNOTATION) else {
            return;
        };
        let path = self.manager.filename_for_secret(&format!("{}-{}", meta.namespace, jwt_key));
        let reference = format!("{}/{}", meta.namespace, jwt_key);
        ingress_ex.secret_refs.entry(reference).or_insert_with(SecretReference::missing).path = path;
    }

    async fn stage_ingress(&mut self, ingress_ex: &IngressEx) -> Result<(bool, Warnings)> {
        let mut ingress_ex = ingress_ex.clone();
        self.fill_jwk_path(&mut ingress_ex);

        let meta = &ingress_ex.ingress.metadata;
        let key = ResourceKey::from_meta(ResourceKind::Ingress, meta);
        let (config, warnings) = crate::compile_span!(ResourceKind::Ingress, key)
            .in_scope(|| generate_ingress_config(&ingress_ex, &self.context()));

        let name = ingress_file_name(meta);
        let content = self.renderer.render_ingress(&config)?;
        let changed = self.write_artifact(ArtifactKind::Http, &name, &content).await?;

        let targets = self.sinks.targets();
        if !targets.is_empty() {
            self.labels.update(key, LabelSnapshot::for_ingress(&ingress_ex, &config.upstreams), targets);
        }
        metrics::record_config_warnings("ingress", warnings.len()).await;
        self.registry.ingresses.insert(name, ingress_ex);

        Ok((changed, warnings))
    }

    async fn stage_mergeable_ingress(&mut self, mergeable: &MergeableIngresses) -> Result<(bool, Warnings)> {
        let mut mergeable = mergeable.clone();
        self.fill_jwk_path(&mut mergeable.master);
        for minion in &mut mergeable.minions {
            self.fill_jwk_path(minion);
        }

        let master_meta = &mergeable.master.ingress.metadata;
        let key = ResourceKey::from_meta(ResourceKind::Ingress, master_meta);
        let (config, warnings) = crate::compile_span!(ResourceKind::Ingress, key, minions = mergeable.minions.len())
            .in_scope(|| generate_mergeable_config(&mergeable, &self.context()));

        let name = ingress_file_name(master_meta);
        let content = self.renderer.render_ingress(&config)?;
        let changed = self.write_artifact(ArtifactKind::Http, &name, &content).await?;

        let targets = self.sinks.targets();
        if !targets.is_empty() {
            // Minion upstreams carry peers of minion pods
            let mut labelled = mergeable.master.clone();
            for minion in &mergeable.minions {
                labelled.pods_by_ip.extend(minion.pods_by_ip.clone());
            }
            self.labels.update(key, LabelSnapshot::for_ingress(&labelled, &config.upstreams), targets);
        }
        metrics::record_config_warnings("ingress", warnings.len()).await;

        let minions: BTreeSet<String> =
            mergeable.minions.iter().map(|m| ingress_file_name(&m.ingress.metadata)).collect();
        self.registry.minions.insert(name.clone(), minions);
        self.registry.ingresses.insert(name, mergeable.master);

        Ok((changed, warnings))
    }

    async fn stage_virtual_server(&mut self, vs_ex: &VirtualServerEx) -> Result<(bool, Warnings)> {
        let meta = &vs_ex.virtual_server.metadata;
        let key = ResourceKey::from_meta(ResourceKind::VirtualServer, meta);
        let (config, warnings) = crate::compile_span!(ResourceKind::VirtualServer, key)
            .in_scope(|| generate_virtual_server_config(vs_ex, &self.context()));

        let name = virtual_server_file_name(meta);
        let content = self.renderer.render_virtual_server(&config)?;
        let changed = self.write_artifact(ArtifactKind::Http, &name, &content).await?;

        let targets = self.sinks.targets();
        if !targets.is_empty() {
            self.labels.update(key, LabelSnapshot::for_virtual_server(vs_ex, &config.upstreams), targets);
        }
        metrics::record_config_warnings("virtualserver", warnings.len()).await;
        self.registry.virtual_servers.insert(name, vs_ex.clone());

        Ok((changed, warnings))
    }

    async fn stage_transport_server(&mut self, ts_ex: &TransportServerEx) -> Result<(bool, Warnings)> {
        let ts = &ts_ex.transport_server;
        let meta = &ts.metadata;
        let key = ResourceKey::from_meta(ResourceKind::TransportServer, meta);
        let mut warnings = Warnings::new();

        let listener = &ts.spec.listener.name;
        let listener_port = self.global_params.listener_port(listener).unwrap_or_else(|| {
            warn!(transport_server = %key, listener = %listener, "Listener doesn't exist");
            warnings.add(&key, format!("Listener {} doesn't exist", listener));
            0
        });

        let config = crate::compile_span!(ResourceKind::TransportServer, key)
            .in_scope(|| generate_transport_server_config(ts_ex, listener_port, self.options.is_plus));

        let name = transport_server_file_name(meta);
        let content = self.renderer.render_transport_server(&config)?;
        let mut changed = self.write_artifact(ArtifactKind::Stream, &name, &content).await?;

        let targets = self.sinks.targets();
        if targets.general.is_some() {
            self.labels.update(key.clone(), LabelSnapshot::for_transport_server(ts_ex, &config.upstreams), targets);
        }

        let owner = meta.key();
        let table_changed = if ts_ex.is_tls_passthrough() && !ts.spec.host.is_empty() {
            self.passthrough.insert(owner, ts.spec.host.clone(), passthrough_socket(&meta.namespace, &meta.name));
            true
        } else {
            self.passthrough.remove(&owner)
        };
        if table_changed {
            let duplicated = self.write_passthrough_hosts(&mut changed).await?;
            if duplicated.contains(&ts.spec.host) {
                warnings.add(&key, format!("host {} is used by more than one TransportServers", ts.spec.host));
            }
        }

        metrics::record_config_warnings("transportserver", warnings.len()).await;
        self.registry.transport_servers.insert(name, ts_ex.clone());

        Ok((changed, warnings))
    }

    /// Regenerate the passthrough host map from every known pair
    async fn write_passthrough_hosts(&mut self, changed: &mut bool) -> Result<Vec<String>> {
        let (hosts, duplicated) = self.passthrough.generate();
        for host in &duplicated {
            warn!("host {} is used by more than one TransportServers", host);
        }
        let content = self.renderer.render_passthrough_hosts(&hosts)?;
        *changed |= self.write_artifact(ArtifactKind::PassthroughHosts, PASSTHROUGH_HOSTS_ARTIFACT, &content).await?;
        Ok(duplicated)
    }

    async fn unstage_transport_server(&mut self, namespace: &str, name: &str) -> Result<bool> {
        let key = ResourceKey::new(ResourceKind::TransportServer, namespace, name);
        let file_name = transport_server_file_name(&ObjectMeta::new(namespace, name));

        self.manager.delete_stream_config(&file_name).await?;
        let mut changed = self.registry.forget(ArtifactKind::Stream, &file_name);
        changed |= self.registry.transport_servers.remove(&file_name).is_some();

        if self.sinks.general.is_some() {
            self.labels.delete(&key, self.sinks.targets());
        }
        if self.passthrough.remove(&key.namespaced_name()) {
            self.write_passthrough_hosts(&mut changed).await?;
        }
        Ok(changed)
    }

    // ---- add or update ----

    pub async fn add_or_update_ingress(&mut self, ingress_ex: &IngressEx) -> Result<Warnings> {
        let key = ingress_ex.key();
        async {
            let (changed, warnings) = self.stage_ingress(ingress_ex).await?;
            self.apply(changed).await?;
            self.publish_counts().await;
            Ok(warnings)
        }
        .instrument(crate::apply_span!("add_or_update_ingress", key))
        .await
    }

    /// Apply a master Ingress with its minions as one config file
    pub async fn add_or_update_mergeable_ingress(&mut self, mergeable: &MergeableIngresses) -> Result<Warnings> {
        let key = mergeable.master.key();
        async {
            let (changed, warnings) = self.stage_mergeable_ingress(mergeable).await?;
            self.apply(changed).await?;
            self.publish_counts().await;
            Ok(warnings)
        }
        .instrument(crate::apply_span!("add_or_update_mergeable_ingress", key))
        .await
    }

    pub async fn add_or_update_virtual_server(&mut self, vs_ex: &VirtualServerEx) -> Result<Warnings> {
        let key = vs_ex.key();
        async {
            let (changed, warnings) = self.stage_virtual_server(vs_ex).await?;
            self.apply(changed).await?;
            self.publish_counts().await;
            Ok(warnings)
        }
        .instrument(crate::apply_span!("add_or_update_virtual_server", key))
        .await
    }

    pub async fn add_or_update_transport_server(&mut self, ts_ex: &TransportServerEx) -> Result<Warnings> {
        let key = ts_ex.key();
        async {
            let (changed, warnings) = self.stage_transport_server(ts_ex).await?;
            self.apply(changed).await?;
            self.publish_counts().await;
            Ok(warnings)
        }
        .instrument(crate::apply_span!("add_or_update_transport_server", key))
        .await
    }

    pub async fn add_or_update_ingresses(&mut self, ingresses: &[IngressEx]) -> Result<Warnings> {
        self.add_or_update_resources(ingresses, &[], &[]).await
    }

    pub async fn add_or_update_mergeable_ingresses(&mut self, mergeables: &[MergeableIngresses]) -> Result<Warnings> {
        self.add_or_update_resources(&[], mergeables, &[]).await
    }

    pub async fn add_or_update_virtual_servers(&mut self, virtual_servers: &[VirtualServerEx]) -> Result<Warnings> {
        self.add_or_update_resources(&[], &[], virtual_servers).await
    }

    pub async fn add_or_update_transport_servers(&mut self, transport_servers: &[TransportServerEx]) -> Result<Warnings> {
        async {
            let mut all = Warnings::new();
            let mut changed = false;
            for ts_ex in transport_servers {
                let (c, warnings) = self.stage_transport_server(ts_ex).await?;
                changed |= c;
                all.extend(warnings);
            }
            self.apply(changed).await?;
            self.publish_counts().await;
            Ok(all)
        }
        .instrument(crate::apply_span!("add_or_update_transport_servers", "batch", count = transport_servers.len()))
        .await
    }

    /// Apply a batch of HTTP resources with one reload
    pub async fn add_or_update_resources(
        &mut self,
        ingresses: &[IngressEx],
        mergeables: &[MergeableIngresses],
        virtual_servers: &[VirtualServerEx],
    ) -> Result<Warnings> {
        let count = ingresses.len() + mergeables.len() + virtual_servers.len();
        async {
            let (changed, warnings) = self.stage_resources(ingresses, mergeables, virtual_servers).await?;
            self.apply(changed).await?;
            self.publish_counts().await;
            Ok(warnings)
        }
        .instrument(crate::apply_span!("add_or_update_resources", "batch", count = count))
        .await
    }

    async fn stage_resources(
        &mut self,
        ingresses: &[IngressEx],
        mergeables: &[MergeableIngresses],
        virtual_servers: &[VirtualServerEx],
    ) -> Result<(bool, Warnings)> {
        let mut all = Warnings::new();
        let mut changed = false;

        for ingress_ex in ingresses {
            let (c, warnings) = self.stage_ingress(ingress_ex).await?;
            changed |= c;
            all.extend(warnings);
        }
        for mergeable in mergeables {
            let (c, warnings) = self.stage_mergeable_ingress(mergeable).await?;
            changed |= c;
            all.extend(warnings);
        }
        for vs_ex in virtual_servers {
            let (c, warnings) = self.stage_virtual_server(vs_ex).await?;
            changed |= c;
            all.extend(warnings);
        }

        Ok((changed, all))
    }

    // ---- delete ----

    /// Delete the config of an Ingress (or a master with its minions),
    /// keyed `namespace/name`
    pub async fn delete_ingress(&mut self, key: &str) -> Result<()> {
        async {
            let (namespace, name) = split_namespaced_name(key, "default");
            let file_name = ingress_file_name(&ObjectMeta::new(namespace, name));

            self.manager.delete_config(&file_name).await?;
            self.registry.forget(ArtifactKind::Http, &file_name);
            self.registry.ingresses.remove(&file_name);
            self.registry.minions.remove(&file_name);

            let targets = self.sinks.targets();
            if !targets.is_empty() {
                self.labels.delete(&ResourceKey::new(ResourceKind::Ingress, namespace, name), targets);
            }

            self.reload(ReloadReason::OtherUpdate).await?;
            self.publish_counts().await;
            Ok(())
        }
        .instrument(crate::apply_span!("delete_ingress", key))
        .await
    }

    pub async fn delete_virtual_server(&mut self, key: &str) -> Result<()> {
        async {
            let (namespace, name) = split_namespaced_name(key, "default");
            let file_name = virtual_server_file_name(&ObjectMeta::new(namespace, name));

            self.manager.delete_config(&file_name).await?;
            self.registry.forget(ArtifactKind::Http, &file_name);
            self.registry.virtual_servers.remove(&file_name);

            let targets = self.sinks.targets();
            if !targets.is_empty() {
                self.labels.delete(&ResourceKey::new(ResourceKind::VirtualServer, namespace, name), targets);
            }

            self.reload(ReloadReason::OtherUpdate).await?;
            self.publish_counts().await;
            Ok(())
        }
        .instrument(crate::apply_span!("delete_virtual_server", key))
        .await
    }

    /// Delete a TransportServer, dropping its passthrough host if it had one
    pub async fn delete_transport_server(&mut self, key: &str) -> Result<()> {
        async {
            let (namespace, name) = split_namespaced_name(key, "default");
            self.unstage_transport_server(namespace, name).await?;
            self.reload(ReloadReason::OtherUpdate).await?;
            self.publish_counts().await;
            Ok(())
        }
        .instrument(crate::apply_span!("delete_transport_server", key))
        .await
    }

    // ---- endpoints ----

    /// Count a push and turn a failure into a reload fallback
    async fn settle_push(&self, result: Result<()>, fallback: &mut bool) {
        if let Err(e) = result {
            warn!("Couldn't update the endpoints via the API: {}; reloading configuration instead", e);
            metrics::record_reload_fallback().await;
            *fallback = true;
        }
    }

    async fn finish_endpoints_update(&mut self, fallback: bool) -> Result<()> {
        if self.options.is_plus && !fallback && !self.pending_reload {
            debug!("No need to reload nginx");
            return Ok(());
        }
        self.reload(ReloadReason::EndpointsUpdate).await
    }

    /// Refresh the endpoints of Ingresses. On Plus the servers are pushed
    /// to the live upstreams; any failed push falls back to a reload.
    pub async fn update_endpoints(&mut self, ingresses: &[IngressEx]) -> Result<()> {
        async {
            let mut fallback = false;
            for ingress_ex in ingresses {
                self.stage_ingress(ingress_ex).await?;
                if self.options.is_plus {
                    let result = self.push_ingress_endpoints(ingress_ex).await;
                    self.settle_push(result, &mut fallback).await;
                }
            }
            self.finish_endpoints_update(fallback).await
        }
        .instrument(crate::apply_span!("update_endpoints", "ingresses", count = ingresses.len()))
        .await
    }

    pub async fn update_endpoints_for_mergeable_ingresses(&mut self, mergeables: &[MergeableIngresses]) -> Result<()> {
        async {
            let mut fallback = false;
            for mergeable in mergeables {
                self.stage_mergeable_ingress(mergeable).await?;
                if self.options.is_plus {
                    for ingress_ex in std::iter::once(&mergeable.master).chain(&mergeable.minions) {
                        let result = self.push_ingress_endpoints(ingress_ex).await;
                        self.settle_push(result, &mut fallback).await;
                    }
                }
            }
            self.finish_endpoints_update(fallback).await
        }
        .instrument(crate::apply_span!("update_endpoints", "mergeable ingresses", count = mergeables.len()))
        .await
    }

    pub async fn update_endpoints_for_virtual_servers(&mut self, virtual_servers: &[VirtualServerEx]) -> Result<()> {
        async {
            let mut fallback = false;
            for vs_ex in virtual_servers {
                self.stage_virtual_server(vs_ex).await?;
                if self.options.is_plus {
                    let result = self.push_virtual_server_endpoints(vs_ex).await;
                    self.settle_push(result, &mut fallback).await;
                }
            }
            self.finish_endpoints_update(fallback).await
        }
        .instrument(crate::apply_span!("update_endpoints", "virtual servers", count = virtual_servers.len()))
        .await
    }

    pub async fn update_endpoints_for_transport_servers(
        &mut self,
        transport_servers: &[TransportServerEx],
    ) -> Result<()> {
        async {
            let mut fallback = false;
            for ts_ex in transport_servers {
                self.stage_transport_server(ts_ex).await?;
                if self.options.is_plus {
                    let result = self.push_transport_server_endpoints(ts_ex).await;
                    self.settle_push(result, &mut fallback).await;
                }
            }
            self.finish_endpoints_update(fallback).await
        }
        .instrument(crate::apply_span!("update_endpoints", "transport servers", count = transport_servers.len()))
        .await
    }

    async fn push_servers(&self, upstream: &str, servers: &[String], config: &ServerConfig) -> Result<()> {
        let result = self.manager.update_servers(upstream, servers, config).await;
        metrics::record_endpoint_push(result.is_ok()).await;
        result
    }

    async fn push_ingress_endpoints(&self, ingress_ex: &IngressEx) -> Result<()> {
        let ingress = &ingress_ex.ingress;
        let (params, _) = parse_annotations(ingress_ex, &self.params, self.options.is_plus);
        let config = ServerConfig {
            max_fails: params.max_fails,
            max_conns: params.max_conns,
            fail_timeout: params.fail_timeout,
            slow_start: params.slow_start,
        };

        let mut backends: Vec<(&str, &IngressBackend)> = Vec::new();
        if let Some(backend) = &ingress.spec.backend {
            backends.push(("", backend));
        }
        for rule in &ingress.spec.rules {
            let Some(http) = &rule.http else {
                continue;
            };
            for path in &http.paths {
                backends.push((rule.host.as_str(), &path.backend));
            }
        }

        for (host, backend) in backends {
            let Some(endpoints) = ingress_ex.endpoints.get(&backend.key()) else {
                continue;
            };
            if ingress_ex.external_name_svcs.contains_key(&backend.service_name) {
                debug!(
                    service = %backend.service_name,
                    "Service is Type ExternalName, skipping NGINX Plus endpoints update via API"
                );
                continue;
            }
            let name = ingress_upstream_name(ingress, host, backend);
            self.push_servers(&name, endpoints, &config).await?;
        }
        Ok(())
    }

    async fn push_virtual_server_endpoints(&self, vs_ex: &VirtualServerEx) -> Result<()> {
        let upstreams = create_upstreams_for_plus(vs_ex, &self.params);
        let pushes = upstreams.iter().map(|upstream| async move {
            let servers: Vec<String> = upstream.servers.iter().map(|s| s.address.clone()).collect();
            self.push_servers(&upstream.name, &servers, &server_config_for_plus(upstream)).await
        });
        try_join_all(pushes).await?;
        Ok(())
    }

    async fn push_transport_server_endpoints(&self, ts_ex: &TransportServerEx) -> Result<()> {
        let ts = &ts_ex.transport_server;
        let namer = UpstreamNamer::for_transport_server(ts);

        for upstream in &ts.spec.upstreams {
            let name = namer.name_for_upstream(&upstream.name);
            let key = endpoints_key(&ts.metadata.namespace, &upstream.service, &Default::default(), upstream.port);
            let endpoints = ts_ex.endpoints.get(&key).cloned().unwrap_or_default();

            let result = self.manager.update_stream_servers(&name, &endpoints).await;
            metrics::record_endpoint_push(result.is_ok()).await;
            result?;
        }
        Ok(())
    }

    // ---- controller-wide updates ----

    /// Apply new ConfigMap parameters: write the dhparam file when its
    /// content is set, swap templates, then re-render the main config and
    /// every given resource with one reload
    pub async fn update_config(
        &mut self,
        mut params: ConfigParams,
        ingresses: &[IngressEx],
        mergeables: &[MergeableIngresses],
        virtual_servers: &[VirtualServerEx],
    ) -> Result<Warnings> {
        async {
            if let Some(content) = &params.main_server_ssl_dhparam_file_content {
                let path = self.manager.create_dhparam(content).await?;
                params.main_server_ssl_dhparam = path;
            }
            self.renderer.update_templates(&params)?;
            self.params = params;

            let mut changed = self.write_main_config().await?;
            let (staged, warnings) = self.stage_resources(ingresses, mergeables, virtual_servers).await?;
            changed |= staged;

            self.apply(changed).await?;
            self.publish_counts().await;
            Ok(warnings)
        }
        .instrument(crate::apply_span!("update_config", "configmap"))
        .await
    }

    /// Re-read the listeners of the GlobalConfiguration. TransportServers
    /// whose listener still exists are re-applied, the rest are removed.
    /// Returns the updated and the deleted TransportServers.
    pub async fn update_global_configuration(
        &mut self,
        global_configuration: &GlobalConfiguration,
        transport_servers: &[TransportServerEx],
    ) -> Result<(Vec<TransportServerEx>, Vec<TransportServerEx>)> {
        let key = global_configuration.metadata.key();
        async {
            let mut global_params =
                parse_global_configuration(global_configuration, self.static_params.tls_passthrough);
            override_passthrough_port(&mut global_params, self.options.tls_passthrough_port);
            self.global_params = global_params;

            let mut updated = Vec::new();
            let mut deleted = Vec::new();
            let mut changed = false;

            for ts_ex in transport_servers {
                if self.check_if_listener_exists(&ts_ex.transport_server.spec.listener) {
                    changed |= self.stage_transport_server(ts_ex).await?.0;
                    updated.push(ts_ex.clone());
                } else {
                    let meta = &ts_ex.transport_server.metadata;
                    info!(transport_server = %meta.key(), "Listener removed, deleting TransportServer");
                    changed |= self.unstage_transport_server(&meta.namespace, &meta.name).await?;
                    deleted.push(ts_ex.clone());
                }
            }

            self.apply(changed).await?;
            self.publish_counts().await;
            Ok((updated, deleted))
        }
        .instrument(crate::apply_span!("update_global_configuration", key))
        .await
    }

    pub fn check_if_listener_exists(&self, listener: &TransportServerListener) -> bool {
        self.global_params.listener_exists(&listener.name, &listener.protocol)
    }

    // ---- secrets ----

    /// Write a secret file named `namespace-name`, returning its path. OIDC
    /// secrets are used inline and never written.
    pub async fn add_or_update_secret(&self, secret: &Secret) -> Result<String> {
        let name = secret.metadata.file_name();
        match secret.secret_type {
            SecretType::Ca => {
                self.manager.create_secret(&name, secret.ca_file_content().as_bytes(), TLS_SECRET_FILE_MODE).await
            }
            SecretType::Jwk => {
                let data = secret.data.get(JWK_KEY).map(String::as_str).unwrap_or_default();
                self.manager.create_secret(&name, data.as_bytes(), JWK_SECRET_FILE_MODE).await
            }
            SecretType::Oidc => Ok(String::new()),
            SecretType::Tls | SecretType::Other(_) => {
                let content = secret.cert_and_key_file_content();
                self.manager.create_secret(&name, content.as_bytes(), TLS_SECRET_FILE_MODE).await
            }
        }
    }

    /// Delete the secret file of a secret keyed `namespace/name`
    pub async fn delete_secret(&self, key: &str) -> Result<()> {
        self.manager.delete_secret(&key.replace('/', "-")).await
    }

    /// Write a TLS secret under each of `names` and reload
    pub async fn add_or_update_special_tls_secrets(&mut self, secret: &Secret, names: &[&str]) -> Result<()> {
        let content = secret.cert_and_key_file_content();
        for name in names {
            self.manager.create_secret(name, content.as_bytes(), TLS_SECRET_FILE_MODE).await?;
        }
        self.reload(ReloadReason::OtherUpdate).await.map_err(|e| {
            ConfiguratorError::reload(" when updating the special Secrets", e.to_string())
        })
    }

    pub async fn add_or_update_default_server_tls_secret(&mut self, secret: &Secret) -> Result<()> {
        self.add_or_update_special_tls_secrets(secret, &[DEFAULT_SERVER_SECRET_NAME]).await
    }

    pub async fn add_or_update_wildcard_tls_secret(&mut self, secret: &Secret) -> Result<()> {
        self.add_or_update_special_tls_secrets(secret, &[WILDCARD_SECRET_NAME]).await
    }

    /// Write the dhparam file, returning its path
    pub async fn add_or_update_dhparam(&self, content: &str) -> Result<String> {
        self.manager.create_dhparam(content).await
    }

    /// Re-apply every resource referencing a changed secret, with one reload
    pub async fn add_or_update_resources_that_use_secret(
        &mut self,
        ingresses: &[IngressEx],
        mergeables: &[MergeableIngresses],
        virtual_servers: &[VirtualServerEx],
    ) -> Result<Warnings> {
        self.add_or_update_resources(ingresses, mergeables, virtual_servers).await
    }

    // ---- queries ----

    pub fn count_resources(&self) -> ResourceCounts {
        self.registry.counts()
    }

    pub fn has_ingress(&self, ingress: &Ingress) -> bool {
        self.registry.ingresses.contains_key(&ingress_file_name(&ingress.metadata))
    }

    pub fn has_minion(&self, master: &Ingress, minion: &Ingress) -> bool {
        self.registry
            .minions
            .get(&ingress_file_name(&master.metadata))
            .is_some_and(|minions| minions.contains(&ingress_file_name(&minion.metadata)))
    }

    pub fn has_virtual_server(&self, virtual_server: &VirtualServer) -> bool {
        self.registry.virtual_servers.contains_key(&virtual_server_file_name(&virtual_server.metadata))
    }

    pub fn has_transport_server(&self, transport_server: &TransportServer) -> bool {
        self.registry.transport_servers.contains_key(&transport_server_file_name(&transport_server.metadata))
    }

    /// VirtualServerRoutes of an applied VirtualServer keyed `namespace/name`
    pub fn virtual_server_routes_for(&self, key: &str) -> Vec<VirtualServerRoute> {
        let (namespace, name) = split_namespaced_name(key, "default");
        self.registry
            .virtual_servers
            .get(&virtual_server_file_name(&ObjectMeta::new(namespace, name)))
            .map(|vs_ex| vs_ex.virtual_server_routes.clone())
            .unwrap_or_default()
    }
}

fn override_passthrough_port(params: &mut GlobalConfigParams, port: u16) {
    if let Some(listener) = params.listeners.get_mut(TLS_PASSTHROUGH_LISTENER_NAME) {
        listener.port = port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transport_server::{GlobalConfigurationSpec, TransportServerAction, TransportServerSpec};
    use crate::domain::{
        Action, HttpIngressPath, HttpIngressRuleValue, IngressRule, IngressSpec, Listener, Route,
        TransportServerUpstream, Upstream, VirtualServerSpec,
    };
    use crate::nginx::{FakeManager, ManagerCall};
    use tracing_test::traced_test;

    fn cafe_vs(upstreams: &[&str]) -> VirtualServerEx {
        let mut vs_ex = VirtualServerEx::new(VirtualServer {
            metadata: ObjectMeta::new("default", "cafe"),
            spec: VirtualServerSpec {
                host: "cafe.example.com".to_string(),
                upstreams: upstreams.iter().map(|u| Upstream::new(*u, format!("{}-svc", u), 80)).collect(),
                routes: upstreams.iter().map(|u| Route::with_action(format!("/{}", u), Action::pass(*u))).collect(),
                ..Default::default()
            },
        });
        for u in upstreams {
            vs_ex.endpoints.insert(format!("default/{}-svc:80", u), vec!["10.0.0.1:80".to_string()]);
        }
        vs_ex
    }

    fn cafe_ingress() -> IngressEx {
        let mut ingress_ex = IngressEx::new(Ingress {
            metadata: ObjectMeta::new("default", "cafe-ingress"),
            spec: IngressSpec {
                rules: vec![IngressRule {
                    host: "cafe.example.com".to_string(),
                    http: Some(HttpIngressRuleValue {
                        paths: vec![HttpIngressPath::new("/tea", IngressBackend::new("tea-svc", 80))],
                    }),
                }],
                ..Default::default()
            },
        });
        ingress_ex.endpoints.insert("tea-svc80".to_string(), vec!["10.0.0.1:80".to_string()]);
        ingress_ex
    }

    fn passthrough_ts(name: &str, host: &str) -> TransportServerEx {
        TransportServerEx::new(TransportServer {
            metadata: ObjectMeta::new("default", name),
            spec: TransportServerSpec {
                listener: TransportServerListener::new("tls-passthrough", "TLS_PASSTHROUGH"),
                host: host.to_string(),
                upstreams: vec![TransportServerUpstream::new("app", "app-svc", 8443)],
                action: Some(TransportServerAction { pass: "app".to_string() }),
                ..Default::default()
            },
        })
    }

    fn dns_ts() -> TransportServerEx {
        let mut ts_ex = TransportServerEx::new(TransportServer {
            metadata: ObjectMeta::new("default", "dns"),
            spec: TransportServerSpec {
                listener: TransportServerListener::new("dns-udp", "UDP"),
                upstreams: vec![TransportServerUpstream::new("dns-app", "coredns", 5353)],
                action: Some(TransportServerAction { pass: "dns-app".to_string() }),
                ..Default::default()
            },
        });
        ts_ex.endpoints.insert("default/coredns:5353".to_string(), vec!["10.0.0.20:5353".to_string()]);
        ts_ex
    }

    fn configurator(manager: &Arc<FakeManager>, options: ConfiguratorOptions) -> Configurator {
        let static_params = StaticConfigParams { tls_passthrough: true, ..Default::default() };
        Configurator::new(manager.clone(), static_params, ConfigParams::default(), options)
    }

    fn plus() -> ConfiguratorOptions {
        ConfiguratorOptions { is_plus: true, is_prometheus_enabled: true, ..Default::default() }
    }

    #[tokio::test]
    async fn test_add_virtual_server_writes_and_reloads() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());

        let warnings = cnf.add_or_update_virtual_server(&cafe_vs(&["tea"])).await.unwrap();

        assert!(warnings.is_empty());
        assert!(manager.file("conf.d/vs_default_cafe.conf").is_some());
        assert_eq!(
            manager.calls(),
            vec![
                ManagerCall::CreateConfig("vs_default_cafe".to_string()),
                ManagerCall::Reload(ReloadReason::OtherUpdate)
            ]
        );
        assert!(cnf.has_virtual_server(&cafe_vs(&["tea"]).virtual_server));
        assert_eq!(cnf.count_resources().virtual_servers, 1);
    }

    #[tokio::test]
    async fn test_reapply_unchanged_does_not_reload() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());
        let vs_ex = cafe_vs(&["tea", "coffee"]);

        cnf.add_or_update_virtual_server(&vs_ex).await.unwrap();
        cnf.add_or_update_virtual_server(&vs_ex).await.unwrap();
        assert_eq!(manager.reload_count(), 1);

        cnf.add_or_update_virtual_server(&cafe_vs(&["tea"])).await.unwrap();
        assert_eq!(manager.reload_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_reload_is_retried_on_next_apply() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());
        let vs_ex = cafe_vs(&["tea"]);

        manager.fail_reloads(true);
        assert!(cnf.add_or_update_virtual_server(&vs_ex).await.is_err());

        manager.fail_reloads(false);
        cnf.add_or_update_virtual_server(&vs_ex).await.unwrap();
        assert_eq!(manager.reload_count(), 2);
    }

    #[tokio::test]
    async fn test_label_retraction_on_removed_upstream() {
        let manager = Arc::new(FakeManager::new());
        let sink = Arc::new(InMemoryLabelSink::new());
        let mut cnf = configurator(&manager, plus()).with_label_sinks(Some(sink.clone()), None);

        cnf.add_or_update_virtual_server(&cafe_vs(&["tea", "coffee"])).await.unwrap();
        assert_eq!(sink.len(LabelGroup::Upstream), 2);
        assert_eq!(
            sink.get(LabelGroup::Upstream, "vs_default_cafe_tea").unwrap(),
            vec!["tea-svc", "virtualserver", "cafe", "default"]
        );

        cnf.add_or_update_virtual_server(&cafe_vs(&["tea"])).await.unwrap();

        let upstream_retractions: Vec<_> =
            sink.retractions().into_iter().filter(|(group, _)| *group == LabelGroup::Upstream).collect();
        assert_eq!(upstream_retractions, vec![(LabelGroup::Upstream, vec!["vs_default_cafe_coffee".to_string()])]);
        assert!(sink.get(LabelGroup::Upstream, "vs_default_cafe_tea").is_some());
        assert_eq!(sink.get(LabelGroup::ServerZone, "cafe.example.com").unwrap()[0], "virtualserver");
    }

    #[tokio::test]
    async fn test_label_sinks_ignored_without_prometheus() {
        let manager = Arc::new(FakeManager::new());
        let sink = Arc::new(InMemoryLabelSink::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions { is_plus: true, ..Default::default() })
            .with_label_sinks(Some(sink.clone()), None);

        cnf.add_or_update_virtual_server(&cafe_vs(&["tea"])).await.unwrap();

        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_plus_endpoints_update_pushes_without_reload() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, plus());
        cnf.add_or_update_virtual_server(&cafe_vs(&["tea"])).await.unwrap();
        manager.clear_calls();

        let mut vs_ex = cafe_vs(&["tea"]);
        vs_ex.endpoints.insert("default/tea-svc:80".to_string(), vec!["10.0.0.2:80".to_string()]);
        cnf.update_endpoints_for_virtual_servers(&[vs_ex]).await.unwrap();

        let calls = manager.calls();
        assert!(calls.contains(&ManagerCall::UpdateServers {
            upstream: "vs_default_cafe_tea".to_string(),
            servers: vec!["10.0.0.2:80".to_string()],
        }));
        assert_eq!(manager.reload_count(), 0);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_failed_push_falls_back_to_reload() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, plus());
        manager.fail_pushes(true);

        cnf.update_endpoints(&[cafe_ingress()]).await.unwrap();

        assert!(manager.calls().contains(&ManagerCall::UpdateServers {
            upstream: "default-cafe-ingress-cafe.example.com-tea-svc-80".to_string(),
            servers: vec!["10.0.0.1:80".to_string()],
        }));
        assert!(manager.calls().contains(&ManagerCall::Reload(ReloadReason::EndpointsUpdate)));
        assert!(logs_contain("Couldn't update the endpoints via the API"));
        assert!(logs_contain("reloading configuration instead"));
    }

    #[tokio::test]
    async fn test_oss_endpoints_update_always_reloads() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());

        cnf.update_endpoints_for_transport_servers(&[dns_ts()]).await.unwrap();
        cnf.update_endpoints(&[cafe_ingress()]).await.unwrap();

        assert_eq!(manager.reload_count(), 2);
        assert!(!manager.calls().iter().any(|c| matches!(c, ManagerCall::UpdateServers { .. })));
    }

    #[tokio::test]
    async fn test_plus_transport_server_push() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, plus());
        let gc = GlobalConfiguration {
            metadata: ObjectMeta::new("nginx-ingress", "nginx-configuration"),
            spec: GlobalConfigurationSpec { listeners: vec![Listener::new("dns-udp", 5353, "UDP")] },
        };
        cnf.update_global_configuration(&gc, &[]).await.unwrap();
        manager.clear_calls();

        cnf.update_endpoints_for_transport_servers(&[dns_ts()]).await.unwrap();

        assert_eq!(
            manager.calls(),
            vec![
                ManagerCall::CreateStreamConfig("ts_default_dns".to_string()),
                ManagerCall::UpdateStreamServers {
                    upstream: "ts_default_dns_dns-app".to_string(),
                    servers: vec!["10.0.0.20:5353".to_string()],
                },
            ]
        );
    }

    #[traced_test]
    #[tokio::test]
    async fn test_duplicate_passthrough_host() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());

        let first = cnf.add_or_update_transport_server(&passthrough_ts("a", "app.example.com")).await.unwrap();
        assert!(first.is_empty());

        let second = cnf.add_or_update_transport_server(&passthrough_ts("b", "app.example.com")).await.unwrap();
        let key = ResourceKey::new(ResourceKind::TransportServer, "default", "b");
        assert_eq!(second.get(&key), &["host app.example.com is used by more than one TransportServers".to_string()]);
        assert!(logs_contain("host app.example.com is used by more than one TransportServers"));

        let hosts: crate::model::TlsPassthroughHostsConfig =
            serde_json::from_slice(&manager.file("tls-passthrough-hosts.conf").unwrap()).unwrap();
        assert_eq!(hosts["app.example.com"], "unix:/var/lib/nginx/passthrough-default_b.sock");
    }

    #[tokio::test]
    async fn test_delete_transport_server_rewrites_hosts() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());
        let ts_ex = passthrough_ts("a", "app.example.com");
        cnf.add_or_update_transport_server(&ts_ex).await.unwrap();
        manager.clear_calls();

        cnf.delete_transport_server("default/a").await.unwrap();

        assert_eq!(
            manager.calls(),
            vec![
                ManagerCall::DeleteStreamConfig("ts_default_a".to_string()),
                ManagerCall::CreateTlsPassthroughHostsConfig,
                ManagerCall::Reload(ReloadReason::OtherUpdate),
            ]
        );
        assert!(!cnf.has_transport_server(&ts_ex.transport_server));
        let hosts: crate::model::TlsPassthroughHostsConfig =
            serde_json::from_slice(&manager.file("tls-passthrough-hosts.conf").unwrap()).unwrap();
        assert!(hosts.is_empty());
    }

    #[tokio::test]
    async fn test_delete_ingress_retracts_labels() {
        let manager = Arc::new(FakeManager::new());
        let latency = Arc::new(InMemoryLabelSink::new());
        let options = ConfiguratorOptions { is_latency_metrics_enabled: true, ..Default::default() };
        let mut cnf = configurator(&manager, options).with_label_sinks(None, Some(latency.clone()));
        let ingress_ex = cafe_ingress();

        cnf.add_or_update_ingress(&ingress_ex).await.unwrap();
        assert!(cnf.has_ingress(&ingress_ex.ingress));
        assert_eq!(latency.len(LabelGroup::UpstreamPeer), 1);

        cnf.delete_ingress("default/cafe-ingress").await.unwrap();

        assert!(latency.is_empty());
        assert!(!cnf.has_ingress(&ingress_ex.ingress));
        assert!(manager.calls().contains(&ManagerCall::DeleteConfig("default-cafe-ingress".to_string())));
        assert_eq!(manager.reload_count(), 2);
    }

    #[tokio::test]
    async fn test_global_configuration_deletes_orphaned_transport_servers() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());
        let gc = GlobalConfiguration {
            metadata: ObjectMeta::new("nginx-ingress", "nginx-configuration"),
            spec: GlobalConfigurationSpec { listeners: vec![Listener::new("dns-udp", 5353, "UDP")] },
        };
        let (updated, deleted) = cnf.update_global_configuration(&gc, &[dns_ts()]).await.unwrap();
        assert_eq!(updated.len(), 1);
        assert!(deleted.is_empty());
        assert!(cnf.has_transport_server(&dns_ts().transport_server));

        let emptied = GlobalConfiguration { spec: GlobalConfigurationSpec { listeners: vec![] }, ..gc };
        let (updated, deleted) = cnf.update_global_configuration(&emptied, &[dns_ts()]).await.unwrap();

        assert!(updated.is_empty());
        assert_eq!(deleted.len(), 1);
        assert!(!cnf.has_transport_server(&dns_ts().transport_server));
        assert!(manager.calls().contains(&ManagerCall::DeleteStreamConfig("ts_default_dns".to_string())));
    }

    #[tokio::test]
    async fn test_mergeable_counts_and_minions() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());

        let mut master = cafe_ingress();
        master.ingress.metadata =
            ObjectMeta::new("default", "cafe-master").with_annotation("nginx.org/mergeable-ingress-type", "master");
        master.ingress.spec.rules[0].http = None;
        let mut minion = cafe_ingress();
        minion.ingress.metadata =
            ObjectMeta::new("default", "tea-minion").with_annotation("nginx.org/mergeable-ingress-type", "minion");

        let mergeable = MergeableIngresses { master: master.clone(), minions: vec![minion.clone()] };
        cnf.add_or_update_mergeable_ingress(&mergeable).await.unwrap();
        cnf.add_or_update_ingress(&cafe_ingress()).await.unwrap();

        assert!(manager.file("conf.d/default-cafe-master.conf").is_some());
        assert!(cnf.has_minion(&master.ingress, &minion.ingress));
        let counts = cnf.count_resources();
        assert_eq!(counts.master_ingresses, 1);
        assert_eq!(counts.regular_ingresses, 1);
        assert_eq!(counts.minion_ingresses, 1);
    }

    #[tokio::test]
    async fn test_jwk_path_is_filled() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions { is_plus: true, ..Default::default() });
        let mut ingress_ex = cafe_ingress();
        ingress_ex.ingress.metadata.annotations.insert(JWT_KEY_ANNOTATION.to_string(), "cafe-jwk".to_string());

        cnf.add_or_update_ingress(&ingress_ex).await.unwrap();

        let stored = &cnf.registry.ingresses["default-cafe-ingress"];
        assert_eq!(stored.secret_refs["default/cafe-jwk"].path, "/etc/nginx/secrets/default-cafe-jwk");
    }

    #[tokio::test]
    async fn test_update_config_writes_dhparam_and_main() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());
        let params = ConfigParams {
            main_server_ssl_dhparam_file_content: Some("DHPARAM".to_string()),
            ..Default::default()
        };

        cnf.update_config(params, &[cafe_ingress()], &[], &[cafe_vs(&["tea"])]).await.unwrap();

        assert_eq!(cnf.params().main_server_ssl_dhparam, "/etc/nginx/secrets/dhparam.pem");
        assert!(manager.file("nginx.conf").is_some());
        assert!(manager.file("conf.d/default-cafe-ingress.conf").is_some());
        assert!(manager.file("conf.d/vs_default_cafe.conf").is_some());
        assert_eq!(manager.reload_count(), 1);
    }

    #[tokio::test]
    async fn test_secrets_by_type() {
        let manager = Arc::new(FakeManager::new());
        let mut cnf = configurator(&manager, ConfiguratorOptions::default());

        let jwk = Secret::new(ObjectMeta::new("default", "cafe-jwk"), SecretType::Jwk).with_data(JWK_KEY, "{}");
        assert_eq!(cnf.add_or_update_secret(&jwk).await.unwrap(), "/etc/nginx/secrets/default-cafe-jwk");
        assert_eq!(manager.file("secrets/default-cafe-jwk").unwrap(), b"{}".to_vec());

        let oidc = Secret::new(ObjectMeta::new("default", "oidc"), SecretType::Oidc);
        assert_eq!(cnf.add_or_update_secret(&oidc).await.unwrap(), "");

        cnf.delete_secret("default/cafe-jwk").await.unwrap();
        assert!(manager.file("secrets/default-cafe-jwk").is_none());

        let tls = Secret::new(ObjectMeta::new("nginx-ingress", "default-server-secret"), SecretType::Tls)
            .with_data("tls.crt", "CERT")
            .with_data("tls.key", "KEY");
        cnf.add_or_update_default_server_tls_secret(&tls).await.unwrap();
        assert_eq!(manager.file("secrets/default").unwrap(), b"CERT\nKEY".to_vec());
        assert_eq!(manager.reload_count(), 1);
    }
}
