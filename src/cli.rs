//! # Command Line Interface
//!
//! Offline entry points over a resource snapshot file:
//!
//! - `compile` prints the compiled model of every resource with its warnings
//! - `apply` runs the orchestrator against a [`LocalManager`] writing under
//!   a config directory

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{read_template, AppConfig, ControllerConfig, ObservabilityConfig};
use crate::configurator::{Configurator, ResourceCounts};
use crate::domain::{
    ConfigMap, GlobalConfiguration, IngressEx, MergeableIngresses, ResourceKey, ResourceKind, TransportServerEx,
    VirtualServerEx,
};
use crate::generator::{
    generate_ingress_config, generate_mergeable_config, generate_transport_server_config,
    generate_virtual_server_config, CompileContext,
};
use crate::model::{IngressNginxConfig, MainConfig, TransportServerConfig, VirtualServerConfig};
use crate::nginx::LocalManager;
use crate::observability::init_logging;
use crate::params::{
    generate_main_config, parse_config_map, parse_global_configuration, rejected_to_warnings, ConfigParams,
};
use crate::warnings::Warnings;

#[derive(Parser)]
#[command(name = "ingress-configurator")]
#[command(about = "NGINX ingress configuration compiler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file layered under INGRESS__* environment variables
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a snapshot and print the result as JSON
    Compile {
        /// YAML or JSON snapshot of the resources
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Compile for NGINX Plus
        #[arg(long)]
        plus: bool,
    },

    /// Apply a snapshot to a configuration directory
    Apply {
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Directory receiving the configuration, overrides the settings
        #[arg(long)]
        config_dir: Option<PathBuf>,

        #[arg(long)]
        plus: bool,
    },
}

/// Every resource the controller would hand over in one reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub config_map: Option<ConfigMap>,
    pub global_configuration: Option<GlobalConfiguration>,
    pub ingresses: Vec<IngressEx>,
    pub mergeable_ingresses: Vec<MergeableIngresses>,
    pub virtual_servers: Vec<VirtualServerEx>,
    pub transport_servers: Vec<TransportServerEx>,
}

impl Snapshot {
    /// Read a snapshot, as JSON for `.json` files and YAML otherwise
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read snapshot {}: {}", path.display(), e))?;

        let snapshot = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(snapshot)
    }
}

/// Output of `compile`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompiledSnapshot {
    pub main: MainConfig,
    pub ingresses: BTreeMap<String, IngressNginxConfig>,
    pub virtual_servers: BTreeMap<String, VirtualServerConfig>,
    pub transport_servers: BTreeMap<String, TransportServerConfig>,
    /// Warnings keyed by resource
    pub warnings: BTreeMap<String, Vec<String>>,
}

fn config_map_params(snapshot: &Snapshot, is_plus: bool) -> (ConfigParams, Warnings) {
    let Some(config_map) = &snapshot.config_map else {
        return (ConfigParams::default(), Warnings::new());
    };
    let (params, rejected) = parse_config_map(config_map, is_plus);
    let key = ResourceKey::from_meta(ResourceKind::ConfigMap, &config_map.metadata);
    (params, rejected_to_warnings(&key, &rejected))
}

/// Compile every resource of a snapshot without touching the filesystem
pub fn compile_snapshot(snapshot: &Snapshot, controller: &ControllerConfig) -> CompiledSnapshot {
    let static_params = controller.static_params();
    let (params, mut warnings) = config_map_params(snapshot, controller.is_plus);
    let global_params = match &snapshot.global_configuration {
        Some(gc) => parse_global_configuration(gc, static_params.tls_passthrough),
        None => controller.global_config_params(),
    };
    let ctx =
        CompileContext::new(&params, &static_params, controller.is_plus).with_wildcard(controller.is_wildcard_enabled());

    let mut compiled = CompiledSnapshot { main: generate_main_config(&static_params, &params), ..Default::default() };

    for ingress_ex in &snapshot.ingresses {
        let (config, w) = generate_ingress_config(ingress_ex, &ctx);
        compiled.ingresses.insert(ingress_ex.key(), config);
        warnings.extend(w);
    }
    for mergeable in &snapshot.mergeable_ingresses {
        let (config, w) = generate_mergeable_config(mergeable, &ctx);
        compiled.ingresses.insert(mergeable.master.key(), config);
        warnings.extend(w);
    }
    for vs_ex in &snapshot.virtual_servers {
        let (config, w) = generate_virtual_server_config(vs_ex, &ctx);
        compiled.virtual_servers.insert(vs_ex.key(), config);
        warnings.extend(w);
    }
    for ts_ex in &snapshot.transport_servers {
        let ts = &ts_ex.transport_server;
        let Some(port) = global_params.listener_port(&ts.spec.listener.name) else {
            let key = ResourceKey::from_meta(ResourceKind::TransportServer, &ts.metadata);
            warnings.add(&key, format!("Listener {} doesn't exist", ts.spec.listener.name));
            continue;
        };
        let config = generate_transport_server_config(ts_ex, port, controller.is_plus);
        compiled.transport_servers.insert(ts_ex.key(), config);
    }

    compiled.warnings = warnings.iter().map(|(key, messages)| (key.to_string(), messages.clone())).collect();
    compiled
}

/// Result of `apply`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub counts: ResourceCounts,
    pub warnings: BTreeMap<String, Vec<String>>,
    pub deleted_transport_servers: Vec<String>,
}

/// Run the orchestrator over a snapshot with a filesystem manager
pub async fn apply_snapshot(snapshot: &Snapshot, controller: &ControllerConfig) -> anyhow::Result<ApplyReport> {
    let manager = LocalManager::new(&controller.config_dir);
    manager.init().await?;

    let (mut params, mut warnings) = config_map_params(snapshot, controller.is_plus);
    params.main_template = read_template(controller.main_template.as_deref())?;
    params.ingress_template = read_template(controller.ingress_template.as_deref())?;
    params.virtual_server_template = read_template(controller.virtual_server_template.as_deref())?;

    let mut configurator = Configurator::from_controller(Arc::new(manager), controller, params.clone());
    warnings.extend(
        configurator
            .update_config(params, &snapshot.ingresses, &snapshot.mergeable_ingresses, &snapshot.virtual_servers)
            .await?,
    );

    let mut report = ApplyReport::default();
    match &snapshot.global_configuration {
        Some(gc) => {
            let (_, deleted) = configurator.update_global_configuration(gc, &snapshot.transport_servers).await?;
            report.deleted_transport_servers = deleted.iter().map(TransportServerEx::key).collect();
        }
        None => {
            warnings.extend(configurator.add_or_update_transport_servers(&snapshot.transport_servers).await?);
        }
    }

    report.counts = configurator.count_resources();
    report.warnings = warnings.iter().map(|(key, messages)| (key.to_string(), messages.clone())).collect();
    Ok(report)
}

fn initialise_logging(verbose: bool) -> anyhow::Result<()> {
    let mut observability = ObservabilityConfig::from_env();
    if verbose {
        observability.log_level = "debug".to_string();
    }
    init_logging(&observability)?;
    Ok(())
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    initialise_logging(cli.verbose)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile { snapshot, plus } => {
            config.controller.is_plus |= plus;
            let snapshot = Snapshot::load(&snapshot)?;
            let compiled = compile_snapshot(&snapshot, &config.controller);
            println!("{}", serde_json::to_string_pretty(&compiled)?);
        }

        Commands::Apply { snapshot, config_dir, plus } => {
            config.controller.is_plus |= plus;
            if let Some(dir) = config_dir {
                config.controller.config_dir = dir.display().to_string();
            }
            crate::observability::log_config_info(&config);

            let snapshot = Snapshot::load(&snapshot)?;
            let report = apply_snapshot(&snapshot, &config.controller).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
