//! # Ingress Configurator
//!
//! Configuration compiler and reconciliation core of an NGINX-based
//! Kubernetes ingress controller. Immutable snapshots of Ingresses,
//! VirtualServers, TransportServers, policies, secret references and live
//! endpoints are compiled into a proxy configuration model, rendered, and
//! applied through a proxy manager with a reload or a dynamic server push.
//!
//! ## Architecture
//!
//! ```text
//! domain → params → upstream / routing / policy → generator → model
//!                                                     ↓
//!                          configurator (registry, labels, passthrough)
//!                                                     ↓
//!                                              nginx::ProxyManager
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ingress_configurator::config::ControllerConfig;
//! use ingress_configurator::configurator::Configurator;
//! use ingress_configurator::nginx::LocalManager;
//! use ingress_configurator::params::ConfigParams;
//!
//! # async fn run() -> ingress_configurator::Result<()> {
//! let controller = ControllerConfig::from_env();
//! let manager = Arc::new(LocalManager::new(&controller.config_dir));
//! let mut configurator = Configurator::from_controller(manager, &controller, ConfigParams::default());
//! configurator.write_main_config().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod configurator;
pub mod domain;
pub mod errors;
pub mod generator;
pub mod model;
pub mod nginx;
pub mod observability;
pub mod params;
pub mod policy;
pub mod routing;
pub mod upstream;
pub mod warnings;

pub use config::{AppConfig, ControllerConfig};
pub use configurator::Configurator;
pub use errors::{ConfiguratorError, Result};
pub use warnings::Warnings;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "ingress-configurator");
    }
}
