//! # Proxy Manager
//!
//! The boundary between the configurator and the proxy process. A manager
//! persists rendered artifacts, triggers reloads and pushes server lists
//! to a live Plus instance. Process lifecycle stays outside this crate.
//!
//! - [`LocalManager`] writes files under a config directory
//! - [`FakeManager`] records every call in memory

pub mod fake;
pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Result;

pub use fake::{FakeManager, ManagerCall};
pub use local::LocalManager;

/// File mode for TLS certificate and key files
pub const TLS_SECRET_FILE_MODE: u32 = 0o600;
/// File mode for JWK files
pub const JWK_SECRET_FILE_MODE: u32 = 0o644;

/// Why a reload was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloadReason {
    EndpointsUpdate,
    OtherUpdate,
}

impl ReloadReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadReason::EndpointsUpdate => "endpoints",
            ReloadReason::OtherUpdate => "other",
        }
    }
}

impl fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-server parameters of a dynamic server-list push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub max_fails: i64,
    pub max_conns: i64,
    pub fail_timeout: String,
    pub slow_start: String,
}

/// Operations the configurator needs from the proxy
#[async_trait]
pub trait ProxyManager: Send + Sync {
    /// Replace the main configuration file
    async fn create_main_config(&self, content: &[u8]) -> Result<()>;

    /// Replace an HTTP configuration file, named without extension
    async fn create_config(&self, name: &str, content: &[u8]) -> Result<()>;

    async fn delete_config(&self, name: &str) -> Result<()>;

    /// Replace a stream configuration file, named without extension
    async fn create_stream_config(&self, name: &str, content: &[u8]) -> Result<()>;

    async fn delete_stream_config(&self, name: &str) -> Result<()>;

    /// Replace the TLS passthrough host map
    async fn create_tls_passthrough_hosts_config(&self, content: &[u8]) -> Result<()>;

    /// Write a secret file, returning its path
    async fn create_secret(&self, name: &str, content: &[u8], mode: u32) -> Result<String>;

    async fn delete_secret(&self, name: &str) -> Result<()>;

    /// Path a secret with this name is written to
    fn filename_for_secret(&self, name: &str) -> String;

    /// Write the dhparam file, returning its path
    async fn create_dhparam(&self, content: &str) -> Result<String>;

    /// Apply every written file. Failures are returned, never retried.
    async fn reload(&self, reason: ReloadReason) -> Result<()>;

    /// Replace the servers of a live HTTP upstream
    async fn update_servers(&self, upstream: &str, servers: &[String], config: &ServerConfig) -> Result<()>;

    /// Replace the servers of a live stream upstream
    async fn update_stream_servers(&self, upstream: &str, servers: &[String]) -> Result<()>;
}
