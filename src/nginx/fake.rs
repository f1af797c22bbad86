//! In-memory proxy manager that records calls.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::errors::{ConfiguratorError, Result};

use super::{ProxyManager, ReloadReason, ServerConfig};

/// One recorded manager call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerCall {
    CreateMainConfig,
    CreateConfig(String),
    DeleteConfig(String),
    CreateStreamConfig(String),
    DeleteStreamConfig(String),
    CreateTlsPassthroughHostsConfig,
    CreateSecret(String),
    DeleteSecret(String),
    CreateDhParam,
    Reload(ReloadReason),
    UpdateServers { upstream: String, servers: Vec<String> },
    UpdateStreamServers { upstream: String, servers: Vec<String> },
}

#[derive(Debug, Default)]
pub struct FakeManager {
    calls: Mutex<Vec<ManagerCall>>,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_pushes: AtomicBool,
    fail_reloads: AtomicBool,
}

impl FakeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every server-list push fail
    pub fn fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    /// Make every reload fail
    pub fn fail_reloads(&self, fail: bool) {
        self.fail_reloads.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ManagerCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn reload_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, ManagerCall::Reload(_))).count()
    }

    /// Content last written under a path such as `conf.d/vs_default_cafe.conf`
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).get(path).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }

    fn record(&self, call: ManagerCall) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }

    fn put(&self, path: String, content: &[u8]) {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).insert(path, content.to_vec());
    }

    fn remove(&self, path: &str) {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).remove(path);
    }
}

#[async_trait]
impl ProxyManager for FakeManager {
    async fn create_main_config(&self, content: &[u8]) -> Result<()> {
        self.record(ManagerCall::CreateMainConfig);
        self.put("nginx.conf".to_string(), content);
        Ok(())
    }

    async fn create_config(&self, name: &str, content: &[u8]) -> Result<()> {
        self.record(ManagerCall::CreateConfig(name.to_string()));
        self.put(format!("conf.d/{}.conf", name), content);
        Ok(())
    }

    async fn delete_config(&self, name: &str) -> Result<()> {
        self.record(ManagerCall::DeleteConfig(name.to_string()));
        self.remove(&format!("conf.d/{}.conf", name));
        Ok(())
    }

    async fn create_stream_config(&self, name: &str, content: &[u8]) -> Result<()> {
        self.record(ManagerCall::CreateStreamConfig(name.to_string()));
        self.put(format!("stream-conf.d/{}.conf", name), content);
        Ok(())
    }

    async fn delete_stream_config(&self, name: &str) -> Result<()> {
        self.record(ManagerCall::DeleteStreamConfig(name.to_string()));
        self.remove(&format!("stream-conf.d/{}.conf", name));
        Ok(())
    }

    async fn create_tls_passthrough_hosts_config(&self, content: &[u8]) -> Result<()> {
        self.record(ManagerCall::CreateTlsPassthroughHostsConfig);
        self.put("tls-passthrough-hosts.conf".to_string(), content);
        Ok(())
    }

    async fn create_secret(&self, name: &str, content: &[u8], _mode: u32) -> Result<String> {
        self.record(ManagerCall::CreateSecret(name.to_string()));
        self.put(format!("secrets/{}", name), content);
        Ok(self.filename_for_secret(name))
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        self.record(ManagerCall::DeleteSecret(name.to_string()));
        self.remove(&format!("secrets/{}", name));
        Ok(())
    }

    fn filename_for_secret(&self, name: &str) -> String {
        format!("/etc/nginx/secrets/{}", name)
    }

    async fn create_dhparam(&self, content: &str) -> Result<String> {
        self.record(ManagerCall::CreateDhParam);
        self.put("secrets/dhparam.pem".to_string(), content.as_bytes());
        Ok("/etc/nginx/secrets/dhparam.pem".to_string())
    }

    async fn reload(&self, reason: ReloadReason) -> Result<()> {
        self.record(ManagerCall::Reload(reason));
        if self.fail_reloads.load(Ordering::SeqCst) {
            return Err(ConfiguratorError::reload("", "nginx -s reload exited with status 1"));
        }
        Ok(())
    }

    async fn update_servers(&self, upstream: &str, servers: &[String], _config: &ServerConfig) -> Result<()> {
        self.record(ManagerCall::UpdateServers { upstream: upstream.to_string(), servers: servers.to_vec() });
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(ConfiguratorError::endpoints_update(upstream, "upstream not found"));
        }
        Ok(())
    }

    async fn update_stream_servers(&self, upstream: &str, servers: &[String]) -> Result<()> {
        self.record(ManagerCall::UpdateStreamServers { upstream: upstream.to_string(), servers: servers.to_vec() });
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(ConfiguratorError::endpoints_update(upstream, "upstream not found"));
        }
        Ok(())
    }
}
