//! Filesystem-backed proxy manager.
//!
//! Layout under the config directory:
//!
//! ```text
//! nginx.conf
//! conf.d/{name}.conf
//! stream-conf.d/{name}.conf
//! secrets/{name}
//! secrets/dhparam.pem
//! tls-passthrough-hosts.conf
//! config-version.conf
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{ConfiguratorError, Result};

use super::{ProxyManager, ReloadReason, ServerConfig};

#[derive(Debug)]
pub struct LocalManager {
    confd_path: PathBuf,
    stream_confd_path: PathBuf,
    secrets_path: PathBuf,
    main_conf_filename: PathBuf,
    config_version_filename: PathBuf,
    dhparam_filename: PathBuf,
    tls_passthrough_hosts_filename: PathBuf,
    config_version: AtomicU64,
}

impl LocalManager {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let root = config_dir.as_ref();
        Self {
            confd_path: root.join("conf.d"),
            stream_confd_path: root.join("stream-conf.d"),
            secrets_path: root.join("secrets"),
            main_conf_filename: root.join("nginx.conf"),
            config_version_filename: root.join("config-version.conf"),
            dhparam_filename: root.join("secrets").join("dhparam.pem"),
            tls_passthrough_hosts_filename: root.join("tls-passthrough-hosts.conf"),
            config_version: AtomicU64::new(0),
        }
    }

    /// Create the directory layout
    pub async fn init(&self) -> Result<()> {
        for dir in [&self.confd_path, &self.stream_confd_path, &self.secrets_path] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ConfiguratorError::io(e, format!("Failed to create {}", dir.display())))?;
        }
        Ok(())
    }

    pub fn config_version(&self) -> u64 {
        self.config_version.load(Ordering::SeqCst)
    }

    pub fn filename_for_config(&self, name: &str) -> PathBuf {
        self.confd_path.join(format!("{}.conf", name))
    }

    pub fn filename_for_stream_config(&self, name: &str) -> PathBuf {
        self.stream_confd_path.join(format!("{}.conf", name))
    }
}

async fn write_file(filename: &Path, content: &[u8]) -> Result<()> {
    tracing::debug!(path = %filename.display(), bytes = content.len(), "Writing config");
    if let Some(parent) = filename.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ConfiguratorError::io(e, format!("Failed to create {}", parent.display())))?;
    }
    tokio::fs::write(filename, content)
        .await
        .map_err(|e| ConfiguratorError::io(e, format!("Failed to write config to {}", filename.display())))
}

/// Write through a temporary file in the same directory so readers never
/// see a partial secret
async fn write_file_atomically(filename: &Path, mode: u32, content: &[u8]) -> Result<()> {
    let dir = filename.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ConfiguratorError::io(e, format!("Failed to create {}", dir.display())))?;

    let temp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    tokio::fs::write(&temp, content)
        .await
        .map_err(|e| ConfiguratorError::io(e, format!("Couldn't write a temp file for {}", filename.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| ConfiguratorError::io(e, format!("Couldn't change the mode of {}", temp.display())))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tokio::fs::rename(&temp, filename)
        .await
        .map_err(|e| ConfiguratorError::io(e, format!("Failed to rename {} to {}", temp.display(), filename.display())))
}

/// Removal of a missing file is only worth a warning
async fn delete_file(filename: &Path) {
    tracing::debug!(path = %filename.display(), "Deleting config");
    if let Err(e) = tokio::fs::remove_file(filename).await {
        tracing::warn!(path = %filename.display(), error = %e, "Failed to delete file");
    }
}

#[async_trait]
impl ProxyManager for LocalManager {
    async fn create_main_config(&self, content: &[u8]) -> Result<()> {
        write_file(&self.main_conf_filename, content).await
    }

    async fn create_config(&self, name: &str, content: &[u8]) -> Result<()> {
        write_file(&self.filename_for_config(name), content).await
    }

    async fn delete_config(&self, name: &str) -> Result<()> {
        delete_file(&self.filename_for_config(name)).await;
        Ok(())
    }

    async fn create_stream_config(&self, name: &str, content: &[u8]) -> Result<()> {
        write_file(&self.filename_for_stream_config(name), content).await
    }

    async fn delete_stream_config(&self, name: &str) -> Result<()> {
        delete_file(&self.filename_for_stream_config(name)).await;
        Ok(())
    }

    async fn create_tls_passthrough_hosts_config(&self, content: &[u8]) -> Result<()> {
        write_file(&self.tls_passthrough_hosts_filename, content).await
    }

    async fn create_secret(&self, name: &str, content: &[u8], mode: u32) -> Result<String> {
        let filename = self.secrets_path.join(name);
        tracing::debug!(path = %filename.display(), "Writing secret");
        write_file_atomically(&filename, mode, content).await?;
        Ok(filename.display().to_string())
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        delete_file(&self.secrets_path.join(name)).await;
        Ok(())
    }

    fn filename_for_secret(&self, name: &str) -> String {
        self.secrets_path.join(name).display().to_string()
    }

    async fn create_dhparam(&self, content: &str) -> Result<String> {
        write_file(&self.dhparam_filename, content.as_bytes()).await?;
        Ok(self.dhparam_filename.display().to_string())
    }

    async fn reload(&self, reason: ReloadReason) -> Result<()> {
        let version = self.config_version.fetch_add(1, Ordering::SeqCst) + 1;
        let content = format!("# configuration version {}\n", version);
        write_file_atomically(&self.config_version_filename, 0o644, content.as_bytes())
            .await
            .map_err(|e| ConfiguratorError::reload("", e.to_string()))?;

        tracing::info!(version, reason = %reason, "Configuration written, reload requested");
        Ok(())
    }

    async fn update_servers(&self, upstream: &str, servers: &[String], _config: &ServerConfig) -> Result<()> {
        tracing::debug!(upstream = %upstream, servers = servers.len(), "No Plus API attached");
        Err(ConfiguratorError::endpoints_update(upstream, "NGINX Plus API is not available"))
    }

    async fn update_stream_servers(&self, upstream: &str, servers: &[String]) -> Result<()> {
        tracing::debug!(upstream = %upstream, servers = servers.len(), "No Plus API attached");
        Err(ConfiguratorError::endpoints_update(upstream, "NGINX Plus API is not available"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_files_layout() {
        let dir = TempDir::new().unwrap();
        let manager = LocalManager::new(dir.path());
        manager.init().await.unwrap();

        manager.create_config("vs_default_cafe", b"{}").await.unwrap();
        manager.create_stream_config("ts_default_dns", b"{}").await.unwrap();
        manager.create_main_config(b"main").await.unwrap();

        assert!(dir.path().join("conf.d/vs_default_cafe.conf").exists());
        assert!(dir.path().join("stream-conf.d/ts_default_dns.conf").exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("nginx.conf")).unwrap(), "main");

        manager.delete_config("vs_default_cafe").await.unwrap();
        assert!(!dir.path().join("conf.d/vs_default_cafe.conf").exists());
    }

    #[tokio::test]
    async fn test_deleting_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let manager = LocalManager::new(dir.path());

        assert!(manager.delete_config("missing").await.is_ok());
        assert!(manager.delete_secret("missing").await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_secret_written_with_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let manager = LocalManager::new(dir.path());

        let path = manager.create_secret("default-cafe-secret", b"CERT", 0o600).await.unwrap();

        assert_eq!(path, manager.filename_for_secret("default-cafe-secret"));
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("secrets")).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_bumps_version() {
        let dir = TempDir::new().unwrap();
        let manager = LocalManager::new(dir.path());

        manager.reload(ReloadReason::OtherUpdate).await.unwrap();
        manager.reload(ReloadReason::EndpointsUpdate).await.unwrap();

        assert_eq!(manager.config_version(), 2);
        let content = std::fs::read_to_string(dir.path().join("config-version.conf")).unwrap();
        assert!(content.contains("version 2"));
    }

    #[tokio::test]
    async fn test_server_push_unavailable() {
        let dir = TempDir::new().unwrap();
        let manager = LocalManager::new(dir.path());

        let result = manager.update_servers("vs_default_cafe_tea", &[], &ServerConfig::default()).await;

        assert!(matches!(result, Err(ConfiguratorError::EndpointsUpdate { .. })));
    }
}
