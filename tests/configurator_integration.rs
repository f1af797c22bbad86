//! Orchestrator against the filesystem manager.

mod common;

use std::sync::Arc;

use ingress_configurator::configurator::{Configurator, ConfiguratorOptions, InMemoryLabelSink, LabelGroup};
use ingress_configurator::domain::{Listener, ObjectMeta, ResourceKey, ResourceKind, Secret, SecretType};
use ingress_configurator::model::TlsPassthroughHostsConfig;
use ingress_configurator::nginx::LocalManager;
use ingress_configurator::params::{ConfigParams, StaticConfigParams};
use tempfile::TempDir;

async fn setup(options: ConfiguratorOptions) -> (TempDir, Arc<LocalManager>, Configurator) {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(LocalManager::new(dir.path()));
    manager.init().await.unwrap();

    let static_params = StaticConfigParams { tls_passthrough: true, ..Default::default() };
    let configurator = Configurator::new(manager.clone(), static_params, ConfigParams::default(), options);
    (dir, manager, configurator)
}

#[tokio::test]
async fn test_apply_reapply_and_delete_virtual_server() {
    let (dir, manager, mut cnf) = setup(ConfiguratorOptions::default()).await;
    let vs_ex = common::cafe_virtual_server();

    let warnings = cnf.add_or_update_virtual_server(&vs_ex).await.unwrap();
    assert!(warnings.is_empty());
    let path = dir.path().join("conf.d/vs_default_cafe.conf");
    assert!(path.exists());
    assert_eq!(manager.config_version(), 1);

    cnf.add_or_update_virtual_server(&vs_ex).await.unwrap();
    assert_eq!(manager.config_version(), 1, "unchanged config must not reload");

    let counts = cnf.count_resources();
    assert_eq!(counts.virtual_servers, 1);
    assert_eq!(counts.virtual_server_routes, 1);
    assert_eq!(cnf.virtual_server_routes_for("default/cafe").len(), 1);

    cnf.delete_virtual_server("default/cafe").await.unwrap();
    assert!(!path.exists());
    assert_eq!(manager.config_version(), 2);
    assert!(!cnf.has_virtual_server(&vs_ex.virtual_server));
}

#[tokio::test]
async fn test_batch_apply_reloads_once() {
    let (dir, manager, mut cnf) = setup(ConfiguratorOptions::default()).await;

    cnf.add_or_update_resources(&[common::cafe_ingress()], &[], &[common::cafe_virtual_server()]).await.unwrap();

    assert_eq!(manager.config_version(), 1);
    assert!(dir.path().join("conf.d/default-cafe-ingress.conf").exists());
    assert!(dir.path().join("conf.d/vs_default_cafe.conf").exists());
}

#[tokio::test]
async fn test_plus_endpoints_update_falls_back_to_reload() {
    let options = ConfiguratorOptions { is_plus: true, is_prometheus_enabled: true, ..Default::default() };
    let (_dir, manager, cnf) = setup(options).await;
    let sink = Arc::new(InMemoryLabelSink::new());
    let mut cnf = cnf.with_label_sinks(Some(sink.clone()), None);

    let mut vs_ex = common::cafe_virtual_server();
    cnf.add_or_update_virtual_server(&vs_ex).await.unwrap();
    assert_eq!(sink.len(LabelGroup::Upstream), 4);

    vs_ex.endpoints.insert("default/tea-v1-svc:80".to_string(), vec!["10.0.1.1:80".to_string()]);
    cnf.update_endpoints_for_virtual_servers(&[vs_ex]).await.unwrap();

    // The filesystem manager has no Plus API, so every push fails
    assert_eq!(manager.config_version(), 2);
    assert_eq!(
        sink.get(LabelGroup::UpstreamPeer, "vs_default_cafe_tea-v1/10.0.1.1:80"),
        Some(vec![String::new()])
    );
    assert!(sink.get(LabelGroup::UpstreamPeer, "vs_default_cafe_tea-v1/10.0.0.1:80").is_none());
}

#[tokio::test]
async fn test_duplicate_passthrough_hosts() {
    let (dir, _manager, mut cnf) = setup(ConfiguratorOptions::default()).await;

    let warnings = cnf
        .add_or_update_transport_servers(&[
            common::passthrough_transport_server("a", "app.example.com"),
            common::passthrough_transport_server("b", "app.example.com"),
            common::passthrough_transport_server("c", "other.example.com"),
        ])
        .await
        .unwrap();

    let b = ResourceKey::new(ResourceKind::TransportServer, "default", "b");
    assert_eq!(warnings.get(&b), &["host app.example.com is used by more than one TransportServers".to_string()]);
    assert_eq!(warnings.len(), 1);

    let content = std::fs::read(dir.path().join("tls-passthrough-hosts.conf")).unwrap();
    let hosts: TlsPassthroughHostsConfig = serde_json::from_slice(&content).unwrap();
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts["app.example.com"], "unix:/var/lib/nginx/passthrough-default_b.sock");
    assert!(dir.path().join("stream-conf.d/ts_default_c.conf").exists());
}

#[tokio::test]
async fn test_global_configuration_changes() {
    let (dir, _manager, mut cnf) = setup(ConfiguratorOptions::default()).await;
    let dns = common::dns_transport_server();

    let gc = common::global_configuration(vec![Listener::new("dns-udp", 5353, "UDP")]);
    let (updated, deleted) = cnf.update_global_configuration(&gc, &[dns.clone()]).await.unwrap();
    assert_eq!((updated.len(), deleted.len()), (1, 0));
    assert!(dir.path().join("stream-conf.d/ts_default_dns.conf").exists());

    // Same name, other protocol
    let gc = common::global_configuration(vec![Listener::new("dns-udp", 5353, "TCP")]);
    let (updated, deleted) = cnf.update_global_configuration(&gc, &[dns.clone()]).await.unwrap();
    assert_eq!((updated.len(), deleted.len()), (0, 1));
    assert!(!dir.path().join("stream-conf.d/ts_default_dns.conf").exists());
    assert!(!cnf.has_transport_server(&dns.transport_server));
}

#[tokio::test]
async fn test_secrets_are_written_with_their_names() {
    let (dir, manager, mut cnf) = setup(ConfiguratorOptions::default()).await;

    let tls = Secret::new(ObjectMeta::new("default", "cafe-secret"), SecretType::Tls)
        .with_data("tls.crt", "CERT")
        .with_data("tls.key", "KEY");
    let path = cnf.add_or_update_secret(&tls).await.unwrap();
    assert_eq!(path, dir.path().join("secrets/default-cafe-secret").display().to_string());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "CERT\nKEY");

    cnf.add_or_update_wildcard_tls_secret(&tls).await.unwrap();
    assert!(dir.path().join("secrets/wildcard").exists());
    assert_eq!(manager.config_version(), 1);

    cnf.delete_secret("default/cafe-secret").await.unwrap();
    assert!(!dir.path().join("secrets/default-cafe-secret").exists());
}
