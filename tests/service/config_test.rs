use std::sync::Arc;
use provision_core::{ConfigInfo, Feature, Properties};
use provision_service::{FeatureConfigInstaller, InstallOptions, MemoryConfigAdmin, CONFIG_KEY};
use tempfile::tempdir;

use crate::support::harness;

fn props(entries: &[(&str, &str)]) -> Properties {
    entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn appending(entries: &[(&str, &str)]) -> Feature {
    Feature::builder("configured")
        .version("1.0")
        .config(ConfigInfo::new("org.example.app", props(entries)).appending())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_append_twice_updates_once() {
    let dir = tempdir().unwrap();
    let admin = Arc::new(MemoryConfigAdmin::new());
    let installer = FeatureConfigInstaller::new(admin.clone(), Some(dir.path().join("etc")), dir.path());
    let feature = appending(&[("port", "8181")]);

    installer.install_feature_configs(&feature).await.unwrap();
    assert_eq!(admin.update_count().await, 1);
    installer.install_feature_configs(&feature).await.unwrap();
    assert_eq!(admin.update_count().await, 1);
}

#[tokio::test]
async fn test_append_adds_missing_keys_only() {
    let dir = tempdir().unwrap();
    let admin = Arc::new(MemoryConfigAdmin::new());
    let installer = FeatureConfigInstaller::new(admin.clone(), None, dir.path());

    installer.install_feature_configs(&appending(&[("port", "8181")])).await.unwrap();
    installer
        .install_feature_configs(&appending(&[("port", "9999"), ("host", "0.0.0.0")]))
        .await
        .unwrap();

    let config = admin.get("org.example.app").await.unwrap();
    assert_eq!(config.properties["port"], "8181");
    assert_eq!(config.properties["host"], "0.0.0.0");
    assert_eq!(config.properties[CONFIG_KEY], "org.example.app");
    assert_eq!(admin.update_count().await, 2);
}

#[tokio::test]
async fn test_feature_configs_follow_install_and_uninstall() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;

    h.service.install_feature("configured", "1.0", InstallOptions::new()).await.unwrap();
    let config = h.admin.get("org.example.app").await.unwrap();
    assert_eq!(config.properties["port"], "8181");
    assert!(dir.path().join("etc/org.example.app.cfg").is_file());

    h.service.uninstall_feature("configured").await.unwrap();
    assert!(h.admin.get("org.example.app").await.is_none());
    assert!(!dir.path().join("etc/org.example.app.cfg").exists());
}
