use provision_core::{FeatureId, ProvisionError};
use provision_service::{BundleCall, FeatureEvent, InstallOptions};
use tempfile::tempdir;

use crate::support::{harness, REPO_URI};

fn boot(config: &mut provision_core::ServiceConfig) {
    config.boot_features = "good;version=1.0, missing".to_string();
}

#[tokio::test]
async fn test_boot_features_install_once() {
    let dir = tempdir().unwrap();
    let first = harness(&dir, boot).await;
    assert!(first.service.is_installed(&FeatureId::new("good", "1.0")).await.unwrap());
    // the missing boot feature is logged, not fatal
    assert_eq!(first.service.list_installed_features().await.unwrap().len(), 1);
    drop(first);

    let second = harness(&dir, boot).await;
    assert!(second.service.is_installed(&FeatureId::new("good", "1.0")).await.unwrap());
    assert!(second.service.get_repository(REPO_URI).await.unwrap().is_some());
    assert!(!second
        .bundles
        .calls()
        .await
        .iter()
        .any(|c| matches!(c, BundleCall::Install { .. })));
}

#[tokio::test]
async fn test_repository_install_and_uninstall() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;
    let mut events = h.service.subscribe();

    h.service.add_repository("memory:small", true).await.unwrap();
    let solo = FeatureId::new("solo", "2.0");
    assert!(h.service.is_installed(&solo).await.unwrap());
    assert_eq!(
        events.recv().await.unwrap(),
        FeatureEvent::RepositoryAdded { uri: "memory:small".to_string() }
    );
    assert_eq!(events.recv().await.unwrap(), FeatureEvent::FeatureInstalled { feature: solo.clone() });

    h.service.remove_repository("memory:small", true).await.unwrap();
    assert!(!h.service.is_installed(&solo).await.unwrap());
    assert!(h.service.get_feature("solo", "2.0").await.unwrap().is_none());
    assert_eq!(events.recv().await.unwrap(), FeatureEvent::FeatureUninstalled { feature: solo });
    assert_eq!(
        events.recv().await.unwrap(),
        FeatureEvent::RepositoryRemoved { uri: "memory:small".to_string() }
    );

    // unknown repositories are ignored
    h.service.remove_repository("memory:never-added", false).await.unwrap();
}

#[tokio::test]
async fn test_blacklisted_repository_and_feature() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |config| {
        config.blacklist = vec!["memory:small;type=repository".to_string(), "f1/[0.2,1.0)".to_string()];
    })
    .await;

    let err = h.service.add_repository("memory:small", false).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Blacklisted(uri) if uri == "memory:small"));

    assert_eq!(h.service.get_feature("f1", "0.0.0").await.unwrap().unwrap().version(), "0.1");
    let err = h.service.install_feature("f1", "0.2", InstallOptions::new()).await.unwrap_err();
    assert!(matches!(err, ProvisionError::FeatureNotFound { .. }));
}

#[tokio::test]
async fn test_failed_reload_keeps_repository() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;
    let features_before = h.service.list_features().await.unwrap().len();

    assert!(h.service.add_repository("memory:unknown", false).await.is_err());
    h.service.add_repository(REPO_URI, false).await.unwrap();
    assert_eq!(h.service.list_features().await.unwrap().len(), features_before);
    assert_eq!(h.service.list_repositories().await.unwrap().len(), 1);
}
