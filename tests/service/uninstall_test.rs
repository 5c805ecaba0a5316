use std::collections::BTreeSet;
use provision_core::{FeatureId, ProvisionError};
use provision_service::{BundleCall, InstallOption, InstallOptions};
use tempfile::tempdir;

use crate::support::harness;

#[tokio::test]
async fn test_uninstall_requires_a_single_version() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;
    h.service.install_feature("f1", "0.1", InstallOptions::new()).await.unwrap();
    h.service.install_feature("f1", "0.2", InstallOptions::new()).await.unwrap();

    let err = h.service.uninstall_feature("f1").await.unwrap_err();
    assert!(matches!(err, ProvisionError::AmbiguousOrMissingFeature(_)));
    assert!(err.to_string().contains("0.1, 0.2"));

    h.service.uninstall_feature_version("f1", "0.1").await.unwrap();
    h.service.uninstall_feature("f1").await.unwrap();

    let err = h.service.uninstall_feature("f1").await.unwrap_err();
    assert!(err.to_string().contains("is not installed"));
}

#[tokio::test]
async fn test_unknown_version_is_reported() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;
    h.service.install_feature("f1", "0.1", InstallOptions::new()).await.unwrap();

    let err = h.service.uninstall_feature_version("f1", "0.2").await.unwrap_err();
    assert!(matches!(err, ProvisionError::AmbiguousOrMissingFeature(_)));
}

#[tokio::test]
async fn test_shared_bundle_gives_empty_uninstall_call() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;
    h.service.install_feature("good", "1.0", InstallOptions::new()).await.unwrap();
    h.service.install_feature("shared", "1.0", InstallOptions::new()).await.unwrap();
    h.bundles.clear_calls().await;

    h.service.uninstall_feature("shared").await.unwrap();
    assert_eq!(h.bundles.uninstall_calls().await, vec![BTreeSet::new()]);
    // nothing was removed, so nothing to refresh
    assert!(!h.bundles.calls().await.iter().any(|c| matches!(c, BundleCall::Refresh(_))));

    h.service.uninstall_feature("good").await.unwrap();
    assert_eq!(h.bundles.uninstall_calls().await, vec![BTreeSet::new(), BTreeSet::from([1])]);
    assert!(h.bundles.bundles().await.is_empty());
}

#[tokio::test]
async fn test_uninstall_refresh_can_be_suppressed() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;
    h.service.install_feature("good", "1.0", InstallOptions::new()).await.unwrap();
    h.bundles.clear_calls().await;

    let options = InstallOptions::new().with(InstallOption::NoAutoRefreshBundles);
    h.service
        .uninstall_feature_with_options("good", None, options)
        .await
        .unwrap();
    assert_eq!(h.bundles.calls().await, vec![BundleCall::UninstallById(BTreeSet::from([1]))]);
    assert!(!h.service.is_installed(&FeatureId::new("good", "1.0")).await.unwrap());
}
