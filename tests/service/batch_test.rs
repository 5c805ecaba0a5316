use std::collections::BTreeSet;
use provision_core::FeatureId;
use provision_service::{BundleCall, InstallOption, InstallOptions};
use tempfile::tempdir;

use crate::support::harness;

fn batch() -> Vec<FeatureId> {
    vec![FeatureId::new("good", "1.0"), FeatureId::new("bad", "1.0")]
}

fn refreshes(calls: Vec<BundleCall>) -> Vec<BTreeSet<u64>> {
    calls
        .into_iter()
        .filter_map(|c| match c {
            BundleCall::Refresh(ids) => Some(ids),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_abort_with_cleanup() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;

    let err = h.service.install_features(batch(), InstallOptions::new()).await.unwrap_err();
    assert!(err.is_installation_error());
    assert!(err.to_string().contains("zfs:unknown"));

    assert_eq!(h.bundles.uninstall_calls().await, vec![BTreeSet::from([1, 2])]);
    assert!(h.service.list_installed_features().await.unwrap().is_empty());
    assert!(h.bundles.bundles().await.is_empty());
    assert!(refreshes(h.bundles.calls().await).is_empty());
}

#[tokio::test]
async fn test_abort_without_cleanup() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;
    let options = InstallOptions::new().with(InstallOption::NoCleanIfFailure);

    assert!(h.service.install_features(batch(), options).await.is_err());

    assert_eq!(h.bundles.uninstall_calls().await, vec![BTreeSet::new()]);
    assert!(h.service.list_installed_features().await.unwrap().is_empty());
    // bundles are left behind
    assert_eq!(h.bundles.bundles().await.len(), 2);
}

#[tokio::test]
async fn test_continue_with_cleanup() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;
    let options = InstallOptions::new().with(InstallOption::ContinueBatchOnFailure);

    let report = h.service.install_features(batch(), options).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.installed, vec![FeatureId::new("good", "1.0")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, FeatureId::new("bad", "1.0"));

    assert_eq!(h.bundles.uninstall_calls().await, vec![BTreeSet::from([2])]);
    assert!(h.service.is_installed(&FeatureId::new("good", "1.0")).await.unwrap());
    assert_eq!(refreshes(h.bundles.calls().await), vec![BTreeSet::from([1])]);
}

#[tokio::test]
async fn test_continue_without_cleanup() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;
    let options: InstallOptions = [InstallOption::ContinueBatchOnFailure, InstallOption::NoCleanIfFailure]
        .into_iter()
        .collect();

    let report = h.service.install_features(batch(), options).await.unwrap();
    assert_eq!(report.installed, vec![FeatureId::new("good", "1.0")]);

    assert_eq!(h.bundles.uninstall_calls().await, vec![BTreeSet::new()]);
    assert_eq!(h.bundles.bundles().await.len(), 2);
    assert!(!h.service.is_installed(&FeatureId::new("bad", "1.0")).await.unwrap());
}

#[tokio::test]
async fn test_resolution_failure_installs_nothing() {
    let dir = tempdir().unwrap();
    let h = harness(&dir, |_| {}).await;

    let ids = vec![FeatureId::new("good", "1.0"), FeatureId::named("missing")];
    let err = h.service.install_features(ids, InstallOptions::new()).await.unwrap_err();
    assert!(!err.is_installation_error());
    assert!(h.service.list_installed_features().await.unwrap().is_empty());
}
