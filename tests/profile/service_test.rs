use std::collections::BTreeMap;
use std::time::Duration;
use provision_core::properties::Properties;
use provision_core::{ProvisionError, ServiceConfig};
use provision_profile::{PlaceholderResolver, Profile, ProfileService};
use tempfile::tempdir;

struct EnvResolver;

impl PlaceholderResolver for EnvResolver {
    fn scheme(&self) -> Option<&str> {
        Some("env")
    }

    fn resolve(&self, _: &BTreeMap<String, Properties>, _: &str, _: &str, placeholder: &str) -> Option<String> {
        (placeholder == "REGION").then(|| "eu-west".to_string())
    }
}

#[tokio::test]
async fn test_service_from_config() {
    let dir = tempdir().unwrap();
    let mut config = ServiceConfig::with_base_dir(dir.path());
    config.lock_timeout_secs = 3;
    let service = ProfileService::new(&config).unwrap();
    assert_eq!(service.root(), dir.path().join("profiles"));

    let profile = Profile::builder("karaf-base").add_feature("ssh").build().unwrap();
    service.create_profile(&profile).await.unwrap();
    assert!(dir.path().join("profiles/karaf/base.profile").is_dir());
    assert_eq!(service.get_profile_ids().await.unwrap(), vec!["karaf-base"]);
}

#[tokio::test]
async fn test_overlay_with_environment_and_custom_resolver() {
    let dir = tempdir().unwrap();
    let service = ProfileService::with_root(dir.path())
        .with_lock_timeout(Duration::from_secs(5))
        .with_resolver(Box::new(EnvResolver));

    let base = Profile::builder("base")
        .add_file_configuration("org.example.cfg", b"region = ${env:REGION}\nmode = prod\n".to_vec())
        .add_file_configuration("org.example.cfg#dev", b"region = local\nmode = dev\n".to_vec())
        .build()
        .unwrap();
    let app = Profile::builder("app").add_parent("base").build().unwrap();
    service.create_profile(&base).await.unwrap();
    service.create_profile(&app).await.unwrap();

    let prod = service.get_effective_profile("app", None, true).await.unwrap();
    assert_eq!(prod.configuration("org.example").unwrap()["region"], "eu-west");

    let dev = service.get_overlay_profile("app", Some("dev")).await.unwrap();
    assert_eq!(dev.configuration("org.example").unwrap()["mode"], "dev");
}

#[tokio::test]
async fn test_missing_parent_is_reported() {
    let dir = tempdir().unwrap();
    let service = ProfileService::with_root(dir.path());
    let orphan = Profile::builder("orphan").add_parent("ghost").build().unwrap();
    service.create_profile(&orphan).await.unwrap();

    let err = service.get_overlay_profile("orphan", None).await.unwrap_err();
    assert!(matches!(err, ProvisionError::ProfileNotFound(id) if id == "ghost"));
    assert!(matches!(
        service.get_required_profile("ghost").await,
        Err(ProvisionError::ProfileNotFound(_))
    ));
}
