use std::collections::HashSet;
use provision_core::ProvisionError;
use provision_resolver::{Blacklist, MemorySource, RepositoryLoader, SourceChain};
use tempfile::tempdir;

const MAIN: &str = r#"<features name="main" xmlns="http://karaf.apache.org/xmlns/features/v1.3.0">
    <repository>memory:extra</repository>
    <repository>memory:banned</repository>
    <feature name="web" version="1.0">
        <feature>http</feature>
        <bundle start-level="30">mvn:org.example/web/1.0</bundle>
    </feature>
</features>"#;

const EXTRA: &str = r#"{"name": "extra", "feature": [{"name": "http", "version": "2.0"}]}"#;

#[tokio::test]
async fn test_references_loaded_and_blacklist_respected() {
    let memory = MemorySource::new();
    memory.insert("memory:main", MAIN).await;
    memory.insert("memory:extra", EXTRA).await;
    let loader = RepositoryLoader::new(SourceChain::new().with_source(Box::new(memory)));
    let blacklist = Blacklist::new(["memory:banned;type=repository"]).unwrap();

    let loaded = loader
        .load_with_references("memory:main", &HashSet::new(), &blacklist)
        .await
        .unwrap();
    let uris: Vec<&str> = loaded.iter().map(|r| r.uri()).collect();
    assert_eq!(uris, vec!["memory:main", "memory:extra"]);
    assert_eq!(loaded[1].features()[0].name(), "http");
}

#[tokio::test]
async fn test_missing_file_error_cites_uri() {
    let dir = tempdir().unwrap();
    let uri = format!("file:{}/absent.xml", dir.path().display());

    let err = RepositoryLoader::default().load(&uri).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Load { .. }));
    assert!(err.to_string().contains(&uri));
}

#[tokio::test]
async fn test_invalid_descriptor_is_a_validation_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.xml");
    tokio::fs::write(
        &path,
        r#"<features xmlns="http://karaf.apache.org/xmlns/features/v1.0.0"><featur name="x"/></features>"#,
    )
    .await
    .unwrap();
    let uri = path.display().to_string();

    let err = RepositoryLoader::default().load(&uri).await.unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, ProvisionError::Validation { .. }));
    assert!(msg.contains("Unable to validate"));
    assert!(msg.contains(&uri));
}

#[tokio::test]
async fn test_legacy_descriptor_without_namespace() {
    let memory = MemorySource::new();
    memory
        .insert(
            "memory:legacy",
            r#"<features><feature name="old" version="1.0"><bundle>mvn:org.example/old/1.0</bundle></feature></features>"#,
        )
        .await;
    let loader = RepositoryLoader::new(SourceChain::new().with_source(Box::new(memory)));

    let repository = loader.load("memory:legacy").await.unwrap();
    let feature = &repository.features()[0];
    assert_eq!(feature.id().to_string(), "old/1.0");
    assert_eq!(feature.bundles()[0].location, "mvn:org.example/old/1.0");
}
