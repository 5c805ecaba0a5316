mod batch_test;
mod config_test;
mod lifecycle_test;
mod uninstall_test;

mod support {
    use std::sync::Arc;
    use provision_core::ServiceConfig;
    use provision_resolver::{MemorySource, RepositoryLoader, SourceChain};
    use provision_service::{FeaturesService, InMemoryBundleManager, MemoryConfigAdmin};
    use tempfile::TempDir;

    pub const REPO_URI: &str = "memory:features";

    pub const REPO: &str = r#"<features name="test" xmlns="http://karaf.apache.org/xmlns/features/v1.3.0">
        <feature name="good" version="1.0"><bundle>mvn:org.example/good/1.0</bundle></feature>
        <feature name="bad" version="1.0">
            <bundle>mvn:org.example/bad-first/1.0</bundle>
            <bundle>zfs:unknown</bundle>
        </feature>
        <feature name="shared" version="1.0"><bundle>mvn:org.example/good/1.0</bundle></feature>
        <feature name="f1" version="0.1"><bundle>mvn:org.example/f1/0.1</bundle></feature>
        <feature name="f1" version="0.2"><bundle>mvn:org.example/f1/0.2</bundle></feature>
        <feature name="configured" version="1.0">
            <config name="org.example.app" append="true">
                port = 8181
            </config>
        </feature>
    </features>"#;

    pub struct Harness {
        pub service: FeaturesService,
        pub bundles: Arc<InMemoryBundleManager>,
        pub admin: Arc<MemoryConfigAdmin>,
    }

    pub async fn loader() -> RepositoryLoader {
        let memory = MemorySource::new();
        memory.insert(REPO_URI, REPO).await;
        memory
            .insert(
                "memory:small",
                r#"<features name="small"><feature name="solo" version="2.0"><bundle>mvn:org.example/solo/2.0</bundle></feature></features>"#,
            )
            .await;
        RepositoryLoader::new(SourceChain::new().with_source(Box::new(memory)))
    }

    /// Service over `dir` with the test repository loaded through `start`
    pub async fn harness(dir: &TempDir, configure: impl FnOnce(&mut ServiceConfig)) -> Harness {
        let mut config = ServiceConfig::with_base_dir(dir.path());
        config.repositories = vec![REPO_URI.to_string()];
        configure(&mut config);

        let bundles = Arc::new(InMemoryBundleManager::new(dir.path().join("data")));
        let admin = Arc::new(MemoryConfigAdmin::new());
        let service = FeaturesService::new(config, bundles.clone(), admin.clone())
            .unwrap()
            .with_loader(loader().await);
        service.start().await.unwrap();
        Harness { service, bundles, admin }
    }
}
