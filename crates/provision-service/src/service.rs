//! The features service facade.
//!
//! All reads take a shared lock and all mutations an exclusive one; both are
//! acquired with the configured timeout and fail with
//! [`ProvisionError::LockTimeout`] instead of waiting forever.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use indexmap::IndexMap;
use tokio::sync::{broadcast, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn, Instrument};

use provision_core::config::ServiceConfig;
use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::feature::{Feature, FeatureId};
use provision_core::logging::OperationTimer;
use provision_resolver::{Blacklist, FeatureIndex, Repository, RepositoryLoader, Resolver};

use crate::bundle::{BundleId, BundleManager};
use crate::config_admin::ConfigAdmin;
use crate::config_installer::FeatureConfigInstaller;
use crate::events::{FeatureEvent, EVENT_CHANNEL_CAPACITY};
use crate::state::{FeatureState, InstalledFeatureRecord, InstalledFeatures, PersistedState, STATE_FILE};
use crate::transaction::InstallTransaction;

/// Per-call install and uninstall switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstallOption {
    /// Leave bundles of a failed attempt installed
    NoCleanIfFailure,
    /// Keep going with the rest of a batch after a feature fails
    ContinueBatchOnFailure,
    /// Skip the refresh pass after the batch
    NoAutoRefreshBundles,
    /// Log every bundle at info level
    Verbose,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions(BTreeSet<InstallOption>);

impl InstallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, option: InstallOption) -> Self {
        self.0.insert(option);
        self
    }

    pub fn contains(&self, option: InstallOption) -> bool {
        self.0.contains(&option)
    }
}

impl FromIterator<InstallOption> for InstallOptions {
    fn from_iter<I: IntoIterator<Item = InstallOption>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of a batch that did not abort
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Requested features that are now installed
    pub installed: Vec<FeatureId>,
    /// Requested features that failed, with their error
    pub failed: Vec<(FeatureId, ProvisionError)>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct Inner {
    repositories: IndexMap<String, Arc<Repository>>,
    index: FeatureIndex,
    installed: InstalledFeatures,
    boot_features_installed: bool,
}

/// Installs and uninstalls features on top of a [`BundleManager`]
pub struct FeaturesService {
    inner: RwLock<Inner>,
    bundles: Arc<dyn BundleManager>,
    configs: FeatureConfigInstaller,
    loader: RepositoryLoader,
    config: ServiceConfig,
    blacklist: Blacklist,
    events: broadcast::Sender<FeatureEvent>,
    lock_timeout: Duration,
}

impl FeaturesService {
    pub fn new(
        config: ServiceConfig,
        bundles: Arc<dyn BundleManager>,
        admin: Arc<dyn ConfigAdmin>,
    ) -> ProvisionResult<Self> {
        config.validate()?;
        let blacklist = Blacklist::new(&config.blacklist)?;
        let configs = FeatureConfigInstaller::new(admin, config.config_storage.clone(), config.base_dir.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: RwLock::new(Inner::default()),
            bundles,
            configs,
            loader: RepositoryLoader::default(),
            lock_timeout: config.lock_timeout(),
            config,
            blacklist,
            events,
        })
    }

    /// Use `loader` to fetch descriptors
    pub fn with_loader(mut self, loader: RepositoryLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the installer handling feature configurations
    pub fn with_config_installer(mut self, configs: FeatureConfigInstaller) -> Self {
        self.configs = configs;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Stream of feature and repository changes
    pub fn subscribe(&self) -> broadcast::Receiver<FeatureEvent> {
        self.events.subscribe()
    }

    async fn read(&self) -> ProvisionResult<RwLockReadGuard<'_, Inner>> {
        tokio::time::timeout(self.lock_timeout, self.inner.read())
            .await
            .map_err(|_| ProvisionError::lock_timeout("read", self.lock_timeout))
    }

    async fn write(&self) -> ProvisionResult<RwLockWriteGuard<'_, Inner>> {
        tokio::time::timeout(self.lock_timeout, self.inner.write())
            .await
            .map_err(|_| ProvisionError::lock_timeout("write", self.lock_timeout))
    }

    fn emit(&self, event: FeatureEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn save_state(&self, inner: &Inner) {
        let state = PersistedState {
            repositories: inner.repositories.keys().cloned().collect(),
            installed: inner.installed.clone(),
            boot_features_installed: inner.boot_features_installed,
        };
        let path = self.bundles.data_file(STATE_FILE);
        if let Err(e) = state.save(&path).await {
            error!(path = %path.display(), error = %e, "failed to persist features service state");
        }
    }

    fn reindex(&self, inner: &mut Inner) {
        inner.index = FeatureIndex::build(inner.repositories.values().map(Arc::as_ref), &self.blacklist);
    }

    /// Restore persisted state, register configured repositories on first
    /// start and install the boot features once.
    pub async fn start(&self) -> ProvisionResult<()> {
        let boot_features = {
            let mut inner = self.write().await?;
            let path = self.bundles.data_file(STATE_FILE);

            match PersistedState::load(&path).await? {
                Some(state) => {
                    for uri in &state.repositories {
                        match self.loader.load(uri).await {
                            Ok(repository) => {
                                inner.repositories.insert(uri.clone(), Arc::new(repository));
                            }
                            Err(e) => warn!(uri = %uri, error = %e, "unable to reload repository"),
                        }
                    }
                    inner.installed = state.installed;
                    inner.boot_features_installed = state.boot_features_installed;
                }
                None => {
                    for uri in &self.config.repositories {
                        if self.blacklist.is_repository_blacklisted(uri) {
                            warn!(uri = %uri, "skipping blacklisted repository");
                            continue;
                        }
                        let known: HashSet<String> = inner.repositories.keys().cloned().collect();
                        match self.loader.load_with_references(uri, &known, &self.blacklist).await {
                            Ok(loaded) => {
                                for repository in loaded {
                                    inner.repositories.insert(repository.uri().to_string(), Arc::new(repository));
                                }
                            }
                            Err(e) => warn!(uri = %uri, error = %e, "unable to add repository"),
                        }
                    }
                }
            }
            self.reindex(&mut inner);
            self.save_state(&inner).await;
            info!(
                repositories = inner.repositories.len(),
                installed = inner.installed.len(),
                "features service started"
            );

            if inner.boot_features_installed {
                Vec::new()
            } else {
                parse_boot_features(&self.config.boot_features)
            }
        };

        if boot_features.is_empty() {
            return Ok(());
        }

        info!(features = boot_features.len(), "installing boot features");
        let options = InstallOptions::new()
            .with(InstallOption::NoCleanIfFailure)
            .with(InstallOption::ContinueBatchOnFailure);
        let report = self.install_features(boot_features, options).await?;
        for (id, err) in &report.failed {
            error!(feature = %id, error = %err, "error installing boot feature");
        }

        let mut inner = self.write().await?;
        inner.boot_features_installed = true;
        self.save_state(&inner).await;
        Ok(())
    }

    /// Register the repository at `uri` and the repositories it references.
    ///
    /// A URI that is already known is reloaded; if that fails the previous
    /// content stays registered. With `install` every feature of the
    /// repository is installed afterwards.
    pub async fn add_repository(&self, uri: &str, install: bool) -> ProvisionResult<()> {
        if self.blacklist.is_repository_blacklisted(uri) {
            return Err(ProvisionError::Blacklisted(uri.to_string()));
        }

        let to_install = {
            let mut inner = self.write().await?;
            let known: HashSet<String> = inner
                .repositories
                .keys()
                .filter(|known| known.as_str() != uri)
                .cloned()
                .collect();
            let refreshing = inner.repositories.contains_key(uri);

            let loaded = match self.loader.load_with_references(uri, &known, &self.blacklist).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    if refreshing {
                        warn!(uri, error = %e, "repository reload failed, keeping previous content");
                    }
                    return Err(e);
                }
            };

            let mut added = Vec::new();
            for repository in loaded {
                let repository_uri = repository.uri().to_string();
                if inner.repositories.insert(repository_uri.clone(), Arc::new(repository)).is_none() {
                    added.push(repository_uri);
                }
            }
            self.reindex(&mut inner);
            self.save_state(&inner).await;
            info!(uri, refreshed = refreshing, added = added.len(), "added features repository");
            for repository_uri in added {
                self.emit(FeatureEvent::RepositoryAdded { uri: repository_uri });
            }

            if install {
                inner
                    .repositories
                    .get(uri)
                    .map(|r| r.features().iter().map(|f| f.id()).collect::<Vec<_>>())
                    .unwrap_or_default()
            } else {
                Vec::new()
            }
        };

        if !to_install.is_empty() {
            let report = self.install_features(to_install, InstallOptions::new()).await?;
            if let Some((_, err)) = report.failed.into_iter().next() {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Unregister the repository at `uri`; unknown URIs are ignored.
    ///
    /// With `uninstall` its installed features are uninstalled first.
    pub async fn remove_repository(&self, uri: &str, uninstall: bool) -> ProvisionResult<()> {
        if uninstall {
            let installed: Vec<FeatureId> = {
                let inner = self.read().await?;
                match inner.repositories.get(uri) {
                    Some(repository) => repository
                        .features()
                        .iter()
                        .map(|f| f.id())
                        .filter(|id| inner.installed.contains(id))
                        .collect(),
                    None => Vec::new(),
                }
            };
            for id in installed {
                self.uninstall_feature_version(id.name(), id.version()).await?;
            }
        }

        let mut inner = self.write().await?;
        if inner.repositories.shift_remove(uri).is_none() {
            debug!(uri, "repository is not registered");
            return Ok(());
        }
        self.reindex(&mut inner);
        self.save_state(&inner).await;
        info!(uri, "removed features repository");
        self.emit(FeatureEvent::RepositoryRemoved { uri: uri.to_string() });
        Ok(())
    }

    pub async fn list_repositories(&self) -> ProvisionResult<Vec<Arc<Repository>>> {
        Ok(self.read().await?.repositories.values().cloned().collect())
    }

    pub async fn get_repository(&self, uri: &str) -> ProvisionResult<Option<Arc<Repository>>> {
        Ok(self.read().await?.repositories.get(uri).cloned())
    }

    /// Every available, non-blacklisted feature
    pub async fn list_features(&self) -> ProvisionResult<Vec<Arc<Feature>>> {
        Ok(self.read().await?.index.features().cloned().collect())
    }

    /// Look a feature up by name and version, exact version or range.
    ///
    /// `None` when nothing matches; a malformed range is a format error.
    pub async fn get_feature(&self, name: &str, version: &str) -> ProvisionResult<Option<Arc<Feature>>> {
        self.read().await?.index.get(name, version)
    }

    pub async fn list_installed_features(&self) -> ProvisionResult<Vec<Arc<Feature>>> {
        Ok(self.read().await?.installed.features())
    }

    pub async fn is_installed(&self, id: &FeatureId) -> ProvisionResult<bool> {
        Ok(self.read().await?.installed.contains(id))
    }

    /// Bundle ids recorded against an installed feature
    pub async fn installed_bundles(&self, id: &FeatureId) -> ProvisionResult<Option<BTreeSet<BundleId>>> {
        Ok(self.read().await?.installed.get(id).map(|r| r.bundles.clone()))
    }

    pub async fn install_feature(&self, name: &str, version: &str, options: InstallOptions) -> ProvisionResult<()> {
        let report = self.install_features([FeatureId::new(name, version)], options).await?;
        match report.failed.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    /// Install a batch of features in iteration order.
    ///
    /// Without [`InstallOption::ContinueBatchOnFailure`] the first failure
    /// rolls the whole batch back and is returned. Otherwise failures are
    /// collected in the report and the rest of the batch proceeds.
    pub async fn install_features<I>(&self, ids: I, options: InstallOptions) -> ProvisionResult<InstallReport>
    where
        I: IntoIterator<Item = FeatureId>,
    {
        let ids: Vec<FeatureId> = ids.into_iter().collect();
        let description = format!(
            "install {}",
            ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
        let mut tx = InstallTransaction::new(description);
        let span = tx.span();

        async move {
            let timer = OperationTimer::start("install features");
            let mut inner = self.write().await?;
            tx.begin()?;

            let snapshot = inner.installed.clone();
            let mut report = InstallReport::default();

            for id in ids {
                match self.install_one(&mut inner, &mut tx, &id, &options).await {
                    Ok(()) => report.installed.push(id),
                    Err(err) => {
                        if options.contains(InstallOption::ContinueBatchOnFailure) {
                            warn!(feature = %id, error = %err, "feature installation failed, continuing batch");
                            let rollback = if options.contains(InstallOption::NoCleanIfFailure) {
                                BTreeSet::new()
                            } else {
                                tx.pending_new_bundles()
                            };
                            self.rollback(&rollback).await;
                            tx.discard_pending();
                            report.failed.push((id, err));
                            continue;
                        }

                        error!(feature = %id, error = %err, "feature installation failed, aborting batch");
                        let rollback = if options.contains(InstallOption::NoCleanIfFailure) {
                            BTreeSet::new()
                        } else {
                            for committed in tx.installed_features() {
                                if let Some(record) = inner.installed.get(&committed) {
                                    if let Err(e) = self.configs.uninstall_feature_configs(&record.feature).await {
                                        warn!(feature = %committed, error = %e, "unable to remove configurations");
                                    }
                                }
                            }
                            tx.all_new_bundles()
                        };
                        self.rollback(&rollback).await;
                        inner.installed = snapshot;
                        tx.fail(err.to_string());
                        tx.rolled_back();
                        return Err(err);
                    }
                }
            }

            tx.commit();
            self.save_state(&inner).await;
            for id in tx.installed_features() {
                self.emit(FeatureEvent::FeatureInstalled { feature: id });
            }

            let refresh = tx.committed_new_bundles();
            if self.should_refresh(&options) && !refresh.is_empty() {
                self.bundles.refresh(&refresh).await?;
            }
            for id in tx.bundles_to_start() {
                if let Err(e) = self.bundles.start(id).await {
                    warn!(bundle = id, error = %e, "unable to start bundle");
                }
            }

            timer.finish();
            Ok(report)
        }
        .instrument(span)
        .await
    }

    fn should_refresh(&self, options: &InstallOptions) -> bool {
        self.config.auto_refresh && !options.contains(InstallOption::NoAutoRefreshBundles)
    }

    async fn rollback(&self, ids: &BTreeSet<BundleId>) {
        debug!(bundles = ?ids, "rolling back bundles");
        if let Err(e) = self.bundles.uninstall_by_id(ids).await {
            error!(error = %e, "rollback failed");
        }
    }

    async fn install_one(
        &self,
        inner: &mut Inner,
        tx: &mut InstallTransaction,
        id: &FeatureId,
        options: &InstallOptions,
    ) -> ProvisionResult<()> {
        let plan = Resolver::new(&inner.index, &self.blacklist).resolve(id, &inner.installed.features())?;
        let verbose = options.contains(InstallOption::Verbose);

        let mut attempt = Vec::new();
        for planned in plan.features() {
            let feature_id = planned.id();
            if inner.installed.contains(&feature_id) {
                debug!(feature = %feature_id, "feature is already installed");
                continue;
            }
            tx.transition(&feature_id, FeatureState::Installing)?;

            let mut bundle_ids = BTreeSet::new();
            for bundle in &planned.bundles {
                let start_level = bundle.effective_start_level(planned.feature.start_level());
                let installed = self
                    .bundles
                    .install_bundle_if_needed(&bundle.location, start_level, None)
                    .await?;
                if verbose {
                    info!(feature = %feature_id, bundle = %bundle.location, id = installed.bundle.id, "installing bundle");
                } else {
                    debug!(feature = %feature_id, bundle = %bundle.location, id = installed.bundle.id, "installing bundle");
                }
                bundle_ids.insert(installed.bundle.id);
                if installed.newly_installed {
                    tx.record_new_bundle(&feature_id, installed.bundle.id, bundle.start);
                }
            }
            attempt.push((planned, bundle_ids));
        }

        for (planned, _) in &attempt {
            self.configs.install_feature_configs(&planned.feature).await?;
        }

        for (planned, bundle_ids) in attempt {
            let feature_id = planned.id();
            tx.transition(&feature_id, FeatureState::Installed)?;
            let mut record = InstalledFeatureRecord::new(Arc::clone(&planned.feature), bundle_ids);
            record.conditional_of = planned.conditional_of.clone();
            inner.installed.insert(record);
            info!(feature = %feature_id, "installed feature");
        }
        Ok(())
    }

    /// Uninstall the only installed version of `name`
    pub async fn uninstall_feature(&self, name: &str) -> ProvisionResult<()> {
        self.uninstall_feature_with_options(name, None, InstallOptions::new()).await
    }

    pub async fn uninstall_feature_version(&self, name: &str, version: &str) -> ProvisionResult<()> {
        self.uninstall_feature_with_options(name, Some(version), InstallOptions::new())
            .await
    }

    /// Uninstall a feature and its conditionals.
    ///
    /// Without a version exactly one version of `name` must be installed.
    /// Bundles still recorded against another installed feature are kept.
    pub async fn uninstall_feature_with_options(
        &self,
        name: &str,
        version: Option<&str>,
        options: InstallOptions,
    ) -> ProvisionResult<()> {
        let timer = OperationTimer::start("uninstall feature");
        let mut inner = self.write().await?;

        let id = match version.map(|v| FeatureId::new(name, v)) {
            Some(id) if inner.installed.contains(&id) => id,
            Some(id) if !id.has_default_version() => {
                return Err(ProvisionError::AmbiguousOrMissingFeature(format!(
                    "Feature named '{}' with version '{}' is not installed",
                    name,
                    id.version()
                )));
            }
            _ => {
                let versions = inner.installed.versions_of(name);
                match versions.as_slice() {
                    [] => {
                        return Err(ProvisionError::AmbiguousOrMissingFeature(format!(
                            "Feature named '{}' is not installed",
                            name
                        )))
                    }
                    [only] => FeatureId::new(name, only.as_str()),
                    _ => {
                        return Err(ProvisionError::AmbiguousOrMissingFeature(format!(
                            "Feature named '{}' has multiple versions installed ({}). Please specify the version to uninstall.",
                            name,
                            versions.join(", ")
                        )))
                    }
                }
            }
        };

        let mut removed = vec![id.clone()];
        removed.extend(inner.installed.conditionals_of(&id));

        let owned: BTreeSet<BundleId> = removed
            .iter()
            .filter_map(|r| inner.installed.get(r))
            .flat_map(|r| r.bundles.iter().copied())
            .collect();
        let in_use = inner.installed.bundles_in_use(&removed);
        let to_uninstall: BTreeSet<BundleId> = owned.difference(&in_use).copied().collect();

        self.bundles.uninstall_by_id(&to_uninstall).await?;

        for feature_id in &removed {
            if let Some(record) = inner.installed.remove(feature_id) {
                self.configs.uninstall_feature_configs(&record.feature).await?;
                info!(feature = %feature_id, "uninstalled feature");
            }
        }
        self.save_state(&inner).await;
        for feature_id in removed {
            self.emit(FeatureEvent::FeatureUninstalled { feature: feature_id });
        }

        if self.should_refresh(&options) && !to_uninstall.is_empty() {
            self.bundles.refresh(&to_uninstall).await?;
        }
        timer.finish();
        Ok(())
    }
}

impl std::fmt::Debug for FeaturesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeaturesService")
            .field("config", &self.config)
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

/// Parse `name[;version=x]` entries separated by commas
pub fn parse_boot_features(boot_features: &str) -> Vec<FeatureId> {
    boot_features
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.split(';').map(str::trim);
            let name = parts.next().unwrap_or_default();
            let version = parts
                .filter_map(|p| p.split_once('='))
                .find(|(key, _)| key.trim() == "version")
                .map(|(_, v)| v.trim())
                .unwrap_or_default();
            FeatureId::new(name, version)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision_resolver::{MemorySource, SourceChain};
    use tempfile::{tempdir, TempDir};

    use crate::bundle::{BundleCall, InMemoryBundleManager};
    use crate::config_admin::MemoryConfigAdmin;

    const REPO: &str = r#"<features name="test" xmlns="http://karaf.apache.org/xmlns/features/v1.0.0">
        <feature name="f1" version="0.1"><bundle>bundle-0.1</bundle></feature>
        <feature name="f1" version="0.2"><bundle>bundle-0.2</bundle></feature>
        <feature name="f2" version="1.0">
            <feature version="[0.1,0.2)">f1</feature>
            <bundle start="false">bundle-f2</bundle>
        </feature>
    </features>"#;

    async fn service(dir: &TempDir) -> (FeaturesService, Arc<InMemoryBundleManager>) {
        let memory = MemorySource::new();
        memory.insert("memory:repo", REPO.as_bytes().to_vec()).await;
        let loader = RepositoryLoader::new(SourceChain::new().with_source(Box::new(memory)));
        let bundles = Arc::new(InMemoryBundleManager::new(dir.path()));
        let service = FeaturesService::new(
            ServiceConfig::with_base_dir(dir.path()),
            bundles.clone(),
            Arc::new(MemoryConfigAdmin::new()),
        )
        .unwrap()
        .with_loader(loader);
        service.add_repository("memory:repo", false).await.unwrap();
        (service, bundles)
    }

    #[test]
    fn test_parse_boot_features() {
        let ids = parse_boot_features(" a , b;version=1.2 ,, c;start=true;version=[1,2)");
        assert_eq!(
            ids,
            vec![
                FeatureId::named("a"),
                FeatureId::new("b", "1.2"),
                FeatureId::new("c", "[1,2)"),
            ]
        );
    }

    #[tokio::test]
    async fn test_install_resolves_dependency_range() {
        let dir = tempdir().unwrap();
        let (service, bundles) = service(&dir).await;

        service.install_feature("f2", "1.0", InstallOptions::new()).await.unwrap();
        assert!(service.is_installed(&FeatureId::new("f1", "0.1")).await.unwrap());
        assert!(!service.is_installed(&FeatureId::new("f1", "0.2")).await.unwrap());

        let calls = bundles.calls().await;
        assert!(calls.contains(&BundleCall::Refresh(BTreeSet::from([1, 2]))));
        // bundle-f2 is declared start="false"
        assert!(calls.contains(&BundleCall::Start(1)));
        assert!(!calls.contains(&BundleCall::Start(2)));
    }

    #[tokio::test]
    async fn test_uninstall_keeps_shared_bundles() {
        let dir = tempdir().unwrap();
        let (service, bundles) = service(&dir).await;

        service.install_feature("f2", "1.0", InstallOptions::new()).await.unwrap();
        bundles.clear_calls().await;

        // f2 only owns bundle-f2; bundle-0.1 belongs to the f1/0.1 record
        service.uninstall_feature("f2").await.unwrap();
        assert_eq!(bundles.uninstall_calls().await, vec![BTreeSet::from([2])]);

        service.uninstall_feature("f1").await.unwrap();
        assert_eq!(
            bundles.uninstall_calls().await,
            vec![BTreeSet::from([2]), BTreeSet::from([1])]
        );
    }

    #[tokio::test]
    async fn test_no_auto_refresh_skips_refresh() {
        let dir = tempdir().unwrap();
        let (service, bundles) = service(&dir).await;
        let options = InstallOptions::new().with(InstallOption::NoAutoRefreshBundles);

        service.install_feature("f1", "0.2", options).await.unwrap();
        assert!(!bundles
            .calls()
            .await
            .iter()
            .any(|c| matches!(c, BundleCall::Refresh(_))));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let dir = tempdir().unwrap();
        let (service, _) = service(&dir).await;
        let mut events = service.subscribe();

        service.install_feature("f1", "0.1", InstallOptions::new()).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            FeatureEvent::FeatureInstalled {
                feature: FeatureId::new("f1", "0.1")
            }
        );
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = tempdir().unwrap();
        {
            let (service, _) = service(&dir).await;
            service.install_feature("f1", "0.2", InstallOptions::new()).await.unwrap();
        }

        let memory = MemorySource::new();
        memory.insert("memory:repo", REPO.as_bytes().to_vec()).await;
        let restarted = FeaturesService::new(
            ServiceConfig::with_base_dir(dir.path()),
            Arc::new(InMemoryBundleManager::new(dir.path())),
            Arc::new(MemoryConfigAdmin::new()),
        )
        .unwrap()
        .with_loader(RepositoryLoader::new(SourceChain::new().with_source(Box::new(memory))));
        restarted.start().await.unwrap();

        assert!(restarted.is_installed(&FeatureId::new("f1", "0.2")).await.unwrap());
        assert_eq!(restarted.list_repositories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lock_timeout_is_reported() {
        let dir = tempdir().unwrap();
        let mut config = ServiceConfig::with_base_dir(dir.path());
        config.lock_timeout_secs = 1;
        let service = FeaturesService::new(
            config,
            Arc::new(InMemoryBundleManager::new(dir.path())),
            Arc::new(MemoryConfigAdmin::new()),
        )
        .unwrap();

        let _guard = service.inner.write().await;
        let err = service.list_features().await.unwrap_err();
        assert!(matches!(err, ProvisionError::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn test_install_times_out_while_readers_hold_the_lock() {
        let dir = tempdir().unwrap();
        let mut config = ServiceConfig::with_base_dir(dir.path());
        config.lock_timeout_secs = 1;
        let bundles = Arc::new(InMemoryBundleManager::new(dir.path()));
        let service = FeaturesService::new(config, bundles.clone(), Arc::new(MemoryConfigAdmin::new())).unwrap();

        let guard = service.inner.read().await;
        let err = service
            .install_feature("anything", "0.0.0", InstallOptions::new())
            .await
            .unwrap_err();
        match err {
            ProvisionError::LockTimeout { operation, .. } => assert_eq!(operation, "write"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(bundles.calls().await.is_empty());

        drop(guard);
        assert!(service.list_features().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feature_start_level_is_inherited() {
        let dir = tempdir().unwrap();
        let memory = MemorySource::new();
        memory
            .insert(
                "memory:levels",
                br#"<features><feature name="lvl" start-level="40"><bundle>plain</bundle><bundle start-level="10">own</bundle></feature></features>"#.to_vec(),
            )
            .await;
        let bundles = Arc::new(InMemoryBundleManager::new(dir.path()));
        let service = FeaturesService::new(
            ServiceConfig::with_base_dir(dir.path()),
            bundles.clone(),
            Arc::new(MemoryConfigAdmin::new()),
        )
        .unwrap()
        .with_loader(RepositoryLoader::new(SourceChain::new().with_source(Box::new(memory))));
        service.add_repository("memory:levels", true).await.unwrap();

        assert_eq!(bundles.bundle_by_location("plain").await.unwrap().start_level, 40);
        assert_eq!(bundles.bundle_by_location("own").await.unwrap().start_level, 10);
    }
}
