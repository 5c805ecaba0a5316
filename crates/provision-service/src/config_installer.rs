use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use provision_core::error::ProvisionResult;
use provision_core::feature::{ConfigFileInfo, Feature};
use provision_core::properties::{self, Properties};
use provision_resolver::source::SourceChain;

use crate::config_admin::{ConfigAdmin, ConfigId, CONFIG_KEY};

/// Pushes feature `<config>` blocks to the configuration admin and copies
/// `<configfile>` entries into place.
pub struct FeatureConfigInstaller {
    admin: Arc<dyn ConfigAdmin>,
    storage: Option<PathBuf>,
    base_dir: PathBuf,
    sources: SourceChain,
}

impl FeatureConfigInstaller {
    pub fn new(admin: Arc<dyn ConfigAdmin>, storage: Option<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            admin,
            storage,
            base_dir: base_dir.into(),
            sources: SourceChain::default(),
        }
    }

    /// Replace the chain used to fetch `configfile` locations
    pub fn with_sources(mut self, sources: SourceChain) -> Self {
        self.sources = sources;
        self
    }

    fn storage_file(&self, id: &ConfigId) -> Option<PathBuf> {
        self.storage.as_ref().map(|dir| dir.join(format!("{}.cfg", id.pid)))
    }

    /// Install every configuration and configuration file of `feature`.
    ///
    /// A configuration that does not exist yet is created unless its storage
    /// file is already present. An existing one is left alone unless the
    /// feature asks to append, in which case missing keys are added and the
    /// configuration is only updated when that actually changed something.
    /// An overriding configuration replaces the existing one and its storage file.
    pub async fn install_feature_configs(&self, feature: &Feature) -> ProvisionResult<()> {
        for config in feature.configs() {
            let id = ConfigId::parse(&config.name);
            let existing = self.admin.list_configurations(id.filter()).await?.into_iter().next();

            match existing {
                None => {
                    let storage_file = self.storage_file(&id);
                    if let Some(file) = storage_file.as_ref().filter(|f| f.exists()) {
                        info!(file = %file.display(), "skipping configuration, storage file already exists");
                        continue;
                    }
                    let mut props = config.properties.clone();
                    props.insert(CONFIG_KEY.to_string(), id.pid.clone());
                    let pid = self.admin.create_configuration(id.clone(), props).await?;
                    debug!(pid = %pid, feature = %feature, "created configuration");
                    if let Err(e) = self.update_storage(&id, &config.properties, false).await {
                        warn!(pid = %id.pid, error = %e, "can't update cfg file");
                    }
                }
                Some(current) if config.override_existing => {
                    let mut props = config.properties.clone();
                    props.insert(CONFIG_KEY.to_string(), id.pid.clone());
                    self.admin.update(current.pid.clone(), props).await?;
                    debug!(pid = %current.pid, feature = %feature, "overrode configuration");
                    if let Err(e) = self.update_storage(&id, &config.properties, false).await {
                        warn!(pid = %id.pid, error = %e, "can't update cfg file");
                    }
                }
                Some(current) if config.append => {
                    let mut merged = current.properties.clone();
                    let mut changed = false;
                    for (key, value) in &config.properties {
                        if !merged.contains_key(key) {
                            merged.insert(key.clone(), value.clone());
                            changed = true;
                        }
                    }
                    if !changed {
                        debug!(pid = %current.pid, "configuration already contains appended keys");
                        continue;
                    }
                    self.admin.update(current.pid.clone(), merged).await?;
                    if let Err(e) = self.update_storage(&id, &config.properties, true).await {
                        warn!(pid = %id.pid, error = %e, "can't update cfg file");
                    }
                }
                Some(current) => {
                    debug!(pid = %current.pid, "configuration already exists");
                }
            }
        }

        for config_file in feature.config_files() {
            self.install_configuration_file(config_file).await?;
        }
        Ok(())
    }

    /// Delete the configurations and configuration files `feature` installed
    pub async fn uninstall_feature_configs(&self, feature: &Feature) -> ProvisionResult<()> {
        for config in feature.configs() {
            let id = ConfigId::parse(&config.name);
            for existing in self.admin.list_configurations(id.filter()).await? {
                self.admin.delete(existing.pid).await?;
            }
            if let Some(file) = self.storage_file(&id).filter(|f| f.exists()) {
                tokio::fs::remove_file(&file).await?;
            }
        }

        for config_file in feature.config_files() {
            let target = self.final_path(&config_file.finalname);
            if target.exists() {
                tokio::fs::remove_file(&target).await?;
            }
        }
        Ok(())
    }

    async fn update_storage(&self, id: &ConfigId, props: &Properties, append: bool) -> ProvisionResult<()> {
        let Some(file) = self.storage_file(id) else {
            return Ok(());
        };

        if !file.exists() {
            if let Some(parent) = file.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&file, properties::to_bytes(props)).await?;
            return Ok(());
        }

        let mut stored = properties::from_bytes(&tokio::fs::read(&file).await?)?;
        for (key, value) in props.iter().filter(|(k, _)| !is_internal_key(k)) {
            if !stored.contains_key(key) || !append {
                stored.insert(key.clone(), value.clone());
            }
        }
        if !append {
            stored.retain(|key, _| props.contains_key(key) || is_internal_key(key));
        }
        tokio::fs::write(&file, properties::to_bytes(&stored)).await?;
        Ok(())
    }

    /// Target path for a `configfile` final name.
    ///
    /// A leading `${...}` placeholder is dropped and the rest is resolved under the base directory.
    pub fn final_path(&self, finalname: &str) -> PathBuf {
        let mut name = finalname;
        if name.contains("${") {
            if let Some(end) = name.find('}') {
                name = &name[end + 1..];
            }
        }
        self.base_dir.join(name.trim_start_matches(['/', '\\']))
    }

    async fn install_configuration_file(&self, config_file: &ConfigFileInfo) -> ProvisionResult<()> {
        let target = self.final_path(&config_file.finalname);
        if target.exists() && !config_file.override_existing {
            debug!(file = %target.display(), "configuration file already exists, not overriding it");
            return Ok(());
        }

        let content = self.sources.fetch(&config_file.location).await?;
        write_file(&target, &content).await?;
        info!(file = %target.display(), location = %config_file.location, "installed configuration file");
        Ok(())
    }
}

fn is_internal_key(key: &str) -> bool {
    key == CONFIG_KEY || key == "service.pid" || key == "service.factoryPid"
}

async fn write_file(target: &Path, content: &[u8]) -> ProvisionResult<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, content).await?;
    Ok(())
}

impl std::fmt::Debug for FeatureConfigInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureConfigInstaller")
            .field("storage", &self.storage)
            .field("base_dir", &self.base_dir)
            .finish()
    }
}
