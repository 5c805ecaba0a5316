//! Profile store with an explicit cache.
//!
//! The cache is filled on the first read and dropped by every write, by
//! [`ProfileService::invalidate`] and by [`ProfileService::reload`]. Lock
//! acquisition is bounded by the configured timeout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use provision_core::config::{ServiceConfig, DEFAULT_LOCK_TIMEOUT_SECS};
use provision_core::error::{ProvisionError, ProvisionResult};

use crate::effective::{default_resolvers, effective, PlaceholderResolver};
use crate::io;
use crate::overlay::overlay;
use crate::profile::Profile;

type ProfileMap = Arc<BTreeMap<String, Profile>>;

pub struct ProfileService {
    root: PathBuf,
    cache: RwLock<Option<ProfileMap>>,
    resolvers: Vec<Box<dyn PlaceholderResolver>>,
    lock_timeout: Duration,
}

impl ProfileService {
    /// Service over `config.profiles_dir`
    pub fn new(config: &ServiceConfig) -> ProvisionResult<Self> {
        config.validate()?;
        Ok(Self::with_root(&config.profiles_dir).with_lock_timeout(config.lock_timeout()))
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cache: RwLock::new(None),
            resolvers: default_resolvers(),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Append a resolver used by [`ProfileService::get_effective_profile`]
    pub fn with_resolver(mut self, resolver: Box<dyn PlaceholderResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self) -> ProvisionResult<RwLockReadGuard<'_, Option<ProfileMap>>> {
        tokio::time::timeout(self.lock_timeout, self.cache.read())
            .await
            .map_err(|_| ProvisionError::lock_timeout("read", self.lock_timeout))
    }

    async fn write(&self) -> ProvisionResult<RwLockWriteGuard<'_, Option<ProfileMap>>> {
        tokio::time::timeout(self.lock_timeout, self.cache.write())
            .await
            .map_err(|_| ProvisionError::lock_timeout("write", self.lock_timeout))
    }

    /// Run filesystem work on the blocking pool
    async fn blocking<T, F>(&self, task: &str, f: F) -> ProvisionResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> ProvisionResult<T> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || f(&root))
            .await
            .map_err(|e| ProvisionError::state(format!("Profile {} task failed: {}", task, e)))?
    }

    async fn load(&self) -> ProvisionResult<ProfileMap> {
        let profiles = self.blocking("loading", |root| io::load_profiles(root)).await?;
        debug!(root = %self.root.display(), count = profiles.len(), "loaded profile cache");
        Ok(Arc::new(profiles))
    }

    async fn profiles(&self) -> ProvisionResult<ProfileMap> {
        if let Some(cached) = self.read().await?.as_ref() {
            return Ok(Arc::clone(cached));
        }

        let mut cache = self.write().await?;
        if let Some(cached) = cache.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let loaded = self.load().await?;
        *cache = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    pub async fn get_profiles(&self) -> ProvisionResult<BTreeMap<String, Profile>> {
        Ok(self.profiles().await?.as_ref().clone())
    }

    pub async fn get_profile_ids(&self) -> ProvisionResult<Vec<String>> {
        Ok(self.profiles().await?.keys().cloned().collect())
    }

    pub async fn get_profile(&self, id: &str) -> ProvisionResult<Option<Profile>> {
        Ok(self.profiles().await?.get(id).cloned())
    }

    pub async fn has_profile(&self, id: &str) -> ProvisionResult<bool> {
        Ok(self.profiles().await?.contains_key(id))
    }

    pub async fn get_required_profile(&self, id: &str) -> ProvisionResult<Profile> {
        self.get_profile(id)
            .await?
            .ok_or_else(|| ProvisionError::ProfileNotFound(id.to_string()))
    }

    /// Profile `id` with its ancestors merged in
    pub async fn get_overlay_profile(&self, id: &str, environment: Option<&str>) -> ProvisionResult<Profile> {
        let profiles = self.profiles().await?;
        let profile = profiles
            .get(id)
            .ok_or_else(|| ProvisionError::ProfileNotFound(id.to_string()))?;
        overlay(profile, &profiles, environment)
    }

    /// Overlay of `id` with placeholders substituted by the registered resolvers
    pub async fn get_effective_profile(
        &self,
        id: &str,
        environment: Option<&str>,
        final_substitution: bool,
    ) -> ProvisionResult<Profile> {
        let overlay = self.get_overlay_profile(id, environment).await?;
        effective(&overlay, &self.resolvers, final_substitution)
    }

    /// Persist a new profile. Fails when the id is already taken.
    pub async fn create_profile(&self, profile: &Profile) -> ProvisionResult<()> {
        let mut cache = self.write().await?;
        *cache = None;
        let owned = profile.clone();
        self.blocking("create", move |root| {
            if io::profile_path(root, owned.id()).exists() {
                return Err(ProvisionError::state(format!("Profile {} already exists", owned.id())));
            }
            io::write_profile(root, &owned)
        })
        .await?;
        info!(profile = profile.id(), "created profile");
        Ok(())
    }

    /// Replace the stored content of an existing profile
    pub async fn update_profile(&self, profile: &Profile) -> ProvisionResult<()> {
        let mut cache = self.write().await?;
        *cache = None;
        let owned = profile.clone();
        self.blocking("update", move |root| {
            if !io::profile_path(root, owned.id()).exists() {
                return Err(ProvisionError::ProfileNotFound(owned.id().to_string()));
            }
            io::delete_profile(root, owned.id())?;
            io::write_profile(root, &owned)
        })
        .await?;
        info!(profile = profile.id(), "updated profile");
        Ok(())
    }

    pub async fn delete_profile(&self, id: &str) -> ProvisionResult<()> {
        let mut cache = self.write().await?;
        *cache = None;
        let owned = id.to_string();
        self.blocking("delete", move |root| io::delete_profile(root, &owned)).await?;
        info!(profile = id, "deleted profile");
        Ok(())
    }

    /// Drop the cache; the next read loads from disk
    pub async fn invalidate(&self) -> ProvisionResult<()> {
        *self.write().await? = None;
        Ok(())
    }

    /// Reload the cache from disk now
    pub async fn reload(&self) -> ProvisionResult<()> {
        let mut cache = self.write().await?;
        *cache = Some(self.load().await?);
        Ok(())
    }
}

impl std::fmt::Debug for ProfileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileService")
            .field("root", &self.root)
            .field("resolvers", &self.resolvers.len())
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}
