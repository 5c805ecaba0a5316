//! Bundle manager collaborator.
//!
//! The service never touches bundle binaries itself; it asks a
//! [`BundleManager`] to install, uninstall, refresh and start bundles and
//! records the ids it gets back.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use provision_core::error::BundleError;

pub type BundleId = u64;

/// Result type for bundle manager calls
pub type BundleResult<T> = Result<T, BundleError>;

/// An installed bundle as reported by the bundle manager
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    pub location: String,
    pub start_level: u32,
    pub active: bool,
}

/// Outcome of [`BundleManager::install_bundle_if_needed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledBundle {
    pub bundle: Bundle,
    /// False when a bundle with the same location was already installed
    pub newly_installed: bool,
}

/// Interface to the bundle lifecycle layer
#[async_trait]
pub trait BundleManager: Send + Sync + 'static {
    /// Install the bundle at `location` unless it is already installed
    async fn install_bundle_if_needed(
        &self,
        location: &str,
        start_level: u32,
        checksum: Option<&str>,
    ) -> BundleResult<InstalledBundle>;

    /// Uninstall bundles by id. An empty set is a valid no-op call.
    async fn uninstall_by_id(&self, ids: &BTreeSet<BundleId>) -> BundleResult<()>;

    /// Uninstall the given bundles
    async fn uninstall(&self, bundles: &[Bundle]) -> BundleResult<()>;

    /// Refresh wiring of the given bundles in one batch
    async fn refresh(&self, ids: &BTreeSet<BundleId>) -> BundleResult<()>;

    /// Start a bundle
    async fn start(&self, id: BundleId) -> BundleResult<()>;

    /// Per-instance persistent storage location for `name`
    fn data_file(&self, name: &str) -> PathBuf;
}

/// A call observed by [`InMemoryBundleManager`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleCall {
    Install { location: String, start_level: u32, newly_installed: bool },
    UninstallById(BTreeSet<BundleId>),
    Uninstall(Vec<BundleId>),
    Refresh(BTreeSet<BundleId>),
    Start(BundleId),
}

const KNOWN_SCHEMES: &[&str] = &["mvn", "file", "http", "https", "wrap", "blueprint", "war", "memory"];

#[derive(Debug, Default)]
struct Registry {
    next_id: BundleId,
    bundles: BTreeMap<BundleId, Bundle>,
    calls: Vec<BundleCall>,
    failing: BTreeSet<String>,
}

/// Bundle manager keeping bundles in memory and recording every call.
///
/// Locations without a scheme or with a well-known scheme install fine; any
/// other scheme fails with [`BundleError::MalformedLocation`].
#[derive(Debug)]
pub struct InMemoryBundleManager {
    data_dir: PathBuf,
    registry: Mutex<Registry>,
}

impl InMemoryBundleManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            registry: Mutex::new(Registry {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Make installs of `location` fail
    pub async fn fail_on(&self, location: impl Into<String>) {
        self.registry.lock().await.failing.insert(location.into());
    }

    pub async fn calls(&self) -> Vec<BundleCall> {
        self.registry.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.registry.lock().await.calls.clear();
    }

    /// Sets passed to `uninstall_by_id`, in call order
    pub async fn uninstall_calls(&self) -> Vec<BTreeSet<BundleId>> {
        self.registry
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|c| match c {
                BundleCall::UninstallById(ids) => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn bundles(&self) -> Vec<Bundle> {
        self.registry.lock().await.bundles.values().cloned().collect()
    }

    pub async fn bundle_by_location(&self, location: &str) -> Option<Bundle> {
        self.registry
            .lock()
            .await
            .bundles
            .values()
            .find(|b| b.location == location)
            .cloned()
    }
}

#[async_trait]
impl BundleManager for InMemoryBundleManager {
    async fn install_bundle_if_needed(
        &self,
        location: &str,
        start_level: u32,
        _checksum: Option<&str>,
    ) -> BundleResult<InstalledBundle> {
        let mut registry = self.registry.lock().await;

        if let Some(existing) = registry.bundles.values().find(|b| b.location == location).cloned() {
            registry.calls.push(BundleCall::Install {
                location: location.to_string(),
                start_level,
                newly_installed: false,
            });
            return Ok(InstalledBundle {
                bundle: existing,
                newly_installed: false,
            });
        }

        if let Some((scheme, _)) = location.split_once(':') {
            if !KNOWN_SCHEMES.contains(&scheme) {
                return Err(BundleError::MalformedLocation(location.to_string()));
            }
        }
        if registry.failing.contains(location) {
            return Err(BundleError::Install {
                location: location.to_string(),
                reason: "install rejected".to_string(),
            });
        }

        let id = registry.next_id;
        registry.next_id += 1;
        let bundle = Bundle {
            id,
            location: location.to_string(),
            start_level,
            active: false,
        };
        registry.bundles.insert(id, bundle.clone());
        registry.calls.push(BundleCall::Install {
            location: location.to_string(),
            start_level,
            newly_installed: true,
        });
        debug!(id, location, "installed bundle");

        Ok(InstalledBundle {
            bundle,
            newly_installed: true,
        })
    }

    async fn uninstall_by_id(&self, ids: &BTreeSet<BundleId>) -> BundleResult<()> {
        let mut registry = self.registry.lock().await;
        registry.calls.push(BundleCall::UninstallById(ids.clone()));
        for id in ids {
            registry.bundles.remove(id);
        }
        Ok(())
    }

    async fn uninstall(&self, bundles: &[Bundle]) -> BundleResult<()> {
        let mut registry = self.registry.lock().await;
        registry
            .calls
            .push(BundleCall::Uninstall(bundles.iter().map(|b| b.id).collect()));
        for bundle in bundles {
            registry.bundles.remove(&bundle.id);
        }
        Ok(())
    }

    async fn refresh(&self, ids: &BTreeSet<BundleId>) -> BundleResult<()> {
        self.registry.lock().await.calls.push(BundleCall::Refresh(ids.clone()));
        Ok(())
    }

    async fn start(&self, id: BundleId) -> BundleResult<()> {
        let mut registry = self.registry.lock().await;
        registry.calls.push(BundleCall::Start(id));
        match registry.bundles.get_mut(&id) {
            Some(bundle) => {
                bundle.active = true;
                Ok(())
            }
            None => Err(BundleError::Start {
                id,
                reason: "no such bundle".to_string(),
            }),
        }
    }

    fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}
