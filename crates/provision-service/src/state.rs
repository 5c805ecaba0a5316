use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::feature::{Feature, FeatureId};

use crate::bundle::BundleId;

/// File name of the persisted state inside the bundle manager's data area
pub const STATE_FILE: &str = "FeaturesServiceState.json";

/// Lifecycle of one feature instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureState {
    NotInstalled,
    Installing,
    Installed,
    Uninstalling,
}

impl FeatureState {
    pub fn can_transition_to(self, next: FeatureState) -> bool {
        use FeatureState::*;
        matches!(
            (self, next),
            (NotInstalled, Installing)
                | (Installing, Installed)
                | (Installing, NotInstalled)
                | (Installed, Uninstalling)
                | (Uninstalling, NotInstalled)
                | (Uninstalling, Installed)
        )
    }
}

/// Bundles recorded against an installed feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledFeatureRecord {
    pub feature: Arc<Feature>,
    /// Every bundle the feature resolved to, whether or not it installed them
    pub bundles: BTreeSet<BundleId>,
    /// Parent feature when this record is a satisfied conditional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_of: Option<FeatureId>,
    pub installed_at: DateTime<Utc>,
}

impl InstalledFeatureRecord {
    pub fn new(feature: Arc<Feature>, bundles: BTreeSet<BundleId>) -> Self {
        Self {
            feature,
            bundles,
            conditional_of: None,
            installed_at: Utc::now(),
        }
    }

    pub fn id(&self) -> FeatureId {
        self.feature.id()
    }
}

/// Installed feature records keyed by feature id.
///
/// Serialized as a plain list of records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<InstalledFeatureRecord>", into = "Vec<InstalledFeatureRecord>")]
pub struct InstalledFeatures {
    records: BTreeMap<FeatureId, InstalledFeatureRecord>,
}

impl InstalledFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: InstalledFeatureRecord) {
        self.records.insert(record.id(), record);
    }

    pub fn remove(&mut self, id: &FeatureId) -> Option<InstalledFeatureRecord> {
        self.records.remove(id)
    }

    pub fn get(&self, id: &FeatureId) -> Option<&InstalledFeatureRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.records.contains_key(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &InstalledFeatureRecord> {
        self.records.values()
    }

    pub fn features(&self) -> Vec<Arc<Feature>> {
        self.records.values().map(|r| Arc::clone(&r.feature)).collect()
    }

    /// Installed versions of `name`, in version order
    pub fn versions_of(&self, name: &str) -> Vec<String> {
        let mut versions: Vec<_> = self
            .records
            .keys()
            .filter(|id| id.name() == name)
            .map(|id| id.version().to_string())
            .collect();
        versions.sort_by_key(|v| provision_core::version::Version::parse_lenient(v).unwrap_or_default());
        versions
    }

    /// Conditional records attached to `parent`
    pub fn conditionals_of(&self, parent: &FeatureId) -> Vec<FeatureId> {
        self.records
            .values()
            .filter(|r| r.conditional_of.as_ref() == Some(parent))
            .map(InstalledFeatureRecord::id)
            .collect()
    }

    /// Bundle ids referenced by any record other than those in `excluded`
    pub fn bundles_in_use(&self, excluded: &[FeatureId]) -> BTreeSet<BundleId> {
        self.records
            .iter()
            .filter(|(id, _)| !excluded.contains(id))
            .flat_map(|(_, r)| r.bundles.iter().copied())
            .collect()
    }

    /// Every bundle id referenced by any record
    pub fn all_bundles(&self) -> BTreeSet<BundleId> {
        self.bundles_in_use(&[])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<InstalledFeatureRecord>> for InstalledFeatures {
    fn from(records: Vec<InstalledFeatureRecord>) -> Self {
        let mut installed = Self::new();
        for record in records {
            installed.insert(record);
        }
        installed
    }
}

impl From<InstalledFeatures> for Vec<InstalledFeatureRecord> {
    fn from(installed: InstalledFeatures) -> Self {
        installed.records.into_values().collect()
    }
}

/// Service state written to [`STATE_FILE`] after every mutation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PersistedState {
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub installed: InstalledFeatures,
    #[serde(default)]
    pub boot_features_installed: bool,
}

impl PersistedState {
    /// Read state from `path`; a missing file yields `None`
    pub async fn load(path: &Path) -> ProvisionResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = tokio::fs::read(path).await?;
        let state = serde_json::from_slice(&contents)
            .map_err(|e| ProvisionError::state(format!("Unable to read {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "loaded features service state");
        Ok(Some(state))
    }

    pub async fn save(&self, path: &Path) -> ProvisionResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, contents).await?;
        Ok(())
    }
}
