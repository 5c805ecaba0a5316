use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use provision_core::error::ProvisionResult;
use provision_core::feature::{Feature, FeatureId};
use provision_core::version::{VersionRange, DEFAULT_VERSION};

use crate::blacklist::Blacklist;
use crate::repository::Repository;

/// Name → version lookup over every non-blacklisted feature of a set of
/// repositories. Rebuilt whenever the repository set changes.
#[derive(Debug, Clone, Default)]
pub struct FeatureIndex {
    // Per name, candidates sorted by descending version
    by_name: BTreeMap<String, Vec<Arc<Feature>>>,
}

impl FeatureIndex {
    /// Build the index. The first repository to declare a given name/version wins.
    pub fn build<'a, I>(repositories: I, blacklist: &Blacklist) -> Self
    where
        I: IntoIterator<Item = &'a Repository>,
    {
        let mut by_name: BTreeMap<String, Vec<Arc<Feature>>> = BTreeMap::new();

        for repository in repositories {
            for feature in repository.features() {
                if blacklist.is_feature_blacklisted(feature.name(), feature.version()) {
                    debug!(feature = %feature, repository = repository.uri(), "feature is blacklisted");
                    continue;
                }
                let candidates = by_name.entry(feature.name().to_string()).or_default();
                if candidates.iter().any(|f| f.version() == feature.version()) {
                    continue;
                }
                candidates.push(Arc::clone(feature));
            }
        }

        for candidates in by_name.values_mut() {
            candidates.sort_by(|a, b| b.parsed_version().cmp(&a.parsed_version()));
        }

        Self { by_name }
    }

    /// Look up a feature.
    ///
    /// An exact name/version match wins. The default version selects the
    /// highest available one; anything else is read as a range where a bare
    /// version means exactly that version, and the highest match is returned.
    pub fn get(&self, name: &str, version: &str) -> ProvisionResult<Option<Arc<Feature>>> {
        let Some(candidates) = self.by_name.get(name) else {
            return Ok(None);
        };

        let version = version.trim();
        if let Some(exact) = candidates.iter().find(|f| f.version() == version) {
            return Ok(Some(Arc::clone(exact)));
        }

        if version.is_empty() || version == DEFAULT_VERSION {
            return Ok(candidates.first().cloned());
        }

        let range = VersionRange::parse_exact(version)?;
        Ok(candidates
            .iter()
            .find(|f| range.contains(&f.parsed_version()))
            .cloned())
    }

    pub fn get_by_id(&self, id: &FeatureId) -> ProvisionResult<Option<Arc<Feature>>> {
        self.get(id.name(), id.version())
    }

    /// Every indexed feature, by name then descending version
    pub fn features(&self) -> impl Iterator<Item = &Arc<Feature>> {
        self.by_name.values().flatten()
    }

    /// All versions known for a name, highest first
    pub fn versions(&self, name: &str) -> Vec<String> {
        self.by_name
            .get(name)
            .map(|c| c.iter().map(|f| f.version().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
