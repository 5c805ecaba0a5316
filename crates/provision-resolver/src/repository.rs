use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::feature::Feature;

use crate::blacklist::Blacklist;
use crate::descriptor::parse_descriptor;
use crate::source::SourceChain;

/// A loaded features descriptor. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    uri: String,
    name: Option<String>,
    features: Vec<Arc<Feature>>,
    repositories: Vec<String>,
    resource_repositories: Vec<String>,
}

impl Repository {
    pub fn new(
        uri: impl Into<String>,
        name: Option<String>,
        features: Vec<Arc<Feature>>,
        repositories: Vec<String>,
        resource_repositories: Vec<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name,
            features,
            repositories,
            resource_repositories,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Features in descriptor order
    pub fn features(&self) -> &[Arc<Feature>] {
        &self.features
    }

    /// URIs of repositories this one references
    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    pub fn resource_repositories(&self) -> &[String] {
        &self.resource_repositories
    }
}

/// Fetches and parses descriptors through a [`SourceChain`]
#[derive(Debug)]
pub struct RepositoryLoader {
    sources: SourceChain,
}

impl Default for RepositoryLoader {
    fn default() -> Self {
        Self::new(SourceChain::default())
    }
}

impl RepositoryLoader {
    pub fn new(sources: SourceChain) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &SourceChain {
        &self.sources
    }

    /// Load a single descriptor
    pub async fn load(&self, uri: &str) -> ProvisionResult<Repository> {
        debug!(uri, "loading features repository");
        let bytes = self.sources.fetch(uri).await.map_err(|e| match e {
            err @ ProvisionError::Load { .. } => err,
            other => ProvisionError::load(uri, other.to_string()),
        })?;
        parse_descriptor(uri, &bytes)
    }

    /// Load `uri` and every repository it references, breadth first.
    ///
    /// URIs in `known` and blacklisted references are skipped. The requested
    /// repository itself is always loaded first.
    pub async fn load_with_references(
        &self,
        uri: &str,
        known: &HashSet<String>,
        blacklist: &Blacklist,
    ) -> ProvisionResult<Vec<Repository>> {
        let mut loaded = Vec::new();
        let mut seen: HashSet<String> = known.clone();
        let mut queue = VecDeque::from([uri.to_string()]);
        seen.insert(uri.to_string());

        while let Some(next) = queue.pop_front() {
            let repository = self.load(&next).await?;
            for reference in repository.repositories() {
                if blacklist.is_repository_blacklisted(reference) {
                    warn!(repository = %reference, "skipping blacklisted repository");
                    continue;
                }
                if seen.insert(reference.clone()) {
                    queue.push_back(reference.clone());
                }
            }
            loaded.push(repository);
        }

        Ok(loaded)
    }
}
