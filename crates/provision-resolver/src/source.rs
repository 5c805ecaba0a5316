use std::collections::HashMap;
use std::path::PathBuf;
use async_trait::async_trait;
use tokio::sync::RwLock;
use url::Url;

use provision_core::error::{ProvisionError, ProvisionResult};

/// Interface for descriptor sources (local files, in-memory descriptors, ...)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DescriptorSource: Send + Sync + 'static {
    /// Whether this source can fetch the given URI
    fn supports(&self, uri: &str) -> bool;

    /// Fetch the raw descriptor bytes behind a URI
    async fn fetch(&self, uri: &str) -> ProvisionResult<Vec<u8>>;

    /// Get source name
    fn name(&self) -> &str;

    /// Get source priority (lower is higher priority)
    fn priority(&self) -> u32;
}

/// Resolve a `file:` URI or plain path to a filesystem path
pub fn file_path(uri: &str) -> Option<PathBuf> {
    if uri.starts_with("file:") {
        return Url::parse(uri).ok().and_then(|url| url.to_file_path().ok());
    }
    match Url::parse(uri) {
        // Windows drive letters parse as a one-letter scheme
        Ok(url) if url.scheme().len() > 1 => None,
        _ => Some(PathBuf::from(uri)),
    }
}

/// Reads descriptors from the local filesystem
#[derive(Debug, Default, Clone)]
pub struct FileSource;

impl FileSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DescriptorSource for FileSource {
    fn supports(&self, uri: &str) -> bool {
        file_path(uri).is_some()
    }

    async fn fetch(&self, uri: &str) -> ProvisionResult<Vec<u8>> {
        let path = file_path(uri).ok_or_else(|| ProvisionError::load(uri, "not a file URI"))?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| ProvisionError::load(uri, e.to_string()))
    }

    fn name(&self) -> &str {
        "file"
    }

    fn priority(&self) -> u32 {
        100
    }
}

/// Serves descriptors registered in memory, keyed by URI
#[derive(Debug, Default)]
pub struct MemorySource {
    descriptors: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, uri: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.descriptors.write().await.insert(uri.into(), content.into());
    }

    pub async fn remove(&self, uri: &str) -> Option<Vec<u8>> {
        self.descriptors.write().await.remove(uri)
    }
}

#[async_trait]
impl DescriptorSource for MemorySource {
    fn supports(&self, uri: &str) -> bool {
        uri.starts_with("memory:")
    }

    async fn fetch(&self, uri: &str) -> ProvisionResult<Vec<u8>> {
        self.descriptors
            .read()
            .await
            .get(uri)
            .cloned()
            .ok_or_else(|| ProvisionError::load(uri, "no such descriptor"))
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn priority(&self) -> u32 {
        10
    }
}

/// A chain of descriptor sources that are tried in order of priority
pub struct SourceChain {
    sources: Vec<Box<dyn DescriptorSource>>,
}

impl Default for SourceChain {
    fn default() -> Self {
        let mut chain = Self::new();
        chain.add_source(Box::new(FileSource::new()));
        chain
    }
}

impl SourceChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a source to the chain
    pub fn add_source(&mut self, source: Box<dyn DescriptorSource>) {
        // Insert source in order of priority
        let pos = self
            .sources
            .binary_search_by_key(&source.priority(), |s| s.priority())
            .unwrap_or_else(|e| e);
        self.sources.insert(pos, source);
    }

    pub fn with_source(mut self, source: Box<dyn DescriptorSource>) -> Self {
        self.add_source(source);
        self
    }

    /// Get all sources in the chain
    pub fn sources(&self) -> &[Box<dyn DescriptorSource>] {
        &self.sources
    }

    /// Fetch from the first source supporting the URI; later sources are
    /// tried only when an earlier one fails
    pub async fn fetch(&self, uri: &str) -> ProvisionResult<Vec<u8>> {
        let mut last_error = None;

        for source in self.sources.iter().filter(|s| s.supports(uri)) {
            match source.fetch(uri).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::debug!(source = source.name(), uri, error = %e, "descriptor source failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProvisionError::load(uri, "no descriptor source supports this URI")))
    }
}

impl std::fmt::Debug for SourceChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|s| s.name()))
            .finish()
    }
}
