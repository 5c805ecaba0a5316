//! Immutable model of a feature descriptor entry.
//!
//! Features are built once while a repository is loaded (through
//! [`FeatureBuilder`] or deserialized from a JSON descriptor) and never change
//! afterwards; the service shares them behind `Arc`.

use std::fmt;
use std::str::FromStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, ProvisionResult};
use crate::properties::Properties;
use crate::version::{Version, VersionRange, DEFAULT_VERSION};

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

/// Name and version of a feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId {
    name: String,
    #[serde(default = "default_version")]
    version: String,
}

impl FeatureId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            name: name.into(),
            version: if version.trim().is_empty() { default_version() } else { version },
        }
    }

    /// Id with the default version, meaning "highest available"
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_VERSION)
    }

    /// Parse `name` or `name/version`
    pub fn parse(id: &str) -> Self {
        match id.split_once('/') {
            Some((name, version)) => Self::new(name.trim(), version.trim()),
            None => Self::named(id.trim()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn has_default_version(&self) -> bool {
        self.version == DEFAULT_VERSION
    }

    /// Version constraint this id selects; a bare version selects exactly itself
    pub fn version_range(&self) -> ProvisionResult<VersionRange> {
        if self.has_default_version() {
            return Ok(VersionRange::any());
        }
        VersionRange::parse_exact(&self.version)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_default_version() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.name, self.version)
        }
    }
}

impl FromStr for FeatureId {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ProvisionError::format("Empty feature id"));
        }
        Ok(Self::parse(s))
    }
}

/// A bundle referenced by a feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BundleInfo {
    pub location: String,
    /// `0` means "use the feature's start level"
    #[serde(default)]
    pub start_level: u32,
    #[serde(default = "default_true")]
    pub start: bool,
    /// Bundle only needed to satisfy other bundles
    #[serde(default)]
    pub dependency: bool,
}

impl BundleInfo {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            start_level: 0,
            start: true,
            dependency: false,
        }
    }

    pub fn with_start_level(mut self, start_level: u32) -> Self {
        self.start_level = start_level;
        self
    }

    pub fn with_start(mut self, start: bool) -> Self {
        self.start = start;
        self
    }

    /// Start level to apply, falling back to the owning feature's level
    pub fn effective_start_level(&self, feature_start_level: u32) -> u32 {
        if self.start_level > 0 {
            self.start_level
        } else {
            feature_start_level
        }
    }
}

/// Reference from one feature to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Exact version, range, or the default version for "highest available"
    #[serde(default = "default_version")]
    pub version: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let id = FeatureId::new(name, version);
        Self {
            name: id.name,
            version: id.version,
        }
    }

    pub fn as_feature_id(&self) -> FeatureId {
        FeatureId::new(self.name.clone(), self.version.clone())
    }
}

/// Configuration pushed to the configuration admin when a feature installs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    /// Pid, or `factoryPid-alias` / `factoryPid~alias` for factory configurations
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
    /// Merge onto an existing configuration instead of leaving it untouched
    #[serde(default)]
    pub append: bool,
    /// Recreate the configuration even when it already exists
    #[serde(default, rename = "override")]
    pub override_existing: bool,
}

impl ConfigInfo {
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self {
            name: name.into(),
            properties,
            append: false,
            override_existing: false,
        }
    }

    pub fn appending(mut self) -> Self {
        self.append = true;
        self
    }

    pub fn overriding(mut self) -> Self {
        self.override_existing = true;
        self
    }
}

/// File copied into the installation directory when a feature installs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFileInfo {
    pub location: String,
    pub finalname: String,
    /// Replace an existing target file
    #[serde(default, rename = "override")]
    pub override_existing: bool,
}

/// Block of bundles and dependencies gated on a set of conditions.
///
/// Each condition is either a feature reference (`name` or `name/range`) or a
/// requirement `namespace;attr=value` matched against declared capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Conditional {
    #[serde(default)]
    pub condition: Vec<String>,
    #[serde(default, rename = "bundle")]
    pub bundles: Vec<BundleInfo>,
    #[serde(default, rename = "feature")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, rename = "config")]
    pub configs: Vec<ConfigInfo>,
    #[serde(default, rename = "configfile")]
    pub config_files: Vec<ConfigFileInfo>,
}

impl Conditional {
    /// Identifier derived from the condition list, safe for use in a feature name
    pub fn condition_id(&self) -> String {
        self.condition
            .iter()
            .map(|c| {
                c.chars()
                    .map(|ch| if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' { ch } else { '_' })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Synthetic feature installing this block on behalf of `parent`
    pub fn as_feature(&self, parent: &Feature) -> Feature {
        Feature {
            name: format!("{}-condition-{}", parent.name, self.condition_id()),
            version: parent.version.clone(),
            description: None,
            start_level: parent.start_level,
            region: parent.region.clone(),
            bundles: self.bundles.clone(),
            dependencies: self.dependencies.clone(),
            configs: self.configs.clone(),
            config_files: self.config_files.clone(),
            conditionals: Vec::new(),
            capabilities: Vec::new(),
            requirements: Vec::new(),
        }
    }
}

/// A declared capability such as `osgi.service;objectClass=Foo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub namespace: String,
    pub attributes: IndexMap<String, String>,
}

impl Capability {
    /// Parse `namespace;key=value;key2="value"`
    pub fn parse(raw: &str) -> ProvisionResult<Self> {
        let mut parts = raw.split(';').map(str::trim);
        let namespace = parts
            .next()
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| ProvisionError::format(format!("Capability '{}' has no namespace", raw)))?
            .to_string();

        let mut attributes = IndexMap::new();
        for part in parts.filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ProvisionError::format(format!("Invalid attribute '{}' in '{}'", part, raw)))?;
            let key = key.trim().trim_end_matches(':');
            let key = key.split(':').next().unwrap_or(key).trim();
            attributes.insert(key.to_string(), value.trim().trim_matches('"').to_string());
        }

        Ok(Self { namespace, attributes })
    }

    /// A requirement is met when namespaces match and every required attribute is present and equal
    pub fn satisfies(&self, requirement: &Capability) -> bool {
        self.namespace == requirement.namespace
            && requirement
                .attributes
                .iter()
                .all(|(k, v)| self.attributes.get(k) == Some(v))
    }
}

/// A named, versioned provisioning unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Feature {
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    start_level: u32,
    #[serde(default)]
    region: Option<String>,
    #[serde(default, rename = "bundle")]
    bundles: Vec<BundleInfo>,
    #[serde(default, rename = "feature")]
    dependencies: Vec<Dependency>,
    #[serde(default, rename = "config")]
    configs: Vec<ConfigInfo>,
    #[serde(default, rename = "configfile")]
    config_files: Vec<ConfigFileInfo>,
    #[serde(default, rename = "conditional")]
    conditionals: Vec<Conditional>,
    #[serde(default, rename = "capability")]
    capabilities: Vec<String>,
    #[serde(default, rename = "requirement")]
    requirements: Vec<String>,
}

impl Feature {
    pub fn builder(name: impl Into<String>) -> FeatureBuilder {
        FeatureBuilder::new(name)
    }

    pub fn id(&self) -> FeatureId {
        FeatureId::new(self.name.clone(), self.version.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Version parsed for ordering; unparseable versions sort as `0.0.0`
    pub fn parsed_version(&self) -> Version {
        Version::parse_lenient(&self.version).unwrap_or_default()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn start_level(&self) -> u32 {
        self.start_level
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn bundles(&self) -> &[BundleInfo] {
        &self.bundles
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn configs(&self) -> &[ConfigInfo] {
        &self.configs
    }

    pub fn config_files(&self) -> &[ConfigFileInfo] {
        &self.config_files
    }

    pub fn conditionals(&self) -> &[Conditional] {
        &self.conditionals
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }

    /// Parsed capabilities, skipping entries that fail to parse
    pub fn parsed_capabilities(&self) -> Vec<Capability> {
        self.capabilities
            .iter()
            .filter_map(|c| Capability::parse(c).ok())
            .collect()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Builder for [`Feature`]
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    feature: Feature,
}

impl FeatureBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            feature: Feature {
                name: name.into(),
                version: default_version(),
                description: None,
                start_level: 0,
                region: None,
                bundles: Vec::new(),
                dependencies: Vec::new(),
                configs: Vec::new(),
                config_files: Vec::new(),
                conditionals: Vec::new(),
                capabilities: Vec::new(),
                requirements: Vec::new(),
            },
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        if !version.trim().is_empty() {
            self.feature.version = version;
        }
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.feature.description = Some(description.into());
        self
    }

    pub fn start_level(mut self, start_level: u32) -> Self {
        self.feature.start_level = start_level;
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.feature.region = Some(region.into());
        self
    }

    pub fn bundle(mut self, bundle: BundleInfo) -> Self {
        self.feature.bundles.push(bundle);
        self
    }

    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.feature.dependencies.push(dependency);
        self
    }

    pub fn config(mut self, config: ConfigInfo) -> Self {
        self.feature.configs.push(config);
        self
    }

    pub fn config_file(mut self, config_file: ConfigFileInfo) -> Self {
        self.feature.config_files.push(config_file);
        self
    }

    pub fn conditional(mut self, conditional: Conditional) -> Self {
        self.feature.conditionals.push(conditional);
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.feature.capabilities.push(capability.into());
        self
    }

    pub fn requirement(mut self, requirement: impl Into<String>) -> Self {
        self.feature.requirements.push(requirement.into());
        self
    }

    pub fn build(self) -> ProvisionResult<Feature> {
        if self.feature.name.trim().is_empty() {
            return Err(ProvisionError::format("Feature name must not be empty"));
        }
        Ok(self.feature)
    }
}
