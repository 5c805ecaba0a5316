//! Immutable profile values.
//!
//! A profile is a bag of named files. Files ending in [`PROPERTIES_SUFFIX`]
//! are configurations keyed by pid; the [`INTERNAL_PID`] configuration holds
//! the profile's own metadata (parents, attributes, bundle and feature lists).

use std::collections::BTreeMap;
use std::fmt;
use indexmap::IndexMap;

use provision_core::properties::Properties;

use crate::builder::ProfileBuilder;

/// Suffix of files holding a pid configuration
pub const PROPERTIES_SUFFIX: &str = ".cfg";
/// Pid of the profile's own metadata
pub const INTERNAL_PID: &str = "profile";
/// Space separated parent ids inside [`INTERNAL_PID`]
pub const PARENTS: &str = "parents";
pub const ATTRIBUTE_PREFIX: &str = "attribute.";
pub const OVERLAY: &str = "overlay";
/// Value removing a key while merging, or as a key, clearing the inherited file
pub const DELETED: &str = "#deleted#";

pub const BUNDLE_PREFIX: &str = "bundle.";
pub const FEATURE_PREFIX: &str = "feature.";
pub const REPOSITORY_PREFIX: &str = "repository.";
pub const OVERRIDE_PREFIX: &str = "override.";
pub const OPTIONAL_PREFIX: &str = "optional.";

/// Kinds of lists kept in the internal pid under a key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigListType {
    Bundles,
    Features,
    Repositories,
    Overrides,
    Optionals,
}

impl ConfigListType {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Bundles => BUNDLE_PREFIX,
            Self::Features => FEATURE_PREFIX,
            Self::Repositories => REPOSITORY_PREFIX,
            Self::Overrides => OVERRIDE_PREFIX,
            Self::Optionals => OPTIONAL_PREFIX,
        }
    }
}

/// An immutable profile. Equality covers the id and the file contents.
#[derive(Debug, Clone)]
pub struct Profile {
    pub(crate) id: String,
    pub(crate) parents: Vec<String>,
    pub(crate) files: BTreeMap<String, Vec<u8>>,
    pub(crate) configurations: BTreeMap<String, Properties>,
    pub(crate) overlay: bool,
}

impl Profile {
    pub fn builder(id: impl Into<String>) -> ProfileBuilder {
        ProfileBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_ids(&self) -> &[String] {
        &self.parents
    }

    /// Whether parent configuration has already been merged in
    pub fn is_overlay(&self) -> bool {
        self.overlay
    }

    pub fn file_configurations(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    pub fn file_configuration(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Parsed `.cfg` files keyed by pid
    pub fn configurations(&self) -> &BTreeMap<String, Properties> {
        &self.configurations
    }

    pub fn configuration(&self, pid: &str) -> Option<&Properties> {
        self.configurations.get(pid)
    }

    /// `attribute.*` entries of the internal pid, without the prefix
    pub fn attributes(&self) -> IndexMap<String, String> {
        self.internal()
            .map(|props| {
                props
                    .iter()
                    .filter_map(|(k, v)| k.strip_prefix(ATTRIBUTE_PREFIX).map(|name| (name.to_string(), v.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn bundles(&self) -> Vec<String> {
        self.list(ConfigListType::Bundles)
    }

    pub fn features(&self) -> Vec<String> {
        self.list(ConfigListType::Features)
    }

    pub fn repositories(&self) -> Vec<String> {
        self.list(ConfigListType::Repositories)
    }

    pub fn overrides(&self) -> Vec<String> {
        self.list(ConfigListType::Overrides)
    }

    pub fn optionals(&self) -> Vec<String> {
        self.list(ConfigListType::Optionals)
    }

    fn internal(&self) -> Option<&Properties> {
        self.configurations.get(INTERNAL_PID)
    }

    fn list(&self, kind: ConfigListType) -> Vec<String> {
        self.internal()
            .map(|props| {
                props
                    .iter()
                    .filter(|(k, _)| k.starts_with(kind.prefix()))
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl PartialEq for Profile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.files == other.files
    }
}

impl Eq for Profile {}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Profile[id={}, attrs={:?}]", self.id, self.attributes())
    }
}
