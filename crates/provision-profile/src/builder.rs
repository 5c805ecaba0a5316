use std::collections::BTreeMap;
use indexmap::IndexSet;

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::properties::{self, Properties};

use crate::profile::{ConfigListType, Profile, ATTRIBUTE_PREFIX, INTERNAL_PID, OVERLAY, PARENTS, PROPERTIES_SUFFIX};

/// Builds [`Profile`] values. The built profile owns copies of everything.
#[derive(Debug, Clone, Default)]
pub struct ProfileBuilder {
    id: String,
    files: BTreeMap<String, Vec<u8>>,
    overlay: bool,
}

fn config_file(pid: &str) -> String {
    format!("{}{}", pid, PROPERTIES_SUFFIX)
}

impl ProfileBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Start from an existing profile's id and files
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            files: profile.files.clone(),
            overlay: profile.overlay,
        }
    }

    pub fn identity(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parents(&self) -> Vec<String> {
        parse_parents(&self.configuration(INTERNAL_PID))
    }

    pub fn add_parent(self, parent: impl Into<String>) -> Self {
        self.update_parents([parent.into()], false)
    }

    pub fn add_parents<I, S>(self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_parents(parents.into_iter().map(Into::into), false)
    }

    pub fn set_parents<I, S>(self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_parents(parents.into_iter().map(Into::into), true)
    }

    pub fn remove_parent(self, parent: &str) -> Self {
        let remaining: Vec<String> = self.parents().into_iter().filter(|p| p != parent).collect();
        self.update_parents(remaining, true)
    }

    fn update_parents(mut self, parents: impl IntoIterator<Item = String>, clear: bool) -> Self {
        let mut ids: IndexSet<String> = if clear {
            IndexSet::new()
        } else {
            self.parents().into_iter().collect()
        };
        ids.extend(parents);

        let mut config = self.configuration(INTERNAL_PID);
        config.shift_remove(PARENTS);
        if !ids.is_empty() {
            config.insert(PARENTS.to_string(), ids.into_iter().collect::<Vec<_>>().join(" "));
        }
        self.put_configuration(INTERNAL_PID, &config);
        self
    }

    pub fn file_configuration_keys(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn file_configuration(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn set_file_configurations(mut self, files: BTreeMap<String, Vec<u8>>) -> Self {
        self.files = files;
        self
    }

    pub fn add_file_configuration(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(name.into(), data.into());
        self
    }

    pub fn delete_file_configuration(mut self, name: &str) -> Self {
        self.files.remove(name);
        self
    }

    /// Current properties of `pid`; empty when there is no such file
    pub fn configuration(&self, pid: &str) -> Properties {
        self.files
            .get(&config_file(pid))
            .map(|bytes| properties::parse(&String::from_utf8_lossy(bytes)))
            .unwrap_or_default()
    }

    pub fn configuration_keys(&self) -> Vec<String> {
        self.files
            .keys()
            .filter_map(|name| name.strip_suffix(PROPERTIES_SUFFIX))
            .map(str::to_string)
            .collect()
    }

    fn put_configuration(&mut self, pid: &str, config: &Properties) {
        self.files.insert(config_file(pid), properties::to_bytes(config));
    }

    pub fn add_configuration(mut self, pid: &str, config: Properties) -> Self {
        self.put_configuration(pid, &config);
        self
    }

    pub fn add_configuration_value(mut self, pid: &str, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut config = self.configuration(pid);
        config.insert(key.into(), value.into());
        self.put_configuration(pid, &config);
        self
    }

    /// Replace every pid configuration with `configs`
    pub fn set_configurations(mut self, configs: BTreeMap<String, Properties>) -> Self {
        self.files.retain(|name, _| !name.ends_with(PROPERTIES_SUFFIX));
        for (pid, config) in &configs {
            self.put_configuration(pid, config);
        }
        self
    }

    pub fn delete_configuration(mut self, pid: &str) -> Self {
        self.files.remove(&config_file(pid));
        self
    }

    fn set_list(mut self, kind: ConfigListType, values: &[String]) -> Self {
        let mut config = self.configuration(INTERNAL_PID);
        config.retain(|key, _| !key.starts_with(kind.prefix()));
        for value in values {
            config.insert(format!("{}{}", kind.prefix(), value), value.clone());
        }
        self.put_configuration(INTERNAL_PID, &config);
        self
    }

    fn add_to_list(self, kind: ConfigListType, value: &str) -> Self {
        self.add_configuration_value(INTERNAL_PID, format!("{}{}", kind.prefix(), value), value)
    }

    pub fn set_bundles(self, values: &[String]) -> Self {
        self.set_list(ConfigListType::Bundles, values)
    }

    pub fn add_bundle(self, value: &str) -> Self {
        self.add_to_list(ConfigListType::Bundles, value)
    }

    pub fn set_features(self, values: &[String]) -> Self {
        self.set_list(ConfigListType::Features, values)
    }

    pub fn add_feature(self, value: &str) -> Self {
        self.add_to_list(ConfigListType::Features, value)
    }

    pub fn set_repositories(self, values: &[String]) -> Self {
        self.set_list(ConfigListType::Repositories, values)
    }

    pub fn add_repository(self, value: &str) -> Self {
        self.add_to_list(ConfigListType::Repositories, value)
    }

    pub fn set_overrides(self, values: &[String]) -> Self {
        self.set_list(ConfigListType::Overrides, values)
    }

    pub fn set_optionals(self, values: &[String]) -> Self {
        self.set_list(ConfigListType::Optionals, values)
    }

    /// Mark the profile as an overlay, recorded as `attribute.overlay`
    pub fn set_overlay(self, overlay: bool) -> Self {
        let mut builder =
            self.add_configuration_value(INTERNAL_PID, format!("{}{}", ATTRIBUTE_PREFIX, OVERLAY), overlay.to_string());
        builder.overlay = overlay;
        builder
    }

    pub fn add_attribute(self, key: &str, value: impl Into<String>) -> Self {
        self.add_configuration_value(INTERNAL_PID, format!("{}{}", ATTRIBUTE_PREFIX, key), value)
    }

    /// Replace every attribute
    pub fn set_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = self.configuration(INTERNAL_PID);
        config.retain(|key, _| !key.starts_with(ATTRIBUTE_PREFIX));
        for (key, value) in attributes {
            config.insert(format!("{}{}", ATTRIBUTE_PREFIX, key.as_ref()), value.into());
        }
        self.put_configuration(INTERNAL_PID, &config);
        self
    }

    /// Build the profile. Fails when a `.cfg` file is not valid properties text.
    pub fn build(self) -> ProvisionResult<Profile> {
        if self.id.trim().is_empty() {
            return Err(ProvisionError::format("Profile id must not be empty"));
        }

        let mut configurations = BTreeMap::new();
        for (name, bytes) in &self.files {
            if let Some(pid) = name.strip_suffix(PROPERTIES_SUFFIX) {
                let props = properties::from_bytes(bytes).map_err(|e| {
                    ProvisionError::format(format!("Can not load properties for {} in profile {}: {}", name, self.id, e))
                })?;
                configurations.insert(pid.to_string(), props);
            }
        }

        let parents = configurations.get(INTERNAL_PID).map(parse_parents).unwrap_or_default();

        Ok(Profile {
            id: self.id,
            parents,
            files: self.files,
            configurations,
            overlay: self.overlay,
        })
    }
}

fn parse_parents(config: &Properties) -> Vec<String> {
    config
        .get(PARENTS)
        .map(|spec| spec.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
