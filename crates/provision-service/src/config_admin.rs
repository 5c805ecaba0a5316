use std::collections::BTreeMap;
use std::fmt;
use async_trait::async_trait;
use tokio::sync::Mutex;

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::properties::Properties;

/// Property recording which feature configuration created a configuration
pub const CONFIG_KEY: &str = "org.apache.karaf.features.configKey";

/// Identity of a configuration named in a feature.
///
/// `factory~name` and `factory-alias` denote factory configurations; anything
/// else is a plain pid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigId {
    pub pid: String,
    pub factory_pid: Option<String>,
    /// Only set for the `factory~name` form
    pub name: Option<String>,
}

impl ConfigId {
    pub fn parse(pid: &str) -> Self {
        let split = pid.find('~').or_else(|| pid.find('-'));
        match split {
            Some(n) if n > 0 => Self {
                pid: pid.to_string(),
                factory_pid: Some(pid[..n].to_string()),
                name: pid.contains('~').then(|| pid[n + 1..].to_string()),
            },
            _ => Self {
                pid: pid.to_string(),
                factory_pid: None,
                name: None,
            },
        }
    }

    pub fn is_factory(&self) -> bool {
        self.factory_pid.is_some()
    }

    /// Filter locating an existing configuration for this id
    pub fn filter(&self) -> ConfigFilter {
        if self.is_factory() {
            ConfigFilter::ConfigKey(self.pid.clone())
        } else {
            ConfigFilter::ServicePid(self.pid.clone())
        }
    }
}

/// Lookup filter for [`ConfigAdmin::list_configurations`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigFilter {
    ServicePid(String),
    ConfigKey(String),
}

impl fmt::Display for ConfigFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServicePid(pid) => write!(f, "(service.pid={})", pid),
            Self::ConfigKey(key) => write!(f, "({}={})", CONFIG_KEY, key),
        }
    }
}

/// A configuration held by the configuration admin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub pid: String,
    pub factory_pid: Option<String>,
    pub properties: Properties,
}

/// Interface to the configuration admin
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigAdmin: Send + Sync + 'static {
    /// Configurations matching `filter`
    async fn list_configurations(&self, filter: ConfigFilter) -> ProvisionResult<Vec<Configuration>>;

    /// Create the configuration for `id` with `properties`; returns the pid it was stored under
    async fn create_configuration(&self, id: ConfigId, properties: Properties) -> ProvisionResult<String>;

    /// Replace the properties of an existing configuration
    async fn update(&self, pid: String, properties: Properties) -> ProvisionResult<()>;

    async fn delete(&self, pid: String) -> ProvisionResult<()>;
}

/// Configuration admin storing configurations in memory
#[derive(Debug, Default)]
pub struct MemoryConfigAdmin {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    configurations: BTreeMap<String, Configuration>,
    next_factory_instance: u64,
    updates: u64,
}

impl MemoryConfigAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, pid: &str) -> Option<Configuration> {
        self.state.lock().await.configurations.get(pid).cloned()
    }

    pub async fn configurations(&self) -> Vec<Configuration> {
        self.state.lock().await.configurations.values().cloned().collect()
    }

    /// Number of `create_configuration` and `update` calls so far
    pub async fn update_count(&self) -> u64 {
        self.state.lock().await.updates
    }
}

#[async_trait]
impl ConfigAdmin for MemoryConfigAdmin {
    async fn list_configurations(&self, filter: ConfigFilter) -> ProvisionResult<Vec<Configuration>> {
        let state = self.state.lock().await;
        Ok(state
            .configurations
            .values()
            .filter(|c| match &filter {
                ConfigFilter::ServicePid(pid) => &c.pid == pid,
                ConfigFilter::ConfigKey(key) => c.properties.get(CONFIG_KEY) == Some(key),
            })
            .cloned()
            .collect())
    }

    async fn create_configuration(&self, id: ConfigId, properties: Properties) -> ProvisionResult<String> {
        let mut state = self.state.lock().await;
        let pid = match (&id.factory_pid, &id.name) {
            (Some(factory), Some(name)) => format!("{}~{}", factory, name),
            (Some(factory), None) => {
                state.next_factory_instance += 1;
                format!("{}.{}", factory, state.next_factory_instance)
            }
            (None, _) => id.pid.clone(),
        };
        state.updates += 1;
        state.configurations.insert(
            pid.clone(),
            Configuration {
                pid: pid.clone(),
                factory_pid: id.factory_pid.clone(),
                properties,
            },
        );
        Ok(pid)
    }

    async fn update(&self, pid: String, properties: Properties) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        let configuration = state
            .configurations
            .get_mut(&pid)
            .ok_or_else(|| ProvisionError::config(format!("No configuration with pid {}", pid)))?;
        configuration.properties = properties;
        state.updates += 1;
        Ok(())
    }

    async fn delete(&self, pid: String) -> ProvisionResult<()> {
        self.state.lock().await.configurations.remove(&pid);
        Ok(())
    }
}
