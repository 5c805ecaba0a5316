use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, ProvisionResult};
use crate::logging::{LogFormat, LogLevel};

/// Default lock acquisition timeout in seconds
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 25;

fn default_lock_timeout() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("provision"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_profiles_dir() -> PathBuf {
    default_base_dir().join("profiles")
}

/// Configuration for the features and profile services
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Repositories registered on first start
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Comma-separated `name[;version=x]` list installed once at startup
    #[serde(default)]
    pub boot_features: String,
    /// Blacklist patterns for repositories, features and bundles
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// Lock acquisition timeout in seconds
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
    /// Refresh bundles after install and uninstall batches
    #[serde(default = "default_true")]
    pub auto_refresh: bool,
    /// Directory holding `<pid>.cfg` configuration storage files
    #[serde(default)]
    pub config_storage: Option<PathBuf>,
    /// Root under which `configfile` final names are resolved
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Root of the `<id>.profile` tree
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            boot_features: String::new(),
            blacklist: Vec::new(),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            auto_refresh: true,
            config_storage: None,
            base_dir: default_base_dir(),
            profiles_dir: default_profiles_dir(),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServiceConfig {
    /// Configuration rooted at `base_dir`, with profiles and config storage beneath it
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            profiles_dir: base_dir.join("profiles"),
            config_storage: Some(base_dir.join("etc")),
            base_dir,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ProvisionResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> ProvisionResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ProvisionResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to a TOML file
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> ProvisionResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ProvisionResult<()> {
        if self.lock_timeout_secs == 0 {
            return Err(ProvisionError::config("lock_timeout_secs must be greater than zero"));
        }

        if let Some(blank) = self.repositories.iter().find(|r| r.trim().is_empty()) {
            return Err(ProvisionError::config(format!("Blank repository URI '{}'", blank)));
        }

        if self.blacklist.iter().any(|p| p.trim().is_empty()) {
            return Err(ProvisionError::config("Blacklist patterns must not be blank"));
        }

        if self.profiles_dir.as_os_str().is_empty() {
            return Err(ProvisionError::config("profiles_dir must not be empty"));
        }

        Ok(())
    }
}
