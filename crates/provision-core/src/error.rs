use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors raised by the bundle manager collaborator.
///
/// These are carried through [`ProvisionError::Bundle`] untouched so callers can
/// tell installation-layer failures apart from resolution failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("Malformed bundle location: {0}")]
    MalformedLocation(String),

    #[error("Error installing bundle {location}: {reason}")]
    Install { location: String, reason: String },

    #[error("Error uninstalling bundle {id}: {reason}")]
    Uninstall { id: u64, reason: String },

    #[error("Could not start bundle {id}: {reason}")]
    Start { id: u64, reason: String },

    #[error("Bundle refresh failed: {0}")]
    Refresh(String),
}

/// Error type for provisioning operations
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("No feature named '{name}' with version '{version}' available")]
    FeatureNotFound { name: String, version: String },

    #[error("{0}")]
    AmbiguousOrMissingFeature(String),

    #[error("Unable to validate {uri}: {message}")]
    Validation { uri: String, message: String },

    #[error("Unable to load {uri}: {message}")]
    Load { uri: String, message: String },

    #[error("Format error: {0}")]
    Format(String),

    #[error("Unable to acquire {operation} lock within {timeout:?}")]
    LockTimeout { operation: String, timeout: Duration },

    #[error("Blacklisted: {0}")]
    Blacklisted(String),

    #[error("Unable to find required profile {0}")]
    ProfileNotFound(String),

    #[error("Cycle detected in profile parents: {0}")]
    ProfileCycle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Bundle(#[from] BundleError),
}

impl ProvisionError {
    /// Create a new feature-not-found error
    pub fn feature_not_found(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::FeatureNotFound {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Create a new validation error for a descriptor URI
    pub fn validation(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create a new load error for a descriptor URI
    pub fn load(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create a new format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }

    /// Create a new lock timeout error
    pub fn lock_timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::LockTimeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new state error
    pub fn state<S: Into<String>>(msg: S) -> Self {
        Self::State(msg.into())
    }

    /// Whether this error came from the bundle manager rather than resolution
    pub fn is_installation_error(&self) -> bool {
        matches!(self, Self::Bundle(_))
    }
}

impl From<io::Error> for ProvisionError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ProvisionError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for ProvisionError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
