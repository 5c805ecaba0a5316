//! Core types for the Provision feature service.
//!
//! This crate provides the error kinds, version handling, the immutable feature
//! model, the properties codec and the service configuration shared by the rest
//! of the workspace.

pub mod config;
pub mod error;
pub mod feature;
pub mod logging;
pub mod properties;
pub mod version;

// Re-export commonly used types
pub use crate::config::ServiceConfig;
pub use crate::error::{BundleError, ProvisionError, ProvisionResult};
pub use crate::feature::{
    BundleInfo, Capability, ConfigFileInfo, ConfigInfo, Conditional, Dependency, Feature,
    FeatureBuilder, FeatureId,
};
pub use crate::logging::{init_logging, LogFormat, LogLevel, OperationTimer};
pub use crate::properties::Properties;
pub use crate::version::{Version, VersionRange, DEFAULT_VERSION};
