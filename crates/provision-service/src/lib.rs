//! Feature installation service for Provision.
//!
//! [`FeaturesService`] resolves features through `provision-resolver`, drives a
//! [`BundleManager`] to install their bundles, pushes their configurations to a
//! [`ConfigAdmin`] and keeps track of what is installed.

pub mod bundle;
pub mod config_admin;
pub mod config_installer;
pub mod events;
pub mod service;
pub mod state;
pub mod transaction;

pub use bundle::{Bundle, BundleCall, BundleId, BundleManager, InMemoryBundleManager, InstalledBundle};
pub use config_admin::{ConfigAdmin, ConfigFilter, ConfigId, Configuration, MemoryConfigAdmin, CONFIG_KEY};
pub use config_installer::FeatureConfigInstaller;
pub use events::FeatureEvent;
pub use service::{parse_boot_features, FeaturesService, InstallOption, InstallOptions, InstallReport};
pub use state::{FeatureState, InstalledFeatureRecord, InstalledFeatures, PersistedState};
pub use transaction::{InstallTransaction, TransactionStatus};
