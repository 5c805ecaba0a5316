//! Provision feature service.
//!
//! Resolves declarative features against their repositories, installs them
//! through a bundle manager with rollback on failure, and computes layered
//! configuration profiles.

pub use provision_core as core;
pub use provision_profile as profile;
pub use provision_resolver as resolver;
pub use provision_service as service;

pub use provision_core::{ProvisionError, ProvisionResult, ServiceConfig};
pub use provision_profile::{Profile, ProfileService};
pub use provision_service::{FeaturesService, InstallOption, InstallOptions};

/// Initialize logging for the entire system from `config`
pub fn init(config: &ServiceConfig) -> ProvisionResult<()> {
    provision_core::init_logging(config.log_level, config.log_format)
}

/// Version of the Provision system
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
