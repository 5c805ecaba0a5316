use serde::{Deserialize, Serialize};

use provision_core::feature::FeatureId;

/// Capacity of the broadcast channel returned by `FeaturesService::subscribe`
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notifications published by the features service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeatureEvent {
    FeatureInstalled { feature: FeatureId },
    FeatureUninstalled { feature: FeatureId },
    RepositoryAdded { uri: String },
    RepositoryRemoved { uri: String },
}

impl FeatureEvent {
    pub fn feature(&self) -> Option<&FeatureId> {
        match self {
            Self::FeatureInstalled { feature } | Self::FeatureUninstalled { feature } => Some(feature),
            _ => None,
        }
    }
}
