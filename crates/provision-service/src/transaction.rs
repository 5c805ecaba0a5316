use std::collections::{BTreeMap, BTreeSet};
use chrono::{DateTime, Utc};
use tracing::{info_span, warn, Span};
use uuid::Uuid;

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::feature::FeatureId;

use crate::bundle::BundleId;
use crate::state::FeatureState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    InProgress,
    Committed,
    RolledBack,
    Failed(String),
}

/// Bookkeeping for one install batch.
///
/// Tracks the per-feature lifecycle and which bundles each feature attempt
/// newly installed, so a failure can roll back exactly what it added.
#[derive(Debug)]
pub struct InstallTransaction {
    pub id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub status: TransactionStatus,
    states: BTreeMap<FeatureId, FeatureState>,
    newly_installed: BTreeMap<FeatureId, BTreeSet<BundleId>>,
    start_requested: BTreeSet<BundleId>,
    span: Span,
}

impl InstallTransaction {
    pub fn new(description: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        let description = description.into();
        let span = info_span!("transaction", id = %id, description = %description);
        Self {
            id,
            description,
            created_at: Utc::now(),
            status: TransactionStatus::Pending,
            states: BTreeMap::new(),
            newly_installed: BTreeMap::new(),
            start_requested: BTreeSet::new(),
            span,
        }
    }

    /// Span every operation of the transaction should run in
    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn begin(&mut self) -> ProvisionResult<()> {
        match self.status {
            TransactionStatus::Pending => {
                self.status = TransactionStatus::InProgress;
                Ok(())
            }
            _ => Err(ProvisionError::state(format!("Transaction {} is no longer pending", self.id))),
        }
    }

    pub fn state_of(&self, feature: &FeatureId) -> FeatureState {
        self.states.get(feature).copied().unwrap_or(FeatureState::NotInstalled)
    }

    /// Move `feature` to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, feature: &FeatureId, next: FeatureState) -> ProvisionResult<()> {
        let current = self.state_of(feature);
        if !current.can_transition_to(next) {
            return Err(ProvisionError::state(format!(
                "Feature {} cannot move from {:?} to {:?}",
                feature, current, next
            )));
        }
        self.states.insert(feature.clone(), next);
        Ok(())
    }

    /// Record a bundle newly installed for `feature`; `start` asks for it to be started after commit
    pub fn record_new_bundle(&mut self, feature: &FeatureId, bundle: BundleId, start: bool) {
        self.newly_installed.entry(feature.clone()).or_default().insert(bundle);
        if start {
            self.start_requested.insert(bundle);
        }
    }

    /// Bundles newly installed on behalf of `feature`
    pub fn new_bundles_of(&self, feature: &FeatureId) -> BTreeSet<BundleId> {
        self.newly_installed.get(feature).cloned().unwrap_or_default()
    }

    /// Bundles newly installed by features that reached [`FeatureState::Installed`]
    pub fn committed_new_bundles(&self) -> BTreeSet<BundleId> {
        self.newly_installed
            .iter()
            .filter(|(id, _)| self.state_of(id) == FeatureState::Installed)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Bundles newly installed by features still being installed
    pub fn pending_new_bundles(&self) -> BTreeSet<BundleId> {
        self.newly_installed
            .iter()
            .filter(|(id, _)| self.state_of(id) == FeatureState::Installing)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Committed new bundles that should be started
    pub fn bundles_to_start(&self) -> Vec<BundleId> {
        self.committed_new_bundles()
            .intersection(&self.start_requested)
            .copied()
            .collect()
    }

    /// Every bundle newly installed in this transaction
    pub fn all_new_bundles(&self) -> BTreeSet<BundleId> {
        self.newly_installed.values().flatten().copied().collect()
    }

    /// Forget every feature still being installed, after its attempt failed
    pub fn discard_pending(&mut self) -> Vec<FeatureId> {
        let pending: Vec<FeatureId> = self
            .states
            .iter()
            .filter(|(_, state)| **state == FeatureState::Installing)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &pending {
            self.states.insert(id.clone(), FeatureState::NotInstalled);
            if let Some(bundles) = self.newly_installed.remove(id) {
                for bundle in bundles {
                    self.start_requested.remove(&bundle);
                }
            }
        }
        pending
    }

    pub fn installed_features(&self) -> Vec<FeatureId> {
        self.states
            .iter()
            .filter(|(_, state)| **state == FeatureState::Installed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn commit(&mut self) {
        self.status = TransactionStatus::Committed;
    }

    pub fn rolled_back(&mut self) {
        self.status = TransactionStatus::RolledBack;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(parent: &self.span, reason = %reason, "transaction failed");
        self.status = TransactionStatus::Failed(reason);
    }
}
