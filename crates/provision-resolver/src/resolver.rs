use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::feature::{BundleInfo, Capability, Conditional, Feature, FeatureId};

use crate::blacklist::Blacklist;
use crate::index::FeatureIndex;

/// Prefix marking a condition as a capability requirement rather than a feature reference
pub const REQUIREMENT_PREFIX: &str = "req:";

/// One feature to install, with the bundles that survived the blacklist
#[derive(Debug, Clone)]
pub struct PlannedFeature {
    pub feature: Arc<Feature>,
    pub bundles: Vec<BundleInfo>,
    /// Set when this is the synthetic feature of a satisfied conditional
    pub conditional_of: Option<FeatureId>,
}

impl PlannedFeature {
    pub fn id(&self) -> FeatureId {
        self.feature.id()
    }
}

/// Ordered installation plan. Dependencies come before their dependents.
#[derive(Debug, Clone)]
pub struct InstallationPlan {
    requested: FeatureId,
    features: Vec<PlannedFeature>,
}

impl InstallationPlan {
    /// The id the plan was requested for
    pub fn requested(&self) -> &FeatureId {
        &self.requested
    }

    pub fn features(&self) -> &[PlannedFeature] {
        &self.features
    }

    pub fn feature_ids(&self) -> Vec<FeatureId> {
        self.features.iter().map(PlannedFeature::id).collect()
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.features.iter().any(|p| &p.id() == id)
    }

    /// Every planned bundle in install order
    pub fn bundles(&self) -> impl Iterator<Item = (&PlannedFeature, &BundleInfo)> {
        self.features
            .iter()
            .flat_map(|p| p.bundles.iter().map(move |b| (p, b)))
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Walks feature dependencies and conditionals into an [`InstallationPlan`]
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    index: &'a FeatureIndex,
    blacklist: &'a Blacklist,
}

struct Walk {
    visited: HashSet<FeatureId>,
    planned: Vec<PlannedFeature>,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a FeatureIndex, blacklist: &'a Blacklist) -> Self {
        Self { index, blacklist }
    }

    /// Resolve `id` against the index.
    ///
    /// `installed` are the features already present; they satisfy conditions
    /// and their own conditionals are re-evaluated against the new plan.
    pub fn resolve(&self, id: &FeatureId, installed: &[Arc<Feature>]) -> ProvisionResult<InstallationPlan> {
        let root = self
            .index
            .get_by_id(id)?
            .ok_or_else(|| ProvisionError::feature_not_found(id.name(), id.version()))?;

        let mut walk = Walk {
            visited: HashSet::new(),
            planned: Vec::new(),
        };
        self.visit(&mut walk, root, None)?;
        self.add_conditionals(&mut walk, installed)?;

        debug!(
            feature = %id,
            planned = walk.planned.len(),
            "resolved installation plan"
        );
        Ok(InstallationPlan {
            requested: id.clone(),
            features: walk.planned,
        })
    }

    fn visit(&self, walk: &mut Walk, feature: Arc<Feature>, conditional_of: Option<FeatureId>) -> ProvisionResult<()> {
        if !walk.visited.insert(feature.id()) {
            debug!(feature = %feature, "feature is already being installed");
            return Ok(());
        }

        for dependency in feature.dependencies() {
            let resolved = self
                .index
                .get(&dependency.name, &dependency.version)?
                .ok_or_else(|| ProvisionError::feature_not_found(&dependency.name, &dependency.version))?;
            self.visit(walk, resolved, None)?;
        }

        let bundles = feature
            .bundles()
            .iter()
            .filter(|bundle| {
                let blacklisted = self.blacklist.is_bundle_blacklisted(&bundle.location);
                if blacklisted {
                    warn!(bundle = %bundle.location, feature = %feature, "skipping blacklisted bundle");
                }
                !blacklisted
            })
            .cloned()
            .collect();

        walk.planned.push(PlannedFeature {
            feature,
            bundles,
            conditional_of,
        });
        Ok(())
    }

    fn add_conditionals(&self, walk: &mut Walk, installed: &[Arc<Feature>]) -> ProvisionResult<()> {
        let installed_ids: HashSet<FeatureId> = installed.iter().map(|f| f.id()).collect();

        loop {
            let available: Vec<Arc<Feature>> = installed
                .iter()
                .cloned()
                .chain(walk.planned.iter().map(|p| Arc::clone(&p.feature)))
                .collect();

            let mut triggered = Vec::new();
            for owner in &available {
                for conditional in owner.conditionals() {
                    let synthetic = conditional.as_feature(owner);
                    let synthetic_id = synthetic.id();
                    if installed_ids.contains(&synthetic_id) || walk.visited.contains(&synthetic_id) {
                        continue;
                    }
                    if is_satisfied(conditional, &available) {
                        triggered.push((Arc::new(synthetic), owner.id()));
                    }
                }
            }

            if triggered.is_empty() {
                return Ok(());
            }
            for (synthetic, owner) in triggered {
                debug!(feature = %synthetic, owner = %owner, "conditional satisfied");
                self.visit(walk, synthetic, Some(owner))?;
            }
        }
    }
}

/// Whether every condition of `conditional` holds against `available`
pub fn is_satisfied(conditional: &Conditional, available: &[Arc<Feature>]) -> bool {
    conditional
        .condition
        .iter()
        .all(|condition| condition_holds(condition, available))
}

fn condition_holds(condition: &str, available: &[Arc<Feature>]) -> bool {
    if let Some(requirement) = condition.strip_prefix(REQUIREMENT_PREFIX) {
        return match Capability::parse(requirement) {
            Ok(requirement) => available
                .iter()
                .flat_map(|f| f.parsed_capabilities())
                .any(|capability| capability.satisfies(&requirement)),
            Err(e) => {
                warn!(condition, error = %e, "ignoring malformed requirement");
                false
            }
        };
    }

    let wanted = FeatureId::parse(condition);
    let range = match wanted.version_range() {
        Ok(range) => range,
        Err(e) => {
            warn!(condition, error = %e, "ignoring malformed condition");
            return false;
        }
    };
    available
        .iter()
        .any(|f| f.name() == wanted.name() && range.contains(&f.parsed_version()))
}
