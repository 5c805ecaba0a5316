//! Descriptor loading and feature resolution for Provision.
//!
//! Descriptors are fetched through a [`SourceChain`], parsed into immutable
//! [`Repository`] values, indexed by name and version in a [`FeatureIndex`]
//! and walked by the [`Resolver`] into an ordered [`InstallationPlan`].

pub mod blacklist;
pub mod descriptor;
pub mod index;
pub mod repository;
pub mod resolver;
pub mod source;

pub use blacklist::{Blacklist, BlacklistKind};
pub use descriptor::parse_descriptor;
pub use index::FeatureIndex;
pub use repository::{Repository, RepositoryLoader};
pub use resolver::{InstallationPlan, PlannedFeature, Resolver};
pub use source::{DescriptorSource, FileSource, MemorySource, SourceChain};
