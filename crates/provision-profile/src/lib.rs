//! Configuration profiles for Provision.
//!
//! Profiles are immutable bags of files, inherit from parent profiles, and can
//! be flattened ([`overlay`]) and have their placeholders substituted
//! ([`effective`]). [`ProfileService`] stores them in a directory tree.

pub mod builder;
pub mod effective;
pub mod io;
pub mod overlay;
pub mod profile;
pub mod service;

pub use builder::ProfileBuilder;
pub use effective::{default_resolvers, effective, PlaceholderResolver, ProfilePlaceholderResolver};
pub use io::{delete_profile, load_profiles, write_profile};
pub use overlay::overlay;
pub use profile::{ConfigListType, Profile, DELETED, INTERNAL_PID, PROPERTIES_SUFFIX};
pub use service::ProfileService;
