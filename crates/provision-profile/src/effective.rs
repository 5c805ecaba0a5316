//! Placeholder substitution for effective profiles.

use std::collections::BTreeMap;
use regex::{Captures, Regex};

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::properties::{self, Properties};

use crate::builder::ProfileBuilder;
use crate::profile::{Profile, PROPERTIES_SUFFIX};

const PLACEHOLDER_PATTERN: &str = r"\$\{([^{}]+)\}";

/// Resolves the text inside `${...}` placeholders.
///
/// A resolver without a scheme sees every placeholder verbatim. A resolver
/// with a scheme only sees placeholders written `scheme:rest`, and gets `rest`.
pub trait PlaceholderResolver: Send + Sync {
    fn scheme(&self) -> Option<&str>;

    /// Value for `placeholder` found in `key` of `pid`, or `None` to pass
    fn resolve(
        &self,
        configurations: &BTreeMap<String, Properties>,
        pid: &str,
        key: &str,
        placeholder: &str,
    ) -> Option<String>;
}

/// Resolves `${profile:pid/key}` against the profile's own configurations
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfilePlaceholderResolver;

impl PlaceholderResolver for ProfilePlaceholderResolver {
    fn scheme(&self) -> Option<&str> {
        Some("profile")
    }

    fn resolve(
        &self,
        configurations: &BTreeMap<String, Properties>,
        _pid: &str,
        _key: &str,
        placeholder: &str,
    ) -> Option<String> {
        let (pid, key) = placeholder.split_once('/')?;
        configurations.get(pid)?.get(key).cloned()
    }
}

/// Resolvers used when none are given
pub fn default_resolvers() -> Vec<Box<dyn PlaceholderResolver>> {
    vec![Box::new(ProfilePlaceholderResolver)]
}

/// Effective profile of `profile`, with every placeholder in its `.cfg`
/// files substituted in a single pass.
///
/// Resolvers read the original, unsubstituted values. With
/// `final_substitution` an unresolved placeholder becomes the empty string;
/// otherwise it is left as written.
pub fn effective(
    profile: &Profile,
    resolvers: &[Box<dyn PlaceholderResolver>],
    final_substitution: bool,
) -> ProvisionResult<Profile> {
    let pattern =
        Regex::new(PLACEHOLDER_PATTERN).map_err(|e| ProvisionError::format(format!("Invalid placeholder pattern: {}", e)))?;
    let originals = profile.configurations();

    let mut builder = ProfileBuilder::from_profile(profile);
    for (pid, props) in originals {
        let substituted: Properties = props
            .iter()
            .map(|(key, value)| {
                let value = pattern.replace_all(value, |caps: &Captures<'_>| {
                    resolve(resolvers, originals, pid, key, &caps[1]).unwrap_or_else(|| {
                        if final_substitution {
                            String::new()
                        } else {
                            caps[0].to_string()
                        }
                    })
                });
                (key.clone(), value.into_owned())
            })
            .collect();
        builder = builder.add_file_configuration(format!("{}{}", pid, PROPERTIES_SUFFIX), properties::to_bytes(&substituted));
    }
    builder.build()
}

fn resolve(
    resolvers: &[Box<dyn PlaceholderResolver>],
    configurations: &BTreeMap<String, Properties>,
    pid: &str,
    key: &str,
    placeholder: &str,
) -> Option<String> {
    let unscoped = resolvers
        .iter()
        .filter(|r| r.scheme().is_none())
        .find_map(|r| r.resolve(configurations, pid, key, placeholder));
    if unscoped.is_some() {
        return unscoped;
    }

    let (scheme, rest) = placeholder.split_once(':')?;
    resolvers
        .iter()
        .filter(|r| r.scheme() == Some(scheme))
        .find_map(|r| r.resolve(configurations, pid, key, rest))
}
