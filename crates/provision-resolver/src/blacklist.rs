//! Blacklist patterns excluding repositories, features and bundles.
//!
//! A pattern is `target[;type=<kind>][;range=<range>]`. The target is either a
//! maven URI (`mvn:group/artifact/version/type/classifier`, each segment a glob,
//! the version segment optionally a range), any other glob over a location, or
//! for features a `name[/version]` glob. A rule only ever applies to queries of
//! its own kind; rules with an unrecognised kind never blacklist anything.

use std::fmt;
use glob::Pattern;

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::version::{Version, VersionRange};

const TYPE_ATTRIBUTE: &str = "type";
const RANGE_ATTRIBUTE: &str = "range";

/// What a blacklist rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlacklistKind {
    Repository,
    Feature,
    Bundle,
    /// A kind no query uses, e.g. `notRepository`
    Other(String),
}

impl BlacklistKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "repository" => Self::Repository,
            "feature" => Self::Feature,
            "bundle" => Self::Bundle,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for BlacklistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository => write!(f, "repository"),
            Self::Feature => write!(f, "feature"),
            Self::Bundle => write!(f, "bundle"),
            Self::Other(other) => write!(f, "{}", other),
        }
    }
}

#[derive(Debug, Clone)]
enum VersionMatcher {
    Range(VersionRange),
    Glob(Pattern),
}

impl VersionMatcher {
    fn parse(raw: &str) -> ProvisionResult<Self> {
        if raw.starts_with('[') || raw.starts_with('(') {
            Ok(Self::Range(VersionRange::parse(raw)?))
        } else {
            Ok(Self::Glob(glob(raw)?))
        }
    }

    fn matches(&self, version: &str) -> bool {
        match self {
            Self::Range(range) => Version::parse_lenient(version)
                .map(|v| range.contains(&v))
                .unwrap_or(false),
            Self::Glob(pattern) => pattern.matches(version),
        }
    }
}

/// Segments of a `mvn:` location
#[derive(Debug, Clone, PartialEq, Eq)]
struct MavenCoordinates<'a> {
    group: &'a str,
    artifact: &'a str,
    version: &'a str,
    kind: &'a str,
    classifier: &'a str,
}

impl<'a> MavenCoordinates<'a> {
    fn parse(location: &'a str) -> Option<Self> {
        let rest = location.strip_prefix("mvn:")?;
        // Drop any repository prefix (`http://repo!group/artifact/...`)
        let rest = rest.rsplit_once('!').map(|(_, r)| r).unwrap_or(rest);
        let mut segments = rest.split('/');
        Some(Self {
            group: segments.next().filter(|s| !s.is_empty())?,
            artifact: segments.next().unwrap_or(""),
            version: segments.next().unwrap_or(""),
            kind: segments.next().unwrap_or("jar"),
            classifier: segments.next().unwrap_or(""),
        })
    }
}

#[derive(Debug, Clone)]
struct MavenPattern {
    group: Pattern,
    artifact: Option<Pattern>,
    version: Option<VersionMatcher>,
    kind: Option<Pattern>,
    classifier: Option<Pattern>,
}

impl MavenPattern {
    fn parse(raw: &str) -> ProvisionResult<Option<Self>> {
        let Some(coordinates) = MavenCoordinates::parse(raw) else {
            return Ok(None);
        };
        let segments: Vec<&str> = raw
            .strip_prefix("mvn:")
            .unwrap_or(raw)
            .split('/')
            .collect();
        let optional = |idx: usize| -> ProvisionResult<Option<Pattern>> {
            segments.get(idx).map(|s| glob(s)).transpose()
        };

        Ok(Some(Self {
            group: glob(coordinates.group)?,
            artifact: optional(1)?,
            version: segments.get(2).map(|s| VersionMatcher::parse(s)).transpose()?,
            kind: optional(3)?,
            classifier: optional(4)?,
        }))
    }

    fn matches(&self, location: &str) -> bool {
        let Some(coords) = MavenCoordinates::parse(location) else {
            return false;
        };
        self.group.matches(coords.group)
            && self.artifact.as_ref().map_or(true, |p| p.matches(coords.artifact))
            && self.version.as_ref().map_or(true, |v| v.matches(coords.version))
            && self.kind.as_ref().map_or(true, |p| p.matches(coords.kind))
            && self.classifier.as_ref().map_or(true, |p| p.matches(coords.classifier))
    }
}

#[derive(Debug, Clone)]
enum Target {
    Maven(MavenPattern),
    Location(Pattern),
    Feature { name: Pattern, version: Option<VersionMatcher> },
}

#[derive(Debug, Clone)]
struct Rule {
    raw: String,
    kind: BlacklistKind,
    target: Target,
    range: Option<VersionRange>,
}

impl Rule {
    fn parse(raw: &str) -> ProvisionResult<Self> {
        let mut parts = raw.split(';').map(str::trim);
        let target_raw = parts
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProvisionError::config(format!("Empty blacklist pattern '{}'", raw)))?;

        let mut kind = None;
        let mut range = None;
        for attribute in parts.filter(|p| !p.is_empty()) {
            let (key, value) = attribute.split_once('=').ok_or_else(|| {
                ProvisionError::config(format!("Invalid blacklist attribute '{}' in '{}'", attribute, raw))
            })?;
            match key.trim() {
                TYPE_ATTRIBUTE => kind = Some(BlacklistKind::parse(value.trim())),
                RANGE_ATTRIBUTE => range = Some(VersionRange::parse(value.trim().trim_matches('"'))?),
                _ => {}
            }
        }

        let kind = kind.unwrap_or_else(|| {
            if target_raw.contains(':') {
                BlacklistKind::Bundle
            } else {
                BlacklistKind::Feature
            }
        });

        let target = match kind {
            BlacklistKind::Feature => {
                let (name, version) = match target_raw.split_once('/') {
                    Some((name, version)) => (name, Some(VersionMatcher::parse(version)?)),
                    None => (target_raw, None),
                };
                Target::Feature { name: glob(name)?, version }
            }
            _ => match MavenPattern::parse(target_raw)? {
                Some(maven) => Target::Maven(maven),
                None => Target::Location(glob(target_raw)?),
            },
        };

        Ok(Self {
            raw: raw.to_string(),
            kind,
            target,
            range,
        })
    }

    fn matches_location(&self, location: &str) -> bool {
        let target_matches = match &self.target {
            Target::Maven(pattern) => pattern.matches(location),
            Target::Location(pattern) => pattern.matches(location),
            Target::Feature { .. } => false,
        };
        target_matches
            && self.range.as_ref().map_or(true, |range| {
                MavenCoordinates::parse(location)
                    .and_then(|c| Version::parse_lenient(c.version).ok())
                    .map_or(false, |v| range.contains(&v))
            })
    }

    fn matches_feature(&self, name: &str, version: &str) -> bool {
        let Target::Feature { name: pattern, version: matcher } = &self.target else {
            return false;
        };
        pattern.matches(name)
            && matcher.as_ref().map_or(true, |m| m.matches(version))
            && self.range.as_ref().map_or(true, |range| {
                Version::parse_lenient(version).map_or(false, |v| range.contains(&v))
            })
    }
}

fn glob(raw: &str) -> ProvisionResult<Pattern> {
    Pattern::new(raw).map_err(|e| ProvisionError::config(format!("Invalid blacklist glob '{}': {}", raw, e)))
}

/// Compiled set of blacklist rules
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    rules: Vec<Rule>,
}

impl Blacklist {
    /// Compile a list of pattern strings
    pub fn new<I, S>(patterns: I) -> ProvisionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .filter(|p| !p.as_ref().trim().is_empty())
            .map(|p| Rule::parse(p.as_ref().trim()))
            .collect::<ProvisionResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Patterns this blacklist was built from
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.raw.as_str())
    }

    pub fn is_repository_blacklisted(&self, uri: &str) -> bool {
        self.rules
            .iter()
            .any(|r| r.kind == BlacklistKind::Repository && r.matches_location(uri))
    }

    pub fn is_bundle_blacklisted(&self, location: &str) -> bool {
        self.rules
            .iter()
            .any(|r| r.kind == BlacklistKind::Bundle && r.matches_location(location))
    }

    pub fn is_feature_blacklisted(&self, name: &str, version: &str) -> bool {
        self.rules
            .iter()
            .any(|r| r.kind == BlacklistKind::Feature && r.matches_feature(name, version))
    }
}
