use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ProvisionError, ProvisionResult};

/// Version used when a feature or dependency does not declare one
pub const DEFAULT_VERSION: &str = "0.0.0";

/// OSGi-style version: three numeric segments followed by an optional qualifier.
///
/// Missing numeric segments are treated as `0`, so `1.2` and `1.2.0` are equal.
/// The qualifier compares as a plain string and an empty qualifier sorts first.
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq)]
pub struct Version {
    major: u64,
    minor: u64,
    micro: u64,
    qualifier: String,
}

impl Version {
    /// Create a new version
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    /// Create a new version carrying a qualifier
    pub fn with_qualifier(major: u64, minor: u64, micro: u64, qualifier: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: qualifier.into(),
        }
    }

    /// The `0.0.0` version
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a strict `major[.minor[.micro[.qualifier]]]` version string
    pub fn parse(version: &str) -> ProvisionResult<Self> {
        let version = version.trim();
        if version.is_empty() {
            return Err(ProvisionError::format("Empty version string"));
        }

        let mut parts = version.splitn(4, '.');
        let mut numbers = [0u64; 3];
        for slot in numbers.iter_mut() {
            match parts.next() {
                Some(part) => {
                    *slot = part.parse().map_err(|_| {
                        ProvisionError::format(format!("Invalid version '{}': '{}' is not numeric", version, part))
                    })?;
                }
                None => break,
            }
        }

        let qualifier = parts.next().unwrap_or_default().to_string();
        if !qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ProvisionError::format(format!(
                "Invalid version '{}': bad qualifier '{}'",
                version, qualifier
            )));
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            micro: numbers[2],
            qualifier,
        })
    }

    /// Parse a version after normalising common non-OSGi spellings.
    ///
    /// `1.2-SNAPSHOT` becomes `1.2.0.SNAPSHOT` and `1.0.0-beta.2` becomes
    /// `1.0.0.beta_2`. Anything still unparseable is a format error.
    pub fn parse_lenient(version: &str) -> ProvisionResult<Self> {
        let version = version.trim();
        if let Ok(parsed) = Self::parse(version) {
            return Ok(parsed);
        }

        let split = version
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(version.len());
        let (numeric, rest) = version.split_at(split);
        let numeric = numeric.trim_end_matches('.');
        if numeric.is_empty() {
            return Err(ProvisionError::format(format!("Invalid version '{}'", version)));
        }

        let mut segments: Vec<&str> = numeric.split('.').take(3).collect();
        while segments.len() < 3 {
            segments.push("0");
        }
        let qualifier: String = rest
            .trim_start_matches(|c| c == '-' || c == '.' || c == '_')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();

        let cleaned = if qualifier.is_empty() {
            segments.join(".")
        } else {
            format!("{}.{}", segments.join("."), qualifier)
        };
        Self::parse(&cleaned)
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn micro(&self) -> u64 {
        self.micro
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }
}

impl FromStr for Version {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse_lenient(&raw).map_err(serde::de::Error::custom)
    }
}

/// One side of a [`VersionRange`]
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Bound {
    Unbounded,
    Inclusive(Version),
    Exclusive(Version),
}

impl Bound {
    fn version(&self) -> Option<&Version> {
        match self {
            Bound::Unbounded => None,
            Bound::Inclusive(v) | Bound::Exclusive(v) => Some(v),
        }
    }
}

/// Interval of versions such as `[1.0,2.0)`, `(1.0,*]` or a bare `1.0`.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct VersionRange {
    floor: Bound,
    ceiling: Bound,
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl VersionRange {
    /// Range matching every version
    pub fn any() -> Self {
        Self {
            floor: Bound::Unbounded,
            ceiling: Bound::Unbounded,
        }
    }

    /// Range matching exactly one version
    pub fn exact(version: Version) -> Self {
        Self {
            floor: Bound::Inclusive(version.clone()),
            ceiling: Bound::Inclusive(version),
        }
    }

    /// Range matching the given version and everything above it
    pub fn at_least(version: Version) -> Self {
        Self {
            floor: Bound::Inclusive(version),
            ceiling: Bound::Unbounded,
        }
    }

    /// Build a range from explicit bounds, rejecting an inverted interval
    pub fn new(floor: Bound, ceiling: Bound) -> ProvisionResult<Self> {
        if let (Some(min), Some(max)) = (floor.version(), ceiling.version()) {
            if min > max {
                return Err(ProvisionError::format(format!(
                    "Invalid range: lower bound {} is above upper bound {}",
                    min, max
                )));
            }
        }
        Ok(Self { floor, ceiling })
    }

    /// Parse a range. A bare version means "this version or later".
    pub fn parse(range: &str) -> ProvisionResult<Self> {
        Self::parse_with(range, false)
    }

    /// Parse a range. A bare version means "exactly this version".
    pub fn parse_exact(range: &str) -> ProvisionResult<Self> {
        Self::parse_with(range, true)
    }

    fn parse_with(range: &str, exact: bool) -> ProvisionResult<Self> {
        let range = range.trim();
        if range.is_empty() || range == "*" {
            return Ok(Self::any());
        }

        let first = range.chars().next().unwrap_or_default();
        let last = range.chars().last().unwrap_or_default();
        let bracketed = matches!(first, '[' | '(');

        if !bracketed && !range.contains(',') {
            let version = Version::parse_lenient(range)?;
            return Ok(if exact {
                Self::exact(version)
            } else {
                Self::at_least(version)
            });
        }

        // An unbracketed "a,b" pair uses the half-open default [a,b)
        let (inclusive_floor, inclusive_ceiling, body) = if bracketed {
            if !matches!(last, ']' | ')') || range.len() < 2 {
                return Err(ProvisionError::format(format!("Invalid range '{}': unterminated interval", range)));
            }
            (first == '[', last == ']', &range[1..range.len() - 1])
        } else {
            (true, false, range)
        };

        let mut parts = body.split(',');
        let (min, max) = match (parts.next(), parts.next(), parts.next()) {
            (Some(min), Some(max), None) => (min.trim(), max.trim()),
            _ => {
                return Err(ProvisionError::format(format!(
                    "Invalid range '{}': expected exactly two bounds",
                    range
                )))
            }
        };

        let floor = match min {
            "" | "*" => Bound::Unbounded,
            v if inclusive_floor => Bound::Inclusive(Version::parse_lenient(v)?),
            v => Bound::Exclusive(Version::parse_lenient(v)?),
        };
        let ceiling = match max {
            "" | "*" => Bound::Unbounded,
            v if inclusive_ceiling => Bound::Inclusive(Version::parse_lenient(v)?),
            v => Bound::Exclusive(Version::parse_lenient(v)?),
        };

        Self::new(floor, ceiling)
    }

    /// Check whether a version falls inside this range
    pub fn contains(&self, version: &Version) -> bool {
        let above_floor = match &self.floor {
            Bound::Unbounded => true,
            Bound::Inclusive(min) => version >= min,
            Bound::Exclusive(min) => version > min,
        };
        let below_ceiling = match &self.ceiling {
            Bound::Unbounded => true,
            Bound::Inclusive(max) => version <= max,
            Bound::Exclusive(max) => version < max,
        };
        above_floor && below_ceiling
    }

    /// Whether this range pins a single version
    pub fn is_exact(&self) -> bool {
        matches!((&self.floor, &self.ceiling), (Bound::Inclusive(a), Bound::Inclusive(b)) if a == b)
    }

    pub fn floor(&self) -> &Bound {
        &self.floor
    }

    pub fn ceiling(&self) -> &Bound {
        &self.ceiling
    }
}

impl FromStr for VersionRange {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Bound::Inclusive(min), Bound::Unbounded) = (&self.floor, &self.ceiling) {
            return write!(f, "{}", min);
        }
        match &self.floor {
            Bound::Unbounded => write!(f, "[*,")?,
            Bound::Inclusive(v) => write!(f, "[{},", v)?,
            Bound::Exclusive(v) => write!(f, "({},", v)?,
        }
        match &self.ceiling {
            Bound::Unbounded => write!(f, "*]"),
            Bound::Inclusive(v) => write!(f, "{}]", v),
            Bound::Exclusive(v) => write!(f, "{})", v),
        }
    }
}

/// Check whether `version` satisfies `range`, both given as strings
pub fn matches(range: &str, version: &str) -> ProvisionResult<bool> {
    let range = VersionRange::parse(range)?;
    let version = Version::parse_lenient(version)?;
    Ok(range.contains(&version))
}

/// Like [`matches`] but a bare version in `range` must match exactly
pub fn contains(range: &str, version: &str) -> ProvisionResult<bool> {
    let range = VersionRange::parse_exact(range)?;
    let version = Version::parse_lenient(version)?;
    Ok(range.contains(&version))
}
