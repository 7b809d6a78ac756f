//! Semantic version wrapper with the `v`-prefixed rendering used by every
//! distribution's release feeds.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How many distinct minor versions a resolver reports as installable.
pub const SUPPORTED_MINOR_VERSION_COUNT: usize = 3;

/// A parsed release version. Ordering is the semver total order, so equal
/// major.minor with differing patch still compares correctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    inner: semver::Version,
}

impl Version {
    /// Parse a version string, tolerating a leading `v` and a missing patch
    /// component (`v1.18` parses as 1.18.0).
    pub fn parse(version: &str) -> Result<Self> {
        let trimmed = version.trim().trim_start_matches('v');
        let inner = match semver::Version::parse(trimmed) {
            Ok(v) => v,
            Err(_) => {
                let relaxed = relax_partial(trimmed)
                    .ok_or_else(|| Error::InvalidVersion(version.to_string()))?;
                semver::Version::parse(&relaxed)
                    .map_err(|_| Error::InvalidVersion(version.to_string()))?
            }
        };

        Ok(Self { inner })
    }

    pub fn major(&self) -> u64 {
        self.inner.major
    }

    pub fn minor(&self) -> u64 {
        self.inner.minor
    }

    pub fn patch(&self) -> u64 {
        self.inner.patch
    }

    /// `vMAJOR` projection.
    pub fn major_string(&self) -> String {
        format!("v{}", self.inner.major)
    }

    /// `vMAJOR.MINOR` projection, the granularity of the supported window.
    pub fn major_minor_string(&self) -> String {
        format!("v{}.{}", self.inner.major, self.inner.minor)
    }

    /// True when `other` shares this version's major.minor pair.
    pub fn same_minor(&self, other: &Version) -> bool {
        self.inner.major == other.inner.major && self.inner.minor == other.inner.minor
    }
}

/// `v1.18` -> `1.18.0`; anything that is not `MAJOR.MINOR` is rejected.
fn relax_partial(version: &str) -> Option<String> {
    let mut parts = version.split('.');
    let major = parts.next()?;
    let minor = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if major.is_empty()
        || minor.is_empty()
        || !major.bytes().all(|b| b.is_ascii_digit())
        || !minor.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    Some(format!("{major}.{minor}.0"))
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.inner)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(&other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_and_without_prefix() {
        let a = Version::parse("v1.18.8").unwrap();
        let b = Version::parse("1.18.8").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "v1.18.8");
    }

    #[test]
    fn test_parse_partial() {
        let v = Version::parse("v1.18").unwrap();
        assert_eq!((v.major(), v.minor(), v.patch()), (1, 18, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Version::parse("latest").is_err());
        assert!(Version::parse("v1").is_err());
        assert!(Version::parse("").is_err());
    }

    #[test]
    fn test_projections() {
        let v = Version::parse("v1.19.2+k3s1").unwrap();
        assert_eq!(v.major_string(), "v1");
        assert_eq!(v.major_minor_string(), "v1.19");
    }

    #[test]
    fn test_ordering_is_total_and_consistent() {
        let a = Version::parse("v1.18.8").unwrap();
        let b = Version::parse("v1.19.2").unwrap();
        let c = Version::parse("v2.0.0").unwrap();

        assert!(a < b && b < c && a < c);
        assert_eq!(a.cmp(&a), Ordering::Equal);
        assert_eq!(b.cmp(&a), Ordering::Greater);
    }

    #[test]
    fn test_patch_differs_within_same_minor() {
        let a = Version::parse("v1.18.8").unwrap();
        let b = Version::parse("v1.18.9").unwrap();
        assert!(a < b);
        assert!(a.same_minor(&b));
    }

    #[test]
    fn test_serde_round_trip() {
        let v = Version::parse("v1.18.8").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"v1.18.8\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
