use semver::Version;
use std::{cmp::Ordering, fmt::Display, str::FromStr};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseVersionError {
    #[error("invalid compiler version format: {0}")]
    InvalidFormat(String),
    #[error("invalid semver part: {0}")]
    InvalidSemver(String),
    #[error("commit hash is not a hex string: {0}")]
    InvalidCommitHash(String),
}

/// A compiler release version as published in the binary mirrors,
/// e.g. `v0.8.10+commit.fc410830` or `v0.8.15-nightly.2022.5.23+commit.21591531`.
///
/// The leading `v` is optional on parsing (vyper releases omit it)
/// and always present in the canonical display form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DetailedVersion {
    version: Version,
    commit: String,
}

impl DetailedVersion {
    pub fn new(version: Version, commit: impl Into<String>) -> Result<Self, ParseVersionError> {
        let commit = commit.into();
        if commit.is_empty() || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseVersionError::InvalidCommitHash(commit));
        }
        Ok(Self { version, commit })
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }

    pub fn is_nightly(&self) -> bool {
        !self.version.pre.is_empty()
    }

    /// The version without pre-release and build parts, used for range checks.
    pub fn release(&self) -> Version {
        Version::new(self.version.major, self.version.minor, self.version.patch)
    }
}

impl FromStr for DetailedVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('v').unwrap_or(s);
        let (version, build) = trimmed
            .split_once('+')
            .ok_or_else(|| ParseVersionError::InvalidFormat(s.to_string()))?;
        let commit = sscanf::scanf!(build, "commit.{String}")
            .map_err(|_| ParseVersionError::InvalidFormat(s.to_string()))?;
        let version = Version::parse(version)
            .map_err(|err| ParseVersionError::InvalidSemver(err.to_string()))?;
        Self::new(version, commit)
    }
}

impl Display for DetailedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}+commit.{}", self.version, self.commit)
    }
}

impl PartialOrd for DetailedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DetailedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.commit.cmp(&other.commit))
    }
}

impl serde::Serialize for DetailedVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for DetailedVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_release_version() {
        let version = DetailedVersion::from_str("v0.8.10+commit.fc410830").unwrap();
        assert_eq!(version.version(), &Version::new(0, 8, 10));
        assert_eq!(version.commit(), "fc410830");
        assert!(!version.is_nightly());
        assert_eq!(version.to_string(), "v0.8.10+commit.fc410830");
    }

    #[test]
    fn parse_version_without_prefix() {
        let version = DetailedVersion::from_str("0.3.6+commit.4a2124d0").unwrap();
        assert_eq!(version.version(), &Version::new(0, 3, 6));
        assert_eq!(version.to_string(), "v0.3.6+commit.4a2124d0");
    }

    #[test]
    fn parse_nightly_version() {
        let version =
            DetailedVersion::from_str("v0.8.15-nightly.2022.5.23+commit.21591531").unwrap();
        assert!(version.is_nightly());
        assert_eq!(version.release(), Version::new(0, 8, 15));
        assert_eq!(
            version.to_string(),
            "v0.8.15-nightly.2022.5.23+commit.21591531"
        );
    }

    #[test]
    fn parse_invalid_versions() {
        for s in [
            "",
            "0.8.10",
            "v0.8.10+commit",
            "v0.8.10+commit.xyzw",
            "vv0.8.10+commit.fc410830",
            "0.8+commit.fc410830",
        ] {
            assert!(
                DetailedVersion::from_str(s).is_err(),
                "{s} should fail to parse"
            );
        }
    }

    #[test]
    fn versions_are_ordered_by_release() {
        let mut versions: Vec<DetailedVersion> = [
            "v0.8.10+commit.fc410830",
            "v0.4.11+commit.68ef5810",
            "v0.8.9+commit.e5eed63a",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
        versions.sort();
        let displayed: Vec<_> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(
            displayed,
            vec![
                "v0.4.11+commit.68ef5810",
                "v0.8.9+commit.e5eed63a",
                "v0.8.10+commit.fc410830",
            ]
        );
    }
}
