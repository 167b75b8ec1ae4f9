//! Artifact identifiers.
//!
//! An artifact is addressed as `namespace/name`, a single version of it as
//! `namespace/name/version` where `version` is either a strict semantic
//! version or the literal `latest`. The same validation applies whether the
//! identifier arrives as one slash-separated token (CLI) or as separate route
//! segments (HTTP).

use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::error::{SpecError, StorageError};

/// Version token that selects the highest stored version.
pub const LATEST: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactSpec {
    pub namespace: String,
    pub name: String,
}

/// `.` and `..` would address a parent or the same directory on any
/// path-shaped store.
fn is_dot_segment(segment: &str) -> bool {
    segment == "." || segment == ".."
}

impl ArtifactSpec {
    /// Validate separately supplied namespace and name segments.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, SpecError> {
        let namespace = namespace.into();
        let name = name.into();

        if namespace.is_empty() {
            return Err(SpecError::EmptyNamespace);
        }
        if namespace.contains('/') {
            return Err(SpecError::NamespaceSeparator);
        }
        if name.is_empty() {
            return Err(SpecError::EmptyName);
        }
        if name.contains('/') {
            return Err(SpecError::NameSeparator);
        }
        for segment in [&namespace, &name] {
            if is_dot_segment(segment) {
                return Err(SpecError::DotSegment(segment.clone()));
            }
        }

        Ok(Self { namespace, name })
    }

    /// Parse a `namespace/name` token.
    pub fn parse(raw: &str) -> Result<Self, SpecError> {
        let (namespace, name) = raw
            .split_once('/')
            .ok_or_else(|| SpecError::MissingName(raw.to_string()))?;
        Self::new(namespace, name)
    }

    pub fn with_version(&self, version: Version) -> ArtifactVersionSpec {
        ArtifactVersionSpec {
            artifact: self.clone(),
            version: VersionSelector::Exact(version),
        }
    }

    pub fn latest(&self) -> ArtifactVersionSpec {
        ArtifactVersionSpec {
            artifact: self.clone(),
            version: VersionSelector::Latest,
        }
    }
}

impl fmt::Display for ArtifactSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ArtifactSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Either a concrete version or a request for the highest stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Exact(Version),
    Latest,
}

impl VersionSelector {
    /// Parse a version segment: `latest`, or a strict `major.minor.patch`
    /// with optional pre-release and build metadata.
    pub fn parse(raw: &str) -> Result<Self, SpecError> {
        if raw == LATEST {
            return Ok(VersionSelector::Latest);
        }
        Version::parse(raw)
            .map(VersionSelector::Exact)
            .map_err(|source| SpecError::InvalidVersion {
                version: raw.to_string(),
                source,
            })
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Exact(v) => write!(f, "{}", v),
            VersionSelector::Latest => f.write_str(LATEST),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactVersionSpec {
    pub artifact: ArtifactSpec,
    pub version: VersionSelector,
}

impl ArtifactVersionSpec {
    /// Validate namespace, name and version supplied as separate segments.
    pub fn from_segments(namespace: &str, name: &str, version: &str) -> Result<Self, SpecError> {
        let artifact = ArtifactSpec::new(namespace, name)?;
        let version = VersionSelector::parse(version)?;
        Ok(Self { artifact, version })
    }

    /// Parse a `namespace/name/version` token. A bare `namespace/name`
    /// selects `latest`.
    pub fn parse(raw: &str) -> Result<Self, SpecError> {
        let mut parts = raw.splitn(3, '/');
        let namespace = parts.next().unwrap_or_default();
        let name = parts
            .next()
            .ok_or_else(|| SpecError::MissingName(raw.to_string()))?;

        match parts.next() {
            None => Ok(ArtifactSpec::new(namespace, name)?.latest()),
            Some(version) if version.contains('/') => {
                Err(SpecError::TooManySegments(raw.to_string()))
            }
            Some(version) => Self::from_segments(namespace, name, version),
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self.version, VersionSelector::Latest)
    }

    /// The concrete version, if one was given.
    pub fn version(&self) -> Option<&Version> {
        match &self.version {
            VersionSelector::Exact(v) => Some(v),
            VersionSelector::Latest => None,
        }
    }

    /// The concrete version a storage operation acts on. `operation` names the
    /// caller for the error message.
    pub fn require_version(&self, operation: &'static str) -> Result<&Version, StorageError> {
        self.version()
            .ok_or(StorageError::LatestNotResolved(operation))
    }

    /// Replace a `latest` selector with the version it resolved to.
    pub fn resolved(&self, version: Version) -> Self {
        self.artifact.with_version(version)
    }
}

impl fmt::Display for ArtifactVersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.artifact, self.version)
    }
}

impl FromStr for ArtifactVersionSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_artifact_spec() {
        let spec = ArtifactSpec::parse("tools/builder").unwrap();
        assert_eq!(spec.namespace, "tools");
        assert_eq!(spec.name, "builder");
        assert_eq!(spec.to_string(), "tools/builder");
    }

    #[test]
    fn test_artifact_spec_rejections() {
        assert!(matches!(ArtifactSpec::new("", "x"), Err(SpecError::EmptyNamespace)));
        assert!(matches!(ArtifactSpec::new("a/b", "x"), Err(SpecError::NamespaceSeparator)));
        assert!(matches!(ArtifactSpec::new("ns", ""), Err(SpecError::EmptyName)));
        assert!(matches!(ArtifactSpec::new("ns", "a/b"), Err(SpecError::NameSeparator)));
        assert!(matches!(ArtifactSpec::parse("nonamespace"), Err(SpecError::MissingName(_))));
        assert!(matches!(ArtifactSpec::parse("/name"), Err(SpecError::EmptyNamespace)));
        assert!(matches!(ArtifactSpec::parse("ns/"), Err(SpecError::EmptyName)));
        assert!(matches!(ArtifactSpec::parse("ns/name/1.0.0"), Err(SpecError::NameSeparator)));
    }

    #[test]
    fn test_dot_segments_rejected() {
        for (ns, name) in [("..", "x"), (".", "x"), ("ns", ".."), ("ns", ".")] {
            assert!(
                matches!(ArtifactSpec::new(ns, name), Err(SpecError::DotSegment(_))),
                "accepted {}/{}",
                ns,
                name
            );
        }
        assert!(matches!(
            ArtifactVersionSpec::parse("../etc/1.0.0"),
            Err(SpecError::DotSegment(_))
        ));
        // Dots inside a segment are ordinary characters.
        assert!(ArtifactSpec::new("...", "a.b").is_ok());
    }

    #[test]
    fn test_parse_version_spec_latest() {
        let spec = ArtifactVersionSpec::parse("ns/app/latest").unwrap();
        assert!(spec.is_latest());
        assert_eq!(spec.version(), None);
        assert!(matches!(
            spec.require_version("upload"),
            Err(StorageError::LatestNotResolved("upload"))
        ));
    }

    #[test]
    fn test_parse_version_spec_without_version_selects_latest() {
        let spec = ArtifactVersionSpec::parse("ns/app").unwrap();
        assert!(spec.is_latest());
    }

    #[test]
    fn test_parse_version_spec_concrete() {
        let spec = ArtifactVersionSpec::parse("ns/app/1.2.3-rc.1+build.5").unwrap();
        let v = spec.version().unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert_eq!(v.pre.as_str(), "rc.1");
        assert_eq!(v.build.as_str(), "build.5");
        assert_eq!(spec.to_string(), "ns/app/1.2.3-rc.1+build.5");
    }

    #[test]
    fn test_token_and_segments_agree() {
        let inputs = [
            ("ns", "app", "1.0.0"),
            ("ns", "app", "latest"),
            ("ns", "app", "1.0"),
            ("ns", "", "1.0.0"),
            ("", "app", "latest"),
        ];
        for (ns, name, version) in inputs {
            let token = format!("{}/{}/{}", ns, name, version);
            let a = ArtifactVersionSpec::parse(&token).ok();
            let b = ArtifactVersionSpec::from_segments(ns, name, version).ok();
            assert_eq!(a, b, "disagreement on {}", token);
        }
    }

    #[test]
    fn test_malformed_versions_rejected() {
        for bad in ["", "1", "1.0", "v1.0.0", "1.0.0.0", "01.0.0", "Latest", "1.0.0-", "x.y.z"] {
            let err = ArtifactVersionSpec::from_segments("ns", "app", bad).unwrap_err();
            assert!(matches!(err, SpecError::InvalidVersion { .. }), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_too_many_segments() {
        assert!(matches!(
            ArtifactVersionSpec::parse("ns/app/1.0.0/extra"),
            Err(SpecError::TooManySegments(_))
        ));
    }

    #[test]
    fn test_resolved_replaces_latest() {
        let spec = ArtifactVersionSpec::parse("ns/app/latest").unwrap();
        let resolved = spec.resolved(Version::new(2, 0, 0));
        assert!(!resolved.is_latest());
        assert_eq!(resolved.require_version("download").unwrap(), &Version::new(2, 0, 0));
        assert_eq!(resolved.artifact, spec.artifact);
    }

    proptest! {
        #[test]
        fn prop_artifact_spec_round_trips(
            ns in "[^/]{1,16}",
            name in "[^/]{1,16}",
        ) {
            prop_assume!(!is_dot_segment(&ns) && !is_dot_segment(&name));
            let spec = ArtifactSpec::parse(&format!("{}/{}", ns, name)).unwrap();
            prop_assert_eq!(spec.namespace, ns);
            prop_assert_eq!(spec.name, name);
        }

        #[test]
        fn prop_garbage_versions_rejected(version in "[a-zA-Z_]{1,12}") {
            prop_assume!(version != LATEST);
            let result = ArtifactVersionSpec::from_segments("ns", "app", &version);
            prop_assert!(
                matches!(result, Err(SpecError::InvalidVersion { .. })),
                "accepted {:?}",
                version
            );
        }
    }
}
