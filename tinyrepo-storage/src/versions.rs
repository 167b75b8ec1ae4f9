//! Version resolution over whatever a backend has stored.
//!
//! Stored entries that are not valid semantic versions are ignored. The
//! remainder is ordered highest first by semver precedence; build metadata
//! does not affect precedence and only breaks ties so the order stays
//! deterministic.

use semver::Version;
use tracing::debug;

use tinyrepo_common::{ArtifactSpec, ArtifactVersionSpec, StorageAdapter, StorageError, VersionSelector};

/// Parse and sort raw entry names, highest version first.
pub fn sort_descending<I, S>(raw: I) -> Vec<Version>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut versions: Vec<Version> = raw
        .into_iter()
        .filter_map(|entry| match Version::parse(entry.as_ref()) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(entry = entry.as_ref(), error = %e, "Skipping unparsable version entry");
                None
            }
        })
        .collect();
    versions.sort_by(|a, b| b.cmp(a));
    versions
}

/// All stored versions of an artifact, highest first. An artifact with no
/// stored location yields an empty list.
pub async fn sorted_versions(
    adapter: &dyn StorageAdapter,
    spec: &ArtifactSpec,
) -> Result<Vec<Version>, StorageError> {
    let raw = adapter.list_versions(spec).await?;
    Ok(sort_descending(raw))
}

/// The highest stored version, or [`StorageError::NotFound`] when there is none.
pub async fn resolve_latest(
    adapter: &dyn StorageAdapter,
    spec: &ArtifactSpec,
) -> Result<Version, StorageError> {
    sorted_versions(adapter, spec)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StorageError::NotFound(format!("no versions of {}", spec)))
}

/// Rewrite a `latest` selector into the concrete version it currently means.
/// Concrete specs pass through untouched.
pub async fn resolve(
    adapter: &dyn StorageAdapter,
    spec: &ArtifactVersionSpec,
) -> Result<ArtifactVersionSpec, StorageError> {
    match spec.version {
        VersionSelector::Exact(_) => Ok(spec.clone()),
        VersionSelector::Latest => {
            let version = resolve_latest(adapter, &spec.artifact).await?;
            Ok(spec.resolved(version))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryAdapter;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn artifact() -> ArtifactSpec {
        ArtifactSpec::new("tools", "builder").unwrap()
    }

    #[tokio::test]
    async fn test_sorted_versions_drops_garbage() {
        let adapter = MemoryAdapter::with_entries(&["1.0.0", "garbage", "2.0.0", "1.5.0"]);
        let versions = sorted_versions(&adapter, &artifact()).await.unwrap();
        assert_eq!(versions, vec![v("2.0.0"), v("1.5.0"), v("1.0.0")]);
    }

    #[test]
    fn test_prerelease_ordering() {
        let sorted = sort_descending(["1.0.0-alpha", "1.0.0", "1.0.0-rc.1", "1.0.0-alpha.1", "0.9.9"]);
        assert_eq!(
            sorted,
            vec![v("1.0.0"), v("1.0.0-rc.1"), v("1.0.0-alpha.1"), v("1.0.0-alpha"), v("0.9.9")]
        );
    }

    #[test]
    fn test_numeric_not_lexical_ordering() {
        let sorted = sort_descending(["1.9.0", "1.10.0", "1.2.0"]);
        assert_eq!(sorted, vec![v("1.10.0"), v("1.9.0"), v("1.2.0")]);
    }

    #[test]
    fn test_build_metadata_order_is_deterministic() {
        let a = sort_descending(["1.0.0+b", "1.0.0+a", "0.1.0"]);
        let b = sort_descending(["1.0.0+a", "0.1.0", "1.0.0+b"]);
        assert_eq!(a, b);
        assert_eq!(a[2], v("0.1.0"));
    }

    #[tokio::test]
    async fn test_resolve_latest_empty_is_not_found() {
        let adapter = MemoryAdapter::default();
        let err = resolve_latest(&adapter, &artifact()).await.unwrap_err();
        assert!(err.is_not_found());

        let adapter = MemoryAdapter::with_entries(&["garbage", "v1"]);
        assert!(resolve_latest(&adapter, &artifact()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_resolve_rewrites_latest() {
        let adapter = MemoryAdapter::with_entries(&["1.0.0", "3.1.4", "2.0.0"]);
        let latest = artifact().latest();
        let resolved = resolve(&adapter, &latest).await.unwrap();
        assert_eq!(resolved.version(), Some(&v("3.1.4")));

        let exact = artifact().with_version(v("1.0.0"));
        assert_eq!(resolve(&adapter, &exact).await.unwrap(), exact);
    }

    #[tokio::test]
    async fn test_list_failure_propagates() {
        let adapter = MemoryAdapter {
            fail_list: true,
            ..Default::default()
        };
        let err = sorted_versions(&adapter, &artifact()).await.unwrap_err();
        assert!(!err.is_not_found());
    }
}
