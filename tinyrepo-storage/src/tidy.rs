//! Retention ("tidy"): prune old versions beyond a keep-count.
//!
//! Versions are walked highest first. When a ceiling is given, versions
//! strictly above it are neither counted nor deleted, so a pass triggered by
//! uploading version V never touches V or anything uploaded after it. Of the
//! versions that do count, the first `keep` survive and the rest are deleted.
//! A failed delete is logged and the pass moves on to the next candidate.

use std::sync::Arc;

use semver::Version;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use tinyrepo_common::{ArtifactSpec, StorageAdapter, StorageError};

use crate::versions::sorted_versions;

/// What a retention pass did, highest version first in each list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TidyReport {
    pub kept: Vec<Version>,
    pub deleted: Vec<Version>,
    pub failed: Vec<Version>,
    pub skipped_above_ceiling: Vec<Version>,
}

pub async fn tidy(
    adapter: &dyn StorageAdapter,
    spec: &ArtifactSpec,
    keep: usize,
    ceiling: Option<&Version>,
) -> Result<TidyReport, StorageError> {
    let versions = sorted_versions(adapter, spec).await?;
    let mut report = TidyReport::default();

    for version in versions {
        if ceiling.is_some_and(|c| version > *c) {
            report.skipped_above_ceiling.push(version);
            continue;
        }

        if report.kept.len() < keep {
            report.kept.push(version);
            continue;
        }

        let target = spec.with_version(version.clone());
        match adapter.delete_version(&target).await {
            Ok(()) => {
                info!(artifact = %spec, version = %version, "Deleted version");
                report.deleted.push(version);
            }
            Err(e) => {
                warn!(artifact = %spec, version = %version, error = %e, "Failed to delete version");
                report.failed.push(version);
            }
        }
    }

    info!(
        artifact = %spec,
        keep,
        kept = report.kept.len(),
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        skipped_above_ceiling = report.skipped_above_ceiling.len(),
        "Tidy complete"
    );
    Ok(report)
}

/// Delete every version of an artifact, then its now-empty location.
/// The location is left in place if any version could not be deleted.
pub async fn delete_artifact(
    adapter: &dyn StorageAdapter,
    spec: &ArtifactSpec,
) -> Result<TidyReport, StorageError> {
    let report = tidy(adapter, spec, 0, None).await?;
    if report.failed.is_empty() {
        adapter.remove_artifact(spec).await?;
    }
    Ok(report)
}

/// Run a retention pass on a detached task. Failures go to the log only.
pub fn spawn_tidy(
    adapter: Arc<dyn StorageAdapter>,
    spec: ArtifactSpec,
    keep: usize,
    ceiling: Version,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tidy(adapter.as_ref(), &spec, keep, Some(&ceiling)).await {
            error!(artifact = %spec, ceiling = %ceiling, error = %e, "Background tidy failed");
        }
    })
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
    async fn test_keep_one_without_ceiling() {
        let adapter = MemoryAdapter::with_entries(&["1.0.0", "3.0.0", "2.0.0"]);
        let report = tidy(&adapter, &artifact(), 1, None).await.unwrap();

        assert_eq!(adapter.remaining(), vec!["3.0.0"]);
        assert_eq!(report.kept, vec![v("3.0.0")]);
        assert_eq!(report.deleted, vec![v("2.0.0"), v("1.0.0")]);
    }

    #[tokio::test]
    async fn test_ceiling_excludes_newer_versions() {
        let adapter = MemoryAdapter::with_entries(&["3.0.0", "2.0.0", "1.0.0"]);
        let report = tidy(&adapter, &artifact(), 1, Some(&v("2.0.0"))).await.unwrap();

        assert_eq!(adapter.remaining(), vec!["2.0.0", "3.0.0"]);
        assert_eq!(report.skipped_above_ceiling, vec![v("3.0.0")]);
        assert_eq!(report.kept, vec![v("2.0.0")]);
        assert_eq!(report.deleted, vec![v("1.0.0")]);
    }

    #[tokio::test]
    async fn test_keep_zero_prunes_everything() {
        let adapter = MemoryAdapter::with_entries(&["1.0.0", "2.0.0", "junk"]);
        let report = tidy(&adapter, &artifact(), 0, None).await.unwrap();

        assert!(report.kept.is_empty());
        assert_eq!(report.deleted.len(), 2);
        // Unparsable entries are invisible to retention.
        assert_eq!(adapter.remaining(), vec!["junk"]);
    }

    #[tokio::test]
    async fn test_keep_larger_than_stored() {
        let adapter = MemoryAdapter::with_entries(&["1.0.0", "2.0.0"]);
        let report = tidy(&adapter, &artifact(), 5, None).await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(adapter.remaining(), vec!["1.0.0", "2.0.0"]);
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_stop_pass() {
        let adapter = MemoryAdapter::with_entries(&["4.0.0", "3.0.0", "2.0.0", "1.0.0"])
            .failing_delete_of("3.0.0");
        let report = tidy(&adapter, &artifact(), 1, None).await.unwrap();

        assert_eq!(report.failed, vec![v("3.0.0")]);
        assert_eq!(report.deleted, vec![v("2.0.0"), v("1.0.0")]);
        assert_eq!(adapter.deleted(), vec!["2.0.0", "1.0.0"]);
    }

    #[tokio::test]
    async fn test_ceiling_protects_the_uploaded_version() {
        // 1.0.0+b sorts above 1.0.0+a; a pass for 1.0.0+a must still keep it.
        let adapter = MemoryAdapter::with_entries(&["1.0.0+b", "1.0.0+a", "0.9.0"]);
        let report = tidy(&adapter, &artifact(), 1, Some(&v("1.0.0+a"))).await.unwrap();

        assert_eq!(report.kept, vec![v("1.0.0+a")]);
        assert_eq!(report.skipped_above_ceiling, vec![v("1.0.0+b")]);
        assert_eq!(adapter.remaining(), vec!["1.0.0+a", "1.0.0+b"]);
    }

    #[tokio::test]
    async fn test_list_failure_is_an_error() {
        let adapter = MemoryAdapter {
            fail_list: true,
            ..Default::default()
        };
        assert!(tidy(&adapter, &artifact(), 1, None).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_artifact_prunes_all() {
        let adapter = MemoryAdapter::with_entries(&["1.0.0", "2.0.0"]);
        let report = delete_artifact(&adapter, &artifact()).await.unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert!(adapter.remaining().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_tidy_runs_detached() {
        let adapter = Arc::new(MemoryAdapter::with_entries(&["3.0.0", "2.0.0", "1.0.0"]));
        let handle = spawn_tidy(adapter.clone(), artifact(), 2, v("3.0.0"));
        handle.await.unwrap();
        assert_eq!(adapter.remaining(), vec!["2.0.0", "3.0.0"]);
    }

    #[tokio::test]
    async fn test_spawn_tidy_swallows_errors() {
        let adapter = Arc::new(MemoryAdapter {
            fail_list: true,
            ..Default::default()
        });
        spawn_tidy(adapter, artifact(), 1, v("1.0.0")).await.unwrap();
    }
}
