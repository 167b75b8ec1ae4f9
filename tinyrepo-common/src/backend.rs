use std::time::Duration;

use tokio::io::AsyncRead;

use crate::error::StorageError;
use crate::meta::UploadMeta;
use crate::spec::{ArtifactSpec, ArtifactVersionSpec};

/// Byte stream handed to [`StorageAdapter::upload`].
pub type BlobSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Where a downloaded blob can be read from.
#[derive(Debug)]
pub enum BlobLocator {
    /// A blob opened on local disk. The handle was opened while the adapter
    /// held its lock, so it always refers to one complete upload.
    File {
        file: tokio::fs::File,
        size: u64,
        filename: String,
        content_type: Option<String>,
        hash: Option<String>,
    },
    /// A time-limited signed URL the client should be redirected to.
    Redirect { url: String, expires_in: Duration },
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// `sha256:<hex>` of the stored bytes.
    pub hash: String,
    pub size: u64,
}

/// Trait implemented by all artifact storage backends.
///
/// Backends handle raw placement of blobs addressed by
/// `(namespace, name, version)`. Version ordering and retention live above
/// this trait and only rely on `list_versions` and `delete_version`.
/// Operations that act on a single version require a concrete version and
/// fail with [`StorageError::LatestNotResolved`] otherwise.
#[async_trait::async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Store the full contents of `source`, replacing any blob already at the
    /// same address. The stream is drained before returning.
    async fn upload(
        &self,
        spec: &ArtifactVersionSpec,
        meta: &UploadMeta,
        source: BlobSource<'_>,
    ) -> Result<UploadReceipt, StorageError>;

    /// Locate a stored blob. `requested_filename` overrides any stored name.
    async fn download(
        &self,
        spec: &ArtifactVersionSpec,
        requested_filename: Option<&str>,
    ) -> Result<BlobLocator, StorageError>;

    /// Raw names of every version entry stored for the artifact. An artifact
    /// that was never stored yields an empty list.
    async fn list_versions(&self, spec: &ArtifactSpec) -> Result<Vec<String>, StorageError>;

    /// Remove everything stored for one version. Deleting a missing version
    /// succeeds.
    async fn delete_version(&self, spec: &ArtifactVersionSpec) -> Result<(), StorageError>;

    /// Drop the (already emptied) artifact location itself. Backends without
    /// a container concept have nothing to do.
    async fn remove_artifact(&self, _spec: &ArtifactSpec) -> Result<(), StorageError> {
        Ok(())
    }
}
