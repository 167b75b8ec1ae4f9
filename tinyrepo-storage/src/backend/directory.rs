//! Local directory backend adapter.
//!
//! Layout: `{root}/{namespace}/{name}/{version}/blob` with a `meta.json`
//! sidecar. An upload assembles blob and sidecar in a hidden staging
//! directory next to the versions and swaps it in by rename while the
//! adapter's write lock is held, so a reader sees either the previous
//! complete version or the new one, never a half-written one. Listing only
//! reports version directories that hold a blob.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use tinyrepo_common::meta::format_sha256;
use tinyrepo_common::{
    ArtifactSpec, ArtifactVersionSpec, BlobLocator, BlobMeta, BlobSource, StorageAdapter,
    StorageError, UploadMeta, UploadReceipt,
};

use super::copy_hashing;

const BLOB_FILE: &str = "blob";
const META_FILE: &str = "meta.json";
const STAGING_PREFIX: &str = ".staging-";

pub struct DirectoryAdapter {
    root: PathBuf,
    /// Readers hold it while opening a blob, writers while publishing or
    /// removing one.
    lock: RwLock<()>,
}

impl DirectoryAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: RwLock::new(()),
        }
    }

    fn artifact_dir(&self, spec: &ArtifactSpec) -> Result<PathBuf, StorageError> {
        check_component(&spec.namespace)?;
        check_component(&spec.name)?;
        Ok(self.root.join(&spec.namespace).join(&spec.name))
    }

    fn version_dir(
        &self,
        spec: &ArtifactVersionSpec,
        operation: &'static str,
    ) -> Result<PathBuf, StorageError> {
        let version = spec.require_version(operation)?;
        Ok(self.artifact_dir(&spec.artifact)?.join(version.to_string()))
    }
}

fn check_component(component: &str) -> Result<(), StorageError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\'])
    {
        return Err(anyhow!("invalid path component '{}'", component).into());
    }
    Ok(())
}

#[async_trait]
impl StorageAdapter for DirectoryAdapter {
    async fn upload(
        &self,
        spec: &ArtifactVersionSpec,
        meta: &UploadMeta,
        source: BlobSource<'_>,
    ) -> Result<UploadReceipt, StorageError> {
        let dir = self.version_dir(spec, "upload")?;
        let artifact_dir = self.artifact_dir(&spec.artifact)?;

        tokio::fs::create_dir_all(&artifact_dir)
            .await
            .context("Failed to create artifact directory")?;

        // The whole version is assembled here and swapped in at once.
        // Dropping the staging dir (error or cancellation) removes it.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&artifact_dir)
            .context("Failed to create staging directory")?;

        let mut file = tokio::fs::File::create(staging.path().join(BLOB_FILE))
            .await
            .context("Failed to create staged blob")?;
        let (digest, size) = copy_hashing(source, &mut file)
            .await
            .context("Failed to write blob")?;
        file.sync_all().await.context("fsync failed")?;
        drop(file);

        let hash = format_sha256(&digest);
        let blob_meta = BlobMeta {
            original_filename: meta.original_filename.clone().unwrap_or_default(),
            content_type: meta.content_type.clone().unwrap_or_default(),
            hash: hash.clone(),
        };
        let meta_json = serde_json::to_vec_pretty(&blob_meta).context("Failed to encode meta.json")?;
        write_synced(&staging.path().join(META_FILE), &meta_json).await?;

        {
            let _guard = self.lock.write().await;
            publish(staging.path(), &dir, &artifact_dir).await?;
        }

        debug!(artifact = %spec, size, hash = %hash, "Directory upload complete");
        Ok(UploadReceipt { hash, size })
    }

    async fn download(
        &self,
        spec: &ArtifactVersionSpec,
        requested_filename: Option<&str>,
    ) -> Result<BlobLocator, StorageError> {
        let dir = self.version_dir(spec, "download")?;
        let blob_path = dir.join(BLOB_FILE);

        let _guard = self.lock.read().await;

        let file = match tokio::fs::File::open(&blob_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(spec.to_string()));
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to open {}", blob_path.display()))
                    .into());
            }
        };
        let size = file
            .metadata()
            .await
            .with_context(|| format!("Failed to stat {}", blob_path.display()))?
            .len();
        let meta = read_meta(&dir.join(META_FILE)).await;

        Ok(BlobLocator::File {
            file,
            size,
            filename: meta.suggested_filename(requested_filename),
            content_type: meta.content_type().map(str::to_string),
            hash: Some(meta.hash).filter(|h| !h.is_empty()),
        })
    }

    async fn list_versions(&self, spec: &ArtifactSpec) -> Result<Vec<String>, StorageError> {
        let dir = self.artifact_dir(spec)?;

        let _guard = self.lock.read().await;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read {}", dir.display()))
                    .into());
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await.context("Failed to stat entry")?;
            if !file_type.is_dir() {
                continue;
            }
            let has_blob = tokio::fs::try_exists(entry.path().join(BLOB_FILE))
                .await
                .context("Failed to stat blob")?;
            if has_blob {
                names.push(name);
            }
        }

        Ok(names)
    }

    async fn delete_version(&self, spec: &ArtifactVersionSpec) -> Result<(), StorageError> {
        let dir = self.version_dir(spec, "delete")?;

        let _guard = self.lock.write().await;

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(artifact = %spec, "Directory delete complete");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to remove {}", dir.display()))
                .into()),
        }
    }

    async fn remove_artifact(&self, spec: &ArtifactSpec) -> Result<(), StorageError> {
        let dir = self.artifact_dir(spec)?;

        let _guard = self.lock.write().await;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if entries.next_entry().await?.is_some() {
            warn!(artifact = %spec, "Artifact directory not empty after pruning, leaving it in place");
            return Ok(());
        }

        tokio::fs::remove_dir(&dir)
            .await
            .with_context(|| format!("Failed to remove {}", dir.display()))?;
        Ok(())
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all().await.context("fsync failed")?;
    Ok(())
}

/// Swap the staged version directory in as `dest`. A previous `dest` is
/// moved aside first and removed once the new one is in place; if the swap
/// fails it is moved back. Callers hold the write lock.
async fn publish(staged: &Path, dest: &Path, artifact_dir: &Path) -> Result<(), StorageError> {
    let replaced = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(artifact_dir)
        .context("Failed to create staging directory")?;
    let previous = replaced.path().join("previous");

    let had_previous = match tokio::fs::rename(dest, &previous).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to move {} aside", dest.display()))
                .into());
        }
    };

    if let Err(e) = tokio::fs::rename(staged, dest).await {
        if had_previous {
            if let Err(restore) = tokio::fs::rename(&previous, dest).await {
                warn!(path = %dest.display(), error = %restore, "Failed to restore previous version");
            }
        }
        return Err(anyhow::Error::new(e).context("Atomic rename failed").into());
    }

    Ok(())
}

/// Missing or unreadable metadata degrades to defaults; the blob is still served.
async fn read_meta(path: &Path) -> BlobMeta {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!(error = %e, path = %path.display(), "Failed to read blob metadata");
            }
            return BlobMeta::default();
        }
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(error = %e, path = %path.display(), "Malformed blob metadata");
        BlobMeta::default()
    })
}
