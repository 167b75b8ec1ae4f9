//! In-memory adapter for exercising resolution and retention.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use tinyrepo_common::{
    ArtifactSpec, ArtifactVersionSpec, BlobLocator, BlobSource, StorageAdapter, StorageError,
    UploadMeta, UploadReceipt,
};

#[derive(Default)]
pub struct MemoryAdapter {
    pub entries: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_deletes: HashSet<String>,
    pub fail_list: bool,
}

impl MemoryAdapter {
    pub fn with_entries(entries: &[&str]) -> Self {
        Self {
            entries: Mutex::new(entries.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn failing_delete_of(mut self, version: &str) -> Self {
        self.fail_deletes.insert(version.to_string());
        self
    }

    pub fn remaining(&self) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap().clone();
        entries.sort();
        entries
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn upload(
        &self,
        spec: &ArtifactVersionSpec,
        _meta: &UploadMeta,
        source: BlobSource<'_>,
    ) -> Result<UploadReceipt, StorageError> {
        let version = spec.require_version("upload")?.to_string();
        let mut buf = Vec::new();
        source.read_to_end(&mut buf).await?;
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains(&version) {
            entries.push(version);
        }
        Ok(UploadReceipt {
            hash: String::new(),
            size: buf.len() as u64,
        })
    }

    async fn download(
        &self,
        _spec: &ArtifactVersionSpec,
        _requested_filename: Option<&str>,
    ) -> Result<BlobLocator, StorageError> {
        Err(StorageError::Unsupported("download"))
    }

    async fn list_versions(&self, _spec: &ArtifactSpec) -> Result<Vec<String>, StorageError> {
        if self.fail_list {
            return Err(anyhow!("listing unavailable").into());
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn delete_version(&self, spec: &ArtifactVersionSpec) -> Result<(), StorageError> {
        let version = spec.require_version("delete")?.to_string();
        if self.fail_deletes.contains(&version) {
            return Err(anyhow!("simulated delete failure for {}", version).into());
        }
        self.entries.lock().unwrap().retain(|v| *v != version);
        self.deleted.lock().unwrap().push(version);
        Ok(())
    }
}
