//! Shared types for the tinyrepo artifact repository: artifact identifiers,
//! blob metadata, and the storage backend contract.

pub mod backend;
pub mod error;
pub mod meta;
pub mod spec;

pub use backend::{BlobLocator, BlobSource, StorageAdapter, UploadReceipt};
pub use error::{SpecError, StorageError};
pub use meta::{BlobMeta, UploadMeta};
pub use spec::{ArtifactSpec, ArtifactVersionSpec, VersionSelector};
