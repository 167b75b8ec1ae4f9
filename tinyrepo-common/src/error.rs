/// Rejection of a malformed artifact or version identifier.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("namespace must not be empty")]
    EmptyNamespace,
    #[error("namespace must not contain /")]
    NamespaceSeparator,
    #[error("name must not be empty")]
    EmptyName,
    #[error("name must not contain /")]
    NameSeparator,
    #[error("'{0}' is not allowed as a namespace or name")]
    DotSegment(String),
    #[error("expected namespace/name, got '{0}'")]
    MissingName(String),
    #[error("too many path segments in '{0}'")]
    TooManySegments(String),
    #[error("invalid version '{version}': {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },
}

/// Failure reported by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Nothing is stored at the requested address. Expected, never fatal.
    #[error("not found: {0}")]
    NotFound(String),
    /// A `latest` selector reached an operation that needs a concrete version.
    #[error("version 'latest' must be resolved before {0}")]
    LatestNotResolved(&'static str),
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
