//! # Catalog Error Types
//!
//! Every failure the catalog core can report is a variant of one of the closed
//! enums below. Callers branch on the variant, never on message text:
//!
//! - [`StoreError`]: the blob store refused, lost or timed out a call
//! - [`ParseError`]: a distribution filename could not be split into name/version
//! - [`ResolveError`]: none of several version strings were semantic versions
//! - [`CatalogError`]: business outcomes of catalog mutations plus wrapped store failures
//!
//! Business conditions (`AlreadyExists`, `ParseError`) are typed outcomes so the
//! HTTP boundary can pick a status code; store failures propagate unmodified.

use std::time::Duration;

/// Convenient result type for blob store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Convenient result type for catalog mutations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Failures reported by a [`crate::store::BlobStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key does not exist. Benign only for the catalog document itself.
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("access denied for key: {key}")]
    AccessDenied { key: String },

    #[error("bucket does not exist: {bucket}")]
    NoSuchBucket { bucket: String },

    #[error("invalid bucket name: {bucket}")]
    InvalidBucketName { bucket: String },

    /// A conditional write lost against a concurrent writer.
    #[error("precondition failed writing {key}: object changed concurrently")]
    PreconditionFailed { key: String },

    #[error("{operation} on {key} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        key: String,
        after: Duration,
    },

    #[error("store unavailable for {key}: {message}")]
    Unavailable { key: String, message: String },

    #[error("invalid object key: {key}")]
    InvalidKey { key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn unavailable(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout { .. } | StoreError::Unavailable { .. }
        )
    }
}

/// A distribution filename that yields no package metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unrecognized distribution extension: {file_name}")]
    UnrecognizedExtension { file_name: String },

    #[error("no name/version split found in filename: {file_name}")]
    MissingVersion { file_name: String },
}

/// Latest-version resolution over several candidates where none parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("none of the {count} version strings is a semantic version")]
    AllVersionsUnparsable { count: usize },
}

/// Outcomes of catalog store operations other than success.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The `(name, version)` pair is already recorded; nothing was written.
    #[error("package {name} version {version} already exists")]
    AlreadyExists { name: String, version: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The catalog document exists but is not a valid catalog.
    #[error("catalog document {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Every optimistic write attempt lost against another writer.
    #[error("gave up writing {key} after {attempts} conflicting attempts")]
    Contention { key: String, attempts: u32 },

    #[error(transparent)]
    Unparsable(#[from] ParseError),

    #[error("failed to serialize catalog: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl CatalogError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Store(e) => e.is_transient(),
            CatalogError::Contention { .. } => true,
            _ => false,
        }
    }
}
