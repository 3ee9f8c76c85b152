//! # Blob Store Seam
//!
//! The catalog core talks to object storage only through [`BlobStore`]. Three
//! backends ship with the crate:
//!
//! - [`MemoryStore`]: process-local, for tests and throwaway servers
//! - [`FsStore`]: a directory on local disk
//! - `S3Store` (feature `s3`): any S3-compatible service, MinIO included
//!
//! Every call made by the catalog goes through [`with_timeout`] so a hung
//! backend surfaces as [`StoreError::Timeout`] instead of stalling a request.

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::error::{StoreError, StoreResult};

mod fs;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use fs::FsStore;
pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use s3::{S3Settings, S3Store};

/// Object contents plus the version tag the backend assigned to them.
#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Bytes,
    /// Opaque tag for conditional writes. `None` if the backend has none.
    pub etag: Option<String>,
}

/// Precondition attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// Overwrite unconditionally.
    Always,
    /// Write only if the key does not exist yet.
    IfAbsent,
    /// Write only if the current object still carries this tag.
    IfMatch(String),
}

/// Key/value object storage used for artifacts and the catalog document.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch an object. A missing key is [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> StoreResult<Blob>;

    /// Store an object, returning its new tag when the backend reports one.
    ///
    /// A violated `condition` fails with [`StoreError::PreconditionFailed`]
    /// and leaves the stored object untouched.
    async fn put(&self, key: &str, bytes: Bytes, condition: PutCondition)
        -> StoreResult<Option<String>>;

    /// Whether an object exists under `key`.
    async fn stat(&self, key: &str) -> StoreResult<bool>;

    /// Time-limited retrieval URL for `key`.
    ///
    /// `download_name` is the file name clients should save the object as.
    /// Backends that cannot sign URLs return `Ok(None)`.
    async fn presign(
        &self,
        key: &str,
        ttl: Duration,
        download_name: &str,
    ) -> StoreResult<Option<Url>>;

    /// Short description for logs and status pages.
    fn describe(&self) -> String;
}

/// Run a store call with an upper bound on its duration.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    key: &str,
    after: Duration,
    fut: F,
) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, key, timeout = ?after, "Blob store call timed out");
            Err(StoreError::Timeout {
                operation,
                key: key.to_string(),
                after,
            })
        }
    }
}

/// Reject keys that could escape a store root or confuse object naming.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.chars().any(char::is_control)
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}
