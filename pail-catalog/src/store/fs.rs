use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::{validate_key, Blob, BlobStore, PutCondition};
use crate::error::{StoreError, StoreResult};

/// Blob store rooted at a local directory.
///
/// Keys map to relative paths below the root. Writes land in a temporary file
/// that is renamed into place, and the ETag of an object is the SHA-256 of its
/// content.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

fn content_etag(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("\"{:x}\"", hasher.finalize())
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    async fn read(&self, key: &str, path: &Path) -> StoreResult<Option<Bytes>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(StoreError::AccessDenied {
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn get(&self, key: &str) -> StoreResult<Blob> {
        let path = self.path_for(key)?;
        let bytes = self
            .read(key, &path)
            .await?
            .ok_or_else(|| StoreError::not_found(key))?;
        let etag = content_etag(&bytes);
        Ok(Blob {
            bytes,
            etag: Some(etag),
        })
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        condition: PutCondition,
    ) -> StoreResult<Option<String>> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().await;

        if condition != PutCondition::Always {
            let current = self.read(key, &path).await?;
            let allowed = match (&condition, &current) {
                (PutCondition::IfAbsent, existing) => existing.is_none(),
                (PutCondition::IfMatch(expected), Some(existing)) => {
                    *expected == content_etag(existing)
                }
                _ => false,
            };
            if !allowed {
                return Err(StoreError::PreconditionFailed {
                    key: key.to_string(),
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));
        fs::write(&tmp, &bytes).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e));
        }

        debug!(key, size = bytes.len(), path = %path.display(), "Stored object on disk");
        Ok(Some(content_etag(&bytes)))
    }

    async fn stat(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn presign(&self, key: &str, _ttl: Duration, _name: &str) -> StoreResult<Option<Url>> {
        validate_key(key)?;
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }
}
