//! Shared helpers for catalog integration tests: record builders and blob
//! store wrappers that inject failures.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pail_catalog::{
    Blob, BlobStore, Catalog, PackageRecord, PutCondition, StoreError, StoreResult,
    DEFAULT_CATALOG_KEY,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub fn record(name: &str, version: &str, summary: &str) -> PackageRecord {
    PackageRecord {
        name: name.to_string(),
        file_name: format!("{name}-{version}.tar.gz"),
        version: version.to_string(),
        python_tag: String::new(),
        location: format!("{name}/{name}-{version}.tar.gz"),
        checksum: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        summary: summary.to_string(),
    }
}

/// Delegates to an inner store but fails writes to chosen keys.
pub struct FailingWrites {
    pub inner: Arc<dyn BlobStore>,
    fail_catalog: bool,
    fail_artifacts: bool,
}

impl FailingWrites {
    pub fn catalog(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            fail_catalog: true,
            fail_artifacts: false,
        }
    }

    pub fn artifacts(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            fail_catalog: false,
            fail_artifacts: true,
        }
    }
}

#[async_trait]
impl BlobStore for FailingWrites {
    async fn get(&self, key: &str) -> StoreResult<Blob> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        condition: PutCondition,
    ) -> StoreResult<Option<String>> {
        let is_catalog = key == DEFAULT_CATALOG_KEY;
        if (is_catalog && self.fail_catalog) || (!is_catalog && self.fail_artifacts) {
            return Err(StoreError::unavailable(key, "injected write failure"));
        }
        self.inner.put(key, bytes, condition).await
    }

    async fn stat(&self, key: &str) -> StoreResult<bool> {
        self.inner.stat(key).await
    }

    async fn presign(&self, key: &str, ttl: Duration, name: &str) -> StoreResult<Option<Url>> {
        self.inner.presign(key, ttl, name).await
    }

    fn describe(&self) -> String {
        format!("failing({})", self.inner.describe())
    }
}

/// Fails every call with a fixed error.
pub struct BrokenStore {
    pub error: fn(&str) -> StoreError,
}

#[async_trait]
impl BlobStore for BrokenStore {
    async fn get(&self, key: &str) -> StoreResult<Blob> {
        Err((self.error)(key))
    }

    async fn put(&self, key: &str, _: Bytes, _: PutCondition) -> StoreResult<Option<String>> {
        Err((self.error)(key))
    }

    async fn stat(&self, key: &str) -> StoreResult<bool> {
        Err((self.error)(key))
    }

    async fn presign(&self, key: &str, _: Duration, _: &str) -> StoreResult<Option<Url>> {
        Err((self.error)(key))
    }

    fn describe(&self) -> String {
        "broken".to_string()
    }
}

/// Sleeps before every read.
pub struct SlowStore {
    pub inner: Arc<dyn BlobStore>,
    pub delay: Duration,
}

#[async_trait]
impl BlobStore for SlowStore {
    async fn get(&self, key: &str) -> StoreResult<Blob> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        condition: PutCondition,
    ) -> StoreResult<Option<String>> {
        self.inner.put(key, bytes, condition).await
    }

    async fn stat(&self, key: &str) -> StoreResult<bool> {
        self.inner.stat(key).await
    }

    async fn presign(&self, key: &str, ttl: Duration, name: &str) -> StoreResult<Option<Url>> {
        self.inner.presign(key, ttl, name).await
    }

    fn describe(&self) -> String {
        "slow".to_string()
    }
}

/// Simulates another server instance writing the catalog between our read and
/// our conditional write.
///
/// Before each of the first `interleavings` conditional catalog writes, a
/// foreign record `intruder-<n>` is added to the stored document, so the
/// caller's ETag is stale by the time its own write arrives.
pub struct InterleavingWriter {
    pub inner: Arc<dyn BlobStore>,
    remaining: AtomicUsize,
    pub conditional_writes: AtomicUsize,
}

impl InterleavingWriter {
    pub fn new(inner: Arc<dyn BlobStore>, interleavings: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(interleavings),
            conditional_writes: AtomicUsize::new(0),
        }
    }

    async fn foreign_write(&self, n: usize) -> StoreResult<()> {
        let mut catalog = match self.inner.get(DEFAULT_CATALOG_KEY).await {
            Ok(blob) => Catalog::from_slice(&blob.bytes)
                .map_err(|e| StoreError::unavailable(DEFAULT_CATALOG_KEY, e.to_string()))?,
            Err(e) if e.is_not_found() => Catalog::new(),
            Err(e) => return Err(e),
        };
        catalog
            .insert(record(&format!("intruder-{n}"), "1.0.0", "foreign writer"))
            .map_err(|e| StoreError::unavailable(DEFAULT_CATALOG_KEY, e.to_string()))?;
        let bytes = catalog
            .to_vec()
            .map_err(|e| StoreError::unavailable(DEFAULT_CATALOG_KEY, e.to_string()))?;
        self.inner
            .put(DEFAULT_CATALOG_KEY, Bytes::from(bytes), PutCondition::Always)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for InterleavingWriter {
    async fn get(&self, key: &str) -> StoreResult<Blob> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        condition: PutCondition,
    ) -> StoreResult<Option<String>> {
        if key == DEFAULT_CATALOG_KEY && condition != PutCondition::Always {
            self.conditional_writes.fetch_add(1, Ordering::SeqCst);
            let left = self.remaining.load(Ordering::SeqCst);
            if left > 0 {
                self.remaining.store(left - 1, Ordering::SeqCst);
                self.foreign_write(left).await?;
            }
        }
        self.inner.put(key, bytes, condition).await
    }

    async fn stat(&self, key: &str) -> StoreResult<bool> {
        self.inner.stat(key).await
    }

    async fn presign(&self, key: &str, ttl: Duration, name: &str) -> StoreResult<Option<Url>> {
        self.inner.presign(key, ttl, name).await
    }

    fn describe(&self) -> String {
        "interleaving".to_string()
    }
}
