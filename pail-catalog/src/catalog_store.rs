//! # Catalog Store
//!
//! Owns the catalog snapshot and keeps it in step with the blob store.
//!
//! ## Write discipline
//!
//! Every mutation is a read-modify-write of the single catalog document:
//!
//! 1. take the store-wide write lock (mutations inside one process queue up)
//! 2. fetch the document and its ETag (absent document = empty catalog)
//! 3. apply the change to the fresh copy
//! 4. write it back with `If-Match` on that ETag (`If-None-Match: *` when the
//!    document did not exist yet)
//!
//! A lost precondition means another process wrote in between; the cycle
//! restarts from step 2, at most `cas_attempts` times. The snapshot readers see
//! is replaced only with content that was read from or written to the store.
//!
//! ## Reads
//!
//! [`CatalogStore::snapshot`] hands out an `Arc<Catalog>` without touching the
//! store, so listing and search never wait on I/O or on writers.

use bytes::Bytes;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::catalog::Catalog;
use crate::error::{CatalogError, CatalogResult, StoreError, StoreResult};
use crate::record::PackageRecord;
use crate::store::{with_timeout, BlobStore, PutCondition};

/// Key of the catalog document unless configured otherwise.
pub const DEFAULT_CATALOG_KEY: &str = "packages.json";

/// Tuning for a [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct CatalogStoreOptions {
    /// Blob key holding the catalog document.
    pub key: String,
    /// Upper bound on every individual store call.
    pub timeout: Duration,
    /// Optimistic write attempts per mutation before giving up.
    pub cas_attempts: u32,
}

impl Default for CatalogStoreOptions {
    fn default() -> Self {
        Self {
            key: DEFAULT_CATALOG_KEY.to_string(),
            timeout: Duration::from_secs(30),
            cas_attempts: 5,
        }
    }
}

/// The shared catalog registry handed to every request handler.
pub struct CatalogStore {
    store: Arc<dyn BlobStore>,
    options: CatalogStoreOptions,
    snapshot: RwLock<Arc<Catalog>>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore")
            .field("store", &self.store.describe())
            .field("options", &self.options)
            .finish()
    }
}

impl CatalogStore {
    /// Create a store with an empty snapshot. Call [`load`](Self::load) to
    /// populate it.
    pub fn new(store: Arc<dyn BlobStore>, options: CatalogStoreOptions) -> Self {
        Self {
            store,
            options,
            snapshot: RwLock::new(Arc::new(Catalog::new())),
            write_lock: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &CatalogStoreOptions {
        &self.options
    }

    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Most recently loaded or persisted catalog.
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Every record of one package from the snapshot. `name` must be canonical.
    pub fn package(&self, name: &str) -> Option<Vec<PackageRecord>> {
        self.snapshot().get(name).map(<[PackageRecord]>::to_vec)
    }

    fn publish(&self, catalog: Catalog) -> Arc<Catalog> {
        let catalog = Arc::new(catalog);
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = catalog.clone();
        catalog
    }

    /// Fetch and decode the catalog document together with the write
    /// condition that guards replacing exactly this version of it.
    async fn fetch(&self) -> CatalogResult<(Catalog, PutCondition)> {
        let key = &self.options.key;
        match with_timeout("get", key, self.options.timeout, self.store.get(key)).await {
            Ok(blob) => {
                let catalog =
                    Catalog::from_slice(&blob.bytes).map_err(|source| CatalogError::Corrupt {
                        key: key.clone(),
                        source,
                    })?;
                let condition = match blob.etag {
                    Some(etag) => PutCondition::IfMatch(etag),
                    None => PutCondition::Always,
                };
                Ok((catalog, condition))
            }
            Err(e) if e.is_not_found() => {
                debug!(key = %key, "Catalog document absent, starting empty");
                Ok((Catalog::new(), PutCondition::IfAbsent))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, catalog: &Catalog, condition: PutCondition) -> CatalogResult<()> {
        let key = &self.options.key;
        let bytes = catalog.to_vec().map_err(CatalogError::Serialize)?;
        with_timeout(
            "put",
            key,
            self.options.timeout,
            self.store.put(key, Bytes::from(bytes), condition),
        )
        .await?;
        Ok(())
    }

    /// Replace the snapshot with the stored catalog.
    ///
    /// An absent document yields an empty catalog. Every other store failure
    /// and a corrupt document are errors and leave the snapshot untouched.
    pub async fn load(&self) -> CatalogResult<Arc<Catalog>> {
        let (catalog, _) = self.fetch().await?;
        info!(
            key = %self.options.key,
            packages = catalog.len(),
            records = catalog.record_count(),
            "Loaded package catalog"
        );
        Ok(self.publish(catalog))
    }

    /// Run one optimistic read-modify-write cycle per attempt.
    ///
    /// `apply` returns whether it changed the catalog; an unchanged catalog is
    /// not written back.
    async fn mutate<F>(&self, operation: &'static str, mut apply: F) -> CatalogResult<bool>
    where
        F: FnMut(&mut Catalog) -> CatalogResult<bool>,
    {
        let _guard = self.write_lock.lock().await;
        let attempts = self.options.cas_attempts.max(1);

        for attempt in 1..=attempts {
            let (mut catalog, condition) = self.fetch().await?;
            let changed = match apply(&mut catalog) {
                Ok(changed) => changed,
                Err(e) => {
                    self.publish(catalog);
                    return Err(e);
                }
            };
            if !changed {
                self.publish(catalog);
                return Ok(false);
            }

            match self.write(&catalog, condition).await {
                Ok(()) => {
                    self.publish(catalog);
                    return Ok(true);
                }
                Err(CatalogError::Store(StoreError::PreconditionFailed { .. })) => {
                    debug!(
                        operation,
                        attempt,
                        attempts,
                        key = %self.options.key,
                        "Catalog changed concurrently, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            operation,
            attempts,
            key = %self.options.key,
            "Giving up on catalog write after repeated conflicts"
        );
        Err(CatalogError::Contention {
            key: self.options.key.clone(),
            attempts,
        })
    }

    /// Record a new package version.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::AlreadyExists`] when the stored catalog already has
    ///   `(record.name, record.version)`; nothing is written
    /// - [`CatalogError::Store`] / [`CatalogError::Contention`] when the write
    ///   could not be persisted; the snapshot is left as it was
    pub async fn add(&self, record: PackageRecord) -> CatalogResult<()> {
        let name = record.name.clone();
        let version = record.version.clone();
        self.mutate("add", |catalog| {
            catalog.insert(record.clone())?;
            Ok(true)
        })
        .await?;
        info!(package = %name, version = %version, "Added package version to catalog");
        Ok(())
    }

    /// Forget a package version. Removing an unknown pair succeeds without
    /// writing anything.
    ///
    /// Returns whether a record was removed.
    pub async fn remove(&self, name: &str, version: &str) -> CatalogResult<bool> {
        let removed = self
            .mutate("remove", |catalog| Ok(catalog.remove(name, version)))
            .await?;
        if removed {
            info!(package = %name, version = %version, "Removed package version from catalog");
        } else {
            debug!(package = %name, version = %version, "Nothing to remove");
        }
        Ok(removed)
    }

    /// Overwrite the stored document with the current snapshot, unconditionally.
    pub async fn save(&self) -> CatalogResult<()> {
        let _guard = self.write_lock.lock().await;
        let catalog = self.snapshot();
        self.write(&catalog, PutCondition::Always).await?;
        info!(key = %self.options.key, packages = catalog.len(), "Saved package catalog");
        Ok(())
    }

    /// Record `record` and store its artifact bytes at `record.location`.
    ///
    /// The catalog entry is written first, and the artifact is only written
    /// where no blob exists yet, so an upload never replaces bytes another
    /// record points at. If the artifact write fails, the entry is removed
    /// again before the error is returned. An occupied location is reported
    /// as [`CatalogError::AlreadyExists`].
    pub async fn ingest(&self, record: PackageRecord, content: Bytes) -> CatalogResult<()> {
        let name = record.name.clone();
        let version = record.version.clone();
        let location = record.artifact_key().to_string();
        self.add(record).await?;

        let stored = with_timeout(
            "put",
            &location,
            self.options.timeout,
            self.store.put(&location, content, PutCondition::IfAbsent),
        )
        .await;

        if let Err(e) = stored {
            error!(
                package = %name,
                version = %version,
                location = %location,
                error = %e,
                "Artifact write failed, withdrawing catalog entry"
            );
            if let Err(undo) = self.remove(&name, &version).await {
                error!(
                    package = %name,
                    version = %version,
                    error = %undo,
                    "Could not withdraw catalog entry for missing artifact"
                );
            }
            return Err(match e {
                StoreError::PreconditionFailed { .. } => {
                    CatalogError::AlreadyExists { name, version }
                }
                other => other.into(),
            });
        }
        Ok(())
    }

    /// Signed download URL for an artifact, if the backend can sign.
    pub async fn presign(
        &self,
        location: &str,
        ttl: Duration,
        download_name: &str,
    ) -> StoreResult<Option<Url>> {
        with_timeout(
            "presign",
            location,
            self.options.timeout,
            self.store.presign(location, ttl, download_name),
        )
        .await
    }

    /// Artifact bytes, for backends that cannot sign URLs.
    pub async fn artifact(&self, location: &str) -> StoreResult<Bytes> {
        let blob = with_timeout(
            "get",
            location,
            self.options.timeout,
            self.store.get(location),
        )
        .await?;
        Ok(blob.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn record(name: &str, version: &str) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            file_name: format!("{name}-{version}.tar.gz"),
            version: version.to_string(),
            python_tag: String::new(),
            location: format!("{name}/{name}-{version}.tar.gz"),
            checksum: String::new(),
            summary: String::new(),
        }
    }

    fn catalog_store() -> (Arc<MemoryStore>, CatalogStore) {
        let blobs = Arc::new(MemoryStore::new());
        let store = CatalogStore::new(blobs.clone(), CatalogStoreOptions::default());
        (blobs, store)
    }

    #[tokio::test]
    async fn test_load_absent_document_is_empty() {
        let (blobs, store) = catalog_store();
        let catalog = store.load().await.expect("absent catalog is empty");
        assert!(catalog.is_empty());
        assert!(blobs.is_empty(), "loading must not create the document");
    }

    #[tokio::test]
    async fn test_load_corrupt_document_fails() {
        let (blobs, store) = catalog_store();
        blobs
            .put(
                DEFAULT_CATALOG_KEY,
                Bytes::from_static(b"{not json"),
                PutCondition::Always,
            )
            .await
            .expect("seed");
        assert!(matches!(
            store.load().await,
            Err(CatalogError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_persists_and_updates_snapshot() {
        let (blobs, store) = catalog_store();
        store.add(record("foo", "1.0")).await.expect("add");

        assert!(store.snapshot().contains("foo", "1.0"));
        let stored = blobs.peek(DEFAULT_CATALOG_KEY).expect("document written");
        let decoded = Catalog::from_slice(&stored).expect("valid document");
        assert!(decoded.contains("foo", "1.0"));
    }

    #[tokio::test]
    async fn test_add_sees_writes_from_other_instances() {
        let blobs = Arc::new(MemoryStore::new());
        let first = CatalogStore::new(blobs.clone(), CatalogStoreOptions::default());
        let second = CatalogStore::new(blobs.clone(), CatalogStoreOptions::default());

        first.add(record("foo", "1.0")).await.expect("first add");
        second.add(record("bar", "1.0")).await.expect("second add");

        let catalog = second.snapshot();
        assert!(catalog.contains("foo", "1.0"));
        assert!(catalog.contains("bar", "1.0"));
        assert!(matches!(
            second.add(record("foo", "1.0")).await,
            Err(CatalogError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_unknown_pair_writes_nothing() {
        let (blobs, store) = catalog_store();
        assert!(!store.remove("foo", "1.0").await.expect("no-op remove"));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_stores_artifact() {
        let (blobs, store) = catalog_store();
        store
            .ingest(record("foo", "1.0"), Bytes::from_static(b"sdist"))
            .await
            .expect("ingest");
        assert_eq!(
            blobs.peek("foo/foo-1.0.tar.gz").as_deref(),
            Some(&b"sdist"[..])
        );
        assert_eq!(
            store.artifact("foo/foo-1.0.tar.gz").await.expect("artifact"),
            Bytes::from_static(b"sdist")
        );
        assert!(store
            .presign("foo/foo-1.0.tar.gz", Duration::from_secs(300), "foo-1.0.tar.gz")
            .await
            .expect("presign")
            .is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_with_snapshot() {
        let (blobs, store) = catalog_store();
        store.add(record("foo", "1.0")).await.expect("add");
        blobs
            .put(DEFAULT_CATALOG_KEY, Bytes::from_static(b"{}"), PutCondition::Always)
            .await
            .expect("foreign overwrite");

        store.save().await.expect("save");
        let stored = blobs.peek(DEFAULT_CATALOG_KEY).expect("document");
        assert!(Catalog::from_slice(&stored)
            .expect("valid")
            .contains("foo", "1.0"));
    }
}
