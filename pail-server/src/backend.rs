//! Blob store construction from configuration.

use pail_catalog::{BlobStore, CatalogStore, FsStore, MemoryStore};
use std::sync::Arc;
use tracing::info;

use crate::config::{Backend, Config};
use crate::error::{AppError, AppResult};

/// Open the configured blob store. Does not touch the catalog document.
pub async fn open_blob_store(config: &Config) -> AppResult<Arc<dyn BlobStore>> {
    let storage = &config.storage;
    let store: Arc<dyn BlobStore> = match storage.backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::Filesystem => Arc::new(FsStore::new(&storage.data_dir)),
        Backend::S3 => open_s3(config).await?,
    };
    info!(backend = %store.describe(), "Opened blob store");
    Ok(store)
}

#[cfg(feature = "s3")]
async fn open_s3(config: &Config) -> AppResult<Arc<dyn BlobStore>> {
    use pail_catalog::{S3Settings, S3Store};

    let storage = &config.storage;
    let store = S3Store::connect(S3Settings {
        bucket: storage.bucket.clone(),
        endpoint: Some(storage.endpoint.clone()).filter(|e| !e.trim().is_empty()),
        region: storage.region.clone(),
        access_key: storage.access_key.clone(),
        secret_key: storage.secret_key.clone(),
        timeout: storage.timeout(),
        force_path_style: true,
    })
    .await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "s3"))]
async fn open_s3(_config: &Config) -> AppResult<Arc<dyn BlobStore>> {
    Err(AppError::Config(
        "this build has no s3 support; use the filesystem or memory backend".to_string(),
    ))
}

/// Open the blob store and wrap it in a catalog store, without loading.
pub async fn open_catalog(config: &Config) -> AppResult<Arc<CatalogStore>> {
    config.validate()?;
    let store = open_blob_store(config).await?;
    Ok(Arc::new(CatalogStore::new(
        store,
        config.storage.catalog_options(),
    )))
}
