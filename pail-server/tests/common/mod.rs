//! Shared helpers for HTTP tests: an in-memory application and upload forms.

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use bytes::Bytes;
use pail_catalog::{
    Blob, BlobStore, CatalogStore, CatalogStoreOptions, MemoryStore, PutCondition, StoreResult,
};
use pail_server::{build_router, AppState, Config};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

pub fn app_with(store: Arc<dyn BlobStore>, config: Config) -> TestApp {
    let catalog = Arc::new(CatalogStore::new(store, CatalogStoreOptions::default()));
    let state = AppState::new(catalog, config);
    let server = TestServer::new(build_router(state.clone())).expect("should create test server");
    TestApp { server, state }
}

pub fn memory_app() -> (TestApp, Arc<MemoryStore>) {
    memory_app_with(Config::default())
}

pub fn memory_app_with(config: Config) -> (TestApp, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (app_with(store.clone(), config), store)
}

/// A `twine`-style upload form.
pub fn upload_form(file_name: &str, name: &str, version: &str, content: &[u8]) -> MultipartForm {
    MultipartForm::new()
        .add_text(":action", "file_upload")
        .add_text("protocol_version", "1")
        .add_text("metadata_version", "2.1")
        .add_text("name", name.to_string())
        .add_text("version", version.to_string())
        .add_text("summary", format!("{name} summary"))
        .add_text("md5_digest", MD5)
        .add_part(
            "content",
            Part::bytes(content.to_vec())
                .file_name(file_name.to_string())
                .mime_type("application/octet-stream"),
        )
}

/// Memory store that hands out signed URLs on an invented host.
pub struct SigningStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl BlobStore for SigningStore {
    async fn get(&self, key: &str) -> StoreResult<Blob> {
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

    async fn presign(
        &self,
        key: &str,
        ttl: Duration,
        _download_name: &str,
    ) -> StoreResult<Option<Url>> {
        let url = Url::parse(&format!(
            "https://storage.test/{key}?expires={}",
            ttl.as_secs()
        ))
        .expect("valid test url");
        Ok(Some(url))
    }

    fn describe(&self) -> String {
        "signing-test".to_string()
    }
}
