//! Shared state handed to every request handler.

use pail_catalog::CatalogStore;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;

/// Application state, cloned per request.
///
/// The catalog store is the single registry object for the whole process:
/// handlers read its snapshot and route every mutation through it.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(catalog: Arc<CatalogStore>, config: Config) -> Self {
        Self {
            catalog,
            config: Arc::new(config),
        }
    }
}

/// Serializes to `{"message": "..."}`.
#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}
