//! # Configuration Management
//!
//! Server configuration is a JSON document with four sections, every field
//! optional:
//!
//! ```json
//! {
//!   "server":    { "host": "0.0.0.0", "port": 8080, "public_url": null },
//!   "storage":   { "backend": "s3", "bucket": "packages", "endpoint": "http://localhost:9000",
//!                  "region": "us-east-1", "access_key": null, "secret_key": null,
//!                  "data_dir": "./data", "catalog_key": "packages.json",
//!                  "timeout_secs": 30, "cas_attempts": 5 },
//!   "downloads": { "presign_ttl_secs": 300 },
//!   "uploads":   { "max_upload_size": 104857600, "unparsed_filename": "reject" }
//! }
//! ```
//!
//! Command-line flags (and their `PAIL_*` environment variables) are applied on
//! top through [`ConfigOverrides`].

use pail_catalog::{CatalogStoreOptions, UnparsedFilenamePolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Default upload limit (100 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub downloads: DownloadConfig,
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally visible base URL, used in generated links.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    S3,
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Root directory of the filesystem backend.
    pub data_dir: PathBuf,
    /// Object key of the catalog document.
    pub catalog_key: String,
    pub timeout_secs: u64,
    pub cas_attempts: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::S3,
            bucket: String::new(),
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
            data_dir: PathBuf::from("./data"),
            catalog_key: pail_catalog::DEFAULT_CATALOG_KEY.to_string(),
            timeout_secs: 30,
            cas_attempts: 5,
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn catalog_options(&self) -> CatalogStoreOptions {
        CatalogStoreOptions {
            key: self.catalog_key.clone(),
            timeout: self.timeout(),
            cas_attempts: self.cas_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Validity of presigned download URLs.
    pub presign_ttl_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            presign_ttl_secs: 300,
        }
    }
}

impl DownloadConfig {
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted artifact, in bytes.
    pub max_upload_size: u64,
    pub unparsed_filename: UnparsedFilenamePolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            unparsed_filename: UnparsedFilenamePolicy::Reject,
        }
    }
}

/// Values supplied on the command line; `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_url: Option<String>,
    pub backend: Option<Backend>,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            host,
            port,
            public_url,
            backend,
            bucket,
            endpoint,
            region,
            access_key,
            secret_key,
            data_dir,
        } = overrides;

        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        if public_url.is_some() {
            self.server.public_url = public_url;
        }
        if let Some(backend) = backend {
            self.storage.backend = backend;
        }
        if let Some(bucket) = bucket {
            self.storage.bucket = bucket;
        }
        if let Some(endpoint) = endpoint {
            self.storage.endpoint = endpoint;
        }
        if let Some(region) = region {
            self.storage.region = region;
        }
        if access_key.is_some() {
            self.storage.access_key = access_key;
        }
        if secret_key.is_some() {
            self.storage.secret_key = secret_key;
        }
        if let Some(data_dir) = data_dir {
            self.storage.data_dir = data_dir;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.storage.backend == Backend::S3 {
            if self.storage.bucket.trim().is_empty() {
                return Err(AppError::Config(
                    "storage.bucket is required for the s3 backend".to_string(),
                ));
            }
            if self.storage.endpoint.trim().is_empty() {
                return Err(AppError::Config(
                    "storage.endpoint must not be blank".to_string(),
                ));
            }
        }
        if self.storage.timeout_secs == 0 {
            return Err(AppError::Config(
                "storage.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.storage.cas_attempts == 0 {
            return Err(AppError::Config(
                "storage.cas_attempts must be greater than zero".to_string(),
            ));
        }
        if self.downloads.presign_ttl_secs == 0 {
            return Err(AppError::Config(
                "downloads.presign_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.uploads.max_upload_size == 0 {
            return Err(AppError::Config(
                "uploads.max_upload_size must be greater than zero".to_string(),
            ));
        }
        if self.storage.catalog_key.trim().is_empty() {
            return Err(AppError::Config(
                "storage.catalog_key must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Prefix for links in generated pages: the public URL, or empty for
    /// root-relative links.
    pub fn link_base(&self) -> &str {
        self.server
            .public_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or("")
    }

    /// Base URL for links, defaulting to the bind address.
    pub fn base_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }
}
