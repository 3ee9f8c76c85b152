//! # Package Catalog Core
//!
//! The registry logic behind the `pail` package index: everything between an
//! uploaded distribution file and the catalog document persisted in object
//! storage.
//!
//! ## Key Modules
//!
//! - [`normalize`](mod@normalize): canonical package names
//! - [`filename`]: name, version and interpreter tag from distribution filenames
//! - [`version`]: semantic-version based "latest version" resolution
//! - [`record`]: package records and their construction from uploads
//! - [`catalog`]: the catalog document model
//! - [`store`]: the blob store seam and its backends
//! - [`catalog_store`]: the shared, blob-backed catalog with optimistic writes
//! - [`search`]: name/summary search over a catalog snapshot
//! - [`error`]: closed error enums for every failure above
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use pail_catalog::{CatalogStore, CatalogStoreOptions, MemoryStore, PackageRecord, Upload,
//!                    UnparsedFilenamePolicy};
//!
//! # async fn demo() -> Result<(), pail_catalog::CatalogError> {
//! let store = CatalogStore::new(Arc::new(MemoryStore::new()), CatalogStoreOptions::default());
//! store.load().await?;
//!
//! let upload = Upload {
//!     original_file_name: "requests-2.25.1.tar.gz".to_string(),
//!     storage_key: "requests/requests-2.25.1.tar.gz".to_string(),
//!     ..Upload::default()
//! };
//! let record = PackageRecord::from_upload(&upload, UnparsedFilenamePolicy::Reject)?;
//! store.ingest(record, bytes::Bytes::from_static(b"...")).await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod catalog_store;
pub mod error;
pub mod filename;
pub mod normalize;
pub mod record;
pub mod search;
pub mod store;
pub mod version;

pub use catalog::Catalog;
pub use catalog_store::{CatalogStore, CatalogStoreOptions, DEFAULT_CATALOG_KEY};
pub use error::{
    CatalogError, CatalogResult, ParseError, ResolveError, StoreError, StoreResult,
};
pub use filename::{parse_filename, ParsedFilename};
pub use normalize::normalize;
pub use record::{storage_key, PackageRecord, UnparsedFilenamePolicy, Upload};
pub use search::{search, SearchHit, SearchQuery};
pub use store::{with_timeout, Blob, BlobStore, FsStore, MemoryStore, PutCondition};
#[cfg(feature = "s3")]
pub use store::{S3Settings, S3Store};
pub use version::{latest, try_latest};
