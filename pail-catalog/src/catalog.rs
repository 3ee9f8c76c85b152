//! # Catalog Document
//!
//! The in-memory model of the single persisted catalog blob: a JSON object
//! mapping canonical package name to the list of its version records.
//!
//! ```json
//! {
//!   "requests": [
//!     {"name": "requests", "filename": "requests-2.25.1.tar.gz", "version": "2.25.1",
//!      "pyver": "", "url": "requests/requests-2.25.1.tar.gz",
//!      "md5_digest": "...", "summary": "HTTP for Humans"}
//!   ]
//! }
//! ```
//!
//! Every key maps to a non-empty, append-ordered list. [`Catalog::insert`]
//! keeps `version` unique within a package and `url` unique across the
//! catalog. Documents written by other tooling may already break those rules;
//! such records are kept as they are so a later save does not lose them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::CatalogError;
use crate::record::PackageRecord;
use crate::version;

/// Mapping from canonical package name to its version records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    packages: BTreeMap<String, Vec<PackageRecord>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a catalog document.
    ///
    /// Records are kept verbatim, including duplicate versions or records
    /// filed under another name. Keys with no records are dropped.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut packages: BTreeMap<String, Vec<PackageRecord>> = serde_json::from_slice(bytes)?;
        packages.retain(|key, records| {
            if records.is_empty() {
                debug!(key = %key, "Dropping catalog key without records");
            }
            !records.is_empty()
        });

        let catalog = Catalog { packages };
        for (key, records) in catalog.iter() {
            if records.iter().any(|r| r.name != key) {
                warn!(key = %key, "Catalog key holds records filed under another name");
            }
        }
        Ok(catalog)
    }

    /// Encode the catalog as the persisted JSON document.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Total number of version records across all packages.
    pub fn record_count(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }

    /// Canonical package names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PackageRecord])> {
        self.packages
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    /// All records of a package. `name` must already be canonical.
    pub fn get(&self, name: &str) -> Option<&[PackageRecord]> {
        self.packages.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.get(name)
            .is_some_and(|records| records.iter().any(|r| r.version == version))
    }

    /// Record of a package by its uploaded file name.
    pub fn find_file(&self, name: &str, file_name: &str) -> Option<&PackageRecord> {
        self.get(name)?.iter().find(|r| r.file_name == file_name)
    }

    /// The record holding the package's latest version.
    pub fn latest(&self, name: &str) -> Option<&PackageRecord> {
        let records = self.get(name)?;
        latest_record(records.iter())
    }

    /// Whether any record's artifact lives at blob key `key`.
    pub fn location_in_use(&self, key: &str) -> bool {
        self.packages
            .values()
            .flatten()
            .any(|r| r.artifact_key() == key)
    }

    /// Append a record, refusing a version the package already has or an
    /// artifact location another record points at.
    pub fn insert(&mut self, record: PackageRecord) -> Result<(), CatalogError> {
        if self.contains(&record.name, &record.version)
            || self.location_in_use(record.artifact_key())
        {
            return Err(CatalogError::AlreadyExists {
                name: record.name,
                version: record.version,
            });
        }
        self.packages
            .entry(record.name.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    /// Drop every record matching `(name, version)`.
    ///
    /// Returns whether anything was removed. A package left without versions
    /// disappears from the catalog.
    pub fn remove(&mut self, name: &str, version: &str) -> bool {
        let Some(records) = self.packages.get_mut(name) else {
            return false;
        };
        let before = records.len();
        records.retain(|r| r.version != version);
        let removed = records.len() != before;
        if records.is_empty() {
            self.packages.remove(name);
        }
        removed
    }
}

/// Pick the record carrying the latest of the given records' versions.
///
/// The first record whose version equals the resolved latest wins.
pub fn latest_record<'a, I>(records: I) -> Option<&'a PackageRecord>
where
    I: Iterator<Item = &'a PackageRecord> + Clone,
{
    let versions: Vec<&str> = records.clone().map(|r| r.version.as_str()).collect();
    let latest = version::latest(&versions)?;
    records.into_iter().find(|r| r.version == latest)
}
