use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

use super::{validate_key, Blob, BlobStore, PutCondition};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct Objects {
    generation: u64,
    entries: HashMap<String, (Bytes, String)>,
}

/// In-process blob store. ETags are a store-wide generation counter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<Objects>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Objects> {
        // A panic while holding the lock cannot leave the map half-written.
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes under `key`, bypassing the async interface.
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        self.lock().entries.get(key).map(|(bytes, _)| bytes.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Blob> {
        validate_key(key)?;
        let objects = self.lock();
        let (bytes, etag) = objects
            .entries
            .get(key)
            .ok_or_else(|| StoreError::not_found(key))?;
        Ok(Blob {
            bytes: bytes.clone(),
            etag: Some(etag.clone()),
        })
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        condition: PutCondition,
    ) -> StoreResult<Option<String>> {
        validate_key(key)?;
        let mut objects = self.lock();
        let current = objects.entries.get(key).map(|(_, etag)| etag.as_str());
        let allowed = match (&condition, current) {
            (PutCondition::Always, _) => true,
            (PutCondition::IfAbsent, existing) => existing.is_none(),
            (PutCondition::IfMatch(expected), Some(existing)) => expected == existing,
            (PutCondition::IfMatch(_), None) => false,
        };
        if !allowed {
            return Err(StoreError::PreconditionFailed {
                key: key.to_string(),
            });
        }

        objects.generation += 1;
        let etag = format!("\"{}\"", objects.generation);
        objects
            .entries
            .insert(key.to_string(), (bytes, etag.clone()));
        Ok(Some(etag))
    }

    async fn stat(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        Ok(self.lock().entries.contains_key(key))
    }

    async fn presign(&self, key: &str, _ttl: Duration, _name: &str) -> StoreResult<Option<Url>> {
        validate_key(key)?;
        Ok(None)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
