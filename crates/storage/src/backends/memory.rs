//! In-memory datastore backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{Datastore, validate_key, validate_prefix};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-local datastore. Contents survive `close`/`open` but not the process.
pub struct MemoryDatastore {
    entries: DashMap<String, Bytes>,
    open: AtomicBool,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            open: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::StoreNotOpen("memory".to_string()))
        }
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn open(&self) -> StorageResult<()> {
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.ensure_open()?;
        validate_key(key)?;
        self.entries.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.ensure_open()?;
        validate_key(key)?;
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        validate_key(key)?;
        Ok(self.entries.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        validate_prefix(prefix)?;
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
