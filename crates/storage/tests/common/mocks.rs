use async_trait::async_trait;
use bytes::Bytes;
use pantry_storage::error::{StorageError, StorageResult};
use pantry_storage::{Datastore, MemoryDatastore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Datastore whose reads fail with an I/O error while writes succeed.
#[allow(dead_code)]
pub struct BrokenDatastore;

#[allow(dead_code)]
impl BrokenDatastore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }

    fn failure() -> StorageError {
        StorageError::Io(std::io::Error::other("disk on fire"))
    }
}

#[async_trait]
impl Datastore for BrokenDatastore {
    async fn open(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> StorageResult<Bytes> {
        Err(Self::failure())
    }

    async fn has(&self, _key: &str) -> StorageResult<bool> {
        Err(Self::failure())
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn list(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        Err(Self::failure())
    }

    fn backend_name(&self) -> &'static str {
        "broken"
    }
}

/// Wraps a memory datastore and counts calls per operation.
#[allow(dead_code)]
pub struct CountingDatastore {
    inner: MemoryDatastore,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

#[allow(dead_code)]
impl CountingDatastore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryDatastore::new(),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        })
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Datastore for CountingDatastore {
    async fn open(&self) -> StorageResult<()> {
        self.inner.open().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        self.inner.has(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}
