//! Content-addressed cache over a datastore.

use crate::error::{StorageError, StorageResult};
use crate::traits::Datastore;
use bytes::Bytes;
use pantry_core::{ContentId, EntryMeta};
use pantry_core::content_id::BLOCK_KEY_PREFIX;
use std::sync::Arc;
use tracing::instrument;

/// Maps content identifiers to their payloads.
///
/// Entries are keyed by [`ContentId::datastore_key`], with optional response
/// metadata under [`ContentId::meta_key`]. Values are written as given; the
/// cache never checks that a payload matches its identifier, so callers only
/// store payloads they trust. Nothing is ever evicted.
#[derive(Clone)]
pub struct ContentCache {
    store: Arc<dyn Datastore>,
}

impl ContentCache {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// The underlying datastore.
    pub fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    /// Open the underlying datastore. Idempotent.
    pub async fn open(&self) -> StorageResult<()> {
        self.store.open().await
    }

    /// Close the underlying datastore. Idempotent.
    pub async fn close(&self) -> StorageResult<()> {
        self.store.close().await
    }

    pub fn is_open(&self) -> bool {
        self.store.is_open()
    }

    /// Store a payload. Repeating a put with the same value is harmless.
    #[instrument(skip(self, data), fields(cid = %id, size = data.len()))]
    pub async fn put(&self, id: &ContentId, data: Bytes) -> StorageResult<()> {
        self.store.put(&id.datastore_key(), data).await
    }

    /// Fetch a payload, or [`StorageError::NotFound`].
    #[instrument(skip(self), fields(cid = %id))]
    pub async fn get(&self, id: &ContentId) -> StorageResult<Bytes> {
        self.store.get(&id.datastore_key()).await
    }

    /// Whether a payload is present.
    ///
    /// Implemented as a full read so `has` never disagrees with `get`; only
    /// [`StorageError::NotFound`] maps to `false`, every other error propagates.
    pub async fn has(&self, id: &ContentId) -> StorageResult<bool> {
        match self.get(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove a payload and its metadata. Removing an absent entry is not an error.
    #[instrument(skip(self), fields(cid = %id))]
    pub async fn delete(&self, id: &ContentId) -> StorageResult<()> {
        self.store.delete(&id.datastore_key()).await?;
        self.store.delete(&id.meta_key()).await
    }

    /// Store the response metadata for an entry.
    pub async fn put_meta(&self, id: &ContentId, meta: &EntryMeta) -> StorageResult<()> {
        let json = meta
            .to_json()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.put(&id.meta_key(), json.into()).await
    }

    /// Response metadata for an entry. `Ok(None)` when none was stored.
    pub async fn meta(&self, id: &ContentId) -> StorageResult<Option<EntryMeta>> {
        match self.store.get(&id.meta_key()).await {
            Ok(bytes) => EntryMeta::from_json(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of cached entries.
    pub async fn len(&self) -> StorageResult<usize> {
        Ok(self.store.list(BLOCK_KEY_PREFIX).await?.len())
    }
}
