//! The reserved slot holding persisted retrieval parameters.

use crate::error::{StorageError, StorageResult};
use crate::traits::Datastore;
use pantry_core::{CONFIG_SLOT_KEY, RetrievalConfig};
use std::sync::Arc;

/// Reads and writes the JSON-encoded [`RetrievalConfig`] under
/// [`CONFIG_SLOT_KEY`] in the shared datastore.
#[derive(Clone)]
pub struct ConfigSlot {
    store: Arc<dyn Datastore>,
}

impl ConfigSlot {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Load the persisted record. `Ok(None)` when nothing was ever stored.
    pub async fn load(&self) -> StorageResult<Option<RetrievalConfig>> {
        match self.store.get(CONFIG_SLOT_KEY).await {
            Ok(bytes) => RetrievalConfig::from_json(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist a record, replacing any previous one.
    pub async fn store(&self, config: &RetrievalConfig) -> StorageResult<()> {
        let json = config
            .to_json()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.put(CONFIG_SLOT_KEY, json.into()).await
    }
}
