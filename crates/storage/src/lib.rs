//! Datastore abstraction and the content-addressed cache for Pantry.
//!
//! This crate provides:
//! - A namespaced key/value [`Datastore`] with explicit open/close
//! - Backends: local filesystem (atomic writes) and in-memory
//! - [`ContentCache`], mapping content identifiers to payloads
//! - [`ConfigSlot`], the persisted retrieval parameters

pub mod backends;
pub mod cache;
pub mod config_slot;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemDatastore, memory::MemoryDatastore};
pub use cache::ContentCache;
pub use config_slot::ConfigSlot;
pub use error::{StorageError, StorageResult};
pub use traits::Datastore;

use pantry_core::config::StorageConfig;
use std::sync::Arc;

/// Create a datastore from configuration. The store is returned unopened.
pub fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn Datastore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path, namespace } => {
            Ok(Arc::new(FilesystemDatastore::new(path, namespace.clone())))
        }
        StorageConfig::Memory => Ok(Arc::new(MemoryDatastore::new())),
    }
}
