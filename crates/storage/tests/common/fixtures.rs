use bytes::Bytes;
use pantry_storage::{Datastore, FilesystemDatastore, MemoryDatastore};
use std::sync::Arc;
use tempfile::TempDir;

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output (reproducible tests).
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// An opened filesystem datastore in a fresh temp directory.
/// The directory lives as long as the returned guard.
#[allow(dead_code)]
pub async fn open_filesystem_store() -> (Arc<dyn Datastore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = FilesystemDatastore::new(temp_dir.path(), "test");
    store.open().await.unwrap();
    (Arc::new(store), temp_dir)
}

/// An opened in-memory datastore.
#[allow(dead_code)]
pub async fn open_memory_store() -> Arc<dyn Datastore> {
    let store = MemoryDatastore::new();
    store.open().await.unwrap();
    Arc::new(store)
}
