//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;

/// Maximum key length accepted by any backend.
pub const MAX_KEY_LEN: usize = 512;

/// Namespaced durable key/value storage beneath the content cache.
///
/// Every backend implements this independently; there is no shared base state.
/// All operations except `open` and `close` fail with
/// [`StorageError::StoreNotOpen`] until `open` has been called.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    /// Acquire the backing handle. Idempotent.
    async fn open(&self) -> StorageResult<()>;

    /// Release the backing handle. Safe to call more than once.
    async fn close(&self) -> StorageResult<()>;

    /// Whether `open` has been called and `close` has not.
    fn is_open(&self) -> bool;

    /// Store `data` under `key`, replacing any previous value atomically.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Fetch the value under `key`, or [`StorageError::NotFound`].
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Check whether `key` holds a value.
    async fn has(&self, key: &str) -> StorageResult<bool>;

    /// Remove the value under `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List keys starting with `prefix`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Static identifier for the backend type (e.g., "filesystem"), used for logging.
    fn backend_name(&self) -> &'static str;
}

/// Validate a datastore key.
///
/// Keys are `/`-separated relative paths of `[A-Za-z0-9._-]` segments, with no
/// empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StorageError::InvalidKey(format!(
            "key too long: {} bytes (max: {MAX_KEY_LEN})",
            key.len()
        )));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StorageError::InvalidKey(format!(
                "unsafe path segment in key: {key}"
            )));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(StorageError::InvalidKey(format!(
                "invalid character in key: {key}"
            )));
        }
    }
    Ok(())
}

/// Validate a listing prefix. An empty prefix lists everything.
pub fn validate_prefix(prefix: &str) -> StorageResult<()> {
    match prefix.strip_suffix('/') {
        _ if prefix.is_empty() => Ok(()),
        Some(dir) => validate_key(dir),
        None => validate_key(prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_namespaced_keys() {
        validate_key("blocks/CIQABCDEF234567").unwrap();
        validate_key("config/retrieval.json").unwrap();
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        for key in ["", "/abs", "a//b", "a/../b", "..", "./a", "a/", "a\\b", "a b"] {
            assert!(validate_key(key).is_err(), "accepted {key:?}");
        }
    }

    #[test]
    fn test_validate_key_rejects_oversized() {
        let key = "a".repeat(MAX_KEY_LEN + 1);
        assert!(validate_key(&key).is_err());
    }

    #[test]
    fn test_validate_prefix() {
        validate_prefix("").unwrap();
        validate_prefix("blocks/").unwrap();
        validate_prefix("blocks/CIQ").unwrap();
        assert!(validate_prefix("../").is_err());
    }
}
