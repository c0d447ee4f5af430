//! Response metadata kept next to cached payloads.

use serde::{Deserialize, Serialize};

/// Response headers an entry was first served with, replayed on cache hits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Header name and value pairs, in the order they were served.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl EntryMeta {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Decode from the persisted JSON form.
    pub fn from_json(bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Encode to the persisted JSON form.
    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_meta_json_form() {
        let meta = EntryMeta {
            headers: vec![("content-type".to_string(), "text/html".to_string())],
        };
        let json = meta.to_json().unwrap();
        assert_eq!(json, br#"{"headers":[["content-type","text/html"]]}"#);
        assert_eq!(EntryMeta::from_json(&json).unwrap(), meta);
    }

    #[test]
    fn test_entry_meta_tolerates_missing_headers() {
        assert!(EntryMeta::from_json(b"{}").unwrap().is_empty());
        assert!(EntryMeta::from_json(b"[1, 2]").is_err());
    }
}
