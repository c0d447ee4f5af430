//! Content identifiers and their datastore key encoding.

use cid::Cid;
use multibase::Base;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Multicodec code for raw binary content.
pub const RAW_CODEC: u64 = 0x55;

/// Namespace under which content entries live in a datastore.
pub const BLOCK_KEY_PREFIX: &str = "blocks/";

/// Namespace for the response metadata kept next to each entry.
pub const META_KEY_PREFIX: &str = "meta/";

/// A self-describing content identifier (CIDv0 or CIDv1).
///
/// Two identifiers are equal iff their encoded bytes are equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(Cid);

impl ContentId {
    /// Wrap an already parsed CID.
    pub fn from_cid(cid: Cid) -> Self {
        Self(cid)
    }

    /// Get the underlying CID.
    pub fn as_cid(&self) -> &Cid {
        &self.0
    }

    /// Parse from the textual form (`bafy...`, `bafk...`, `Qm...`).
    pub fn parse(s: &str) -> crate::Result<Self> {
        Cid::from_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidCid(format!("{s}: {e}")))
    }

    /// Compute the CIDv1 (raw codec, sha2-256) of a payload.
    pub fn for_raw_bytes(data: &[u8]) -> Self {
        Self(Cid::new_v1(RAW_CODEC, Code::Sha2_256.digest(data)))
    }

    /// Multihash bytes: varint code, varint digest length, digest.
    pub fn multihash_bytes(&self) -> Vec<u8> {
        self.0.hash().to_bytes()
    }

    /// Whether the identifier addresses raw bytes (so the payload hash can be checked directly).
    pub fn is_raw(&self) -> bool {
        self.0.codec() == RAW_CODEC
    }

    /// Check that `data` hashes to this identifier's digest.
    ///
    /// Returns false for hash functions the code table does not know.
    pub fn verify(&self, data: &[u8]) -> bool {
        match Code::try_from(self.0.hash().code()) {
            Ok(code) => code.digest(data) == *self.0.hash(),
            Err(_) => false,
        }
    }

    /// Encode as a namespaced datastore key: `blocks/<BASE32 multihash>`.
    ///
    /// Only the multihash is encoded, so the CIDv0 and CIDv1 forms of the same
    /// digest share one entry.
    pub fn datastore_key(&self) -> String {
        format!("{BLOCK_KEY_PREFIX}{}", encode_base32(&self.multihash_bytes()))
    }

    /// Key of the response metadata stored alongside the entry:
    /// `meta/<BASE32 multihash>`.
    pub fn meta_key(&self) -> String {
        format!("{META_KEY_PREFIX}{}", encode_base32(&self.multihash_bytes()))
    }
}

fn encode_base32(bytes: &[u8]) -> String {
    // multibase prefixes the output with its base code ('B')
    let mut encoded = multibase::encode(Base::Base32Upper, bytes);
    encoded.remove(0);
    encoded
}

impl FromStr for ContentId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // CIDv1 (dag-pb) commonly used in gateway examples.
    const DAG_PB: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    #[test]
    fn test_parse_and_display_roundtrip() {
        let id = ContentId::parse(DAG_PB).unwrap();
        assert_eq!(id.to_string(), DAG_PB);
        assert!(!id.is_raw());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ContentId::parse("not-a-cid").is_err());
        assert!(ContentId::parse("").is_err());
    }

    #[test]
    fn test_raw_bytes_identifier_verifies_payload() {
        let id = ContentId::for_raw_bytes(b"hello world");
        assert!(id.is_raw());
        assert!(id.verify(b"hello world"));
        assert!(!id.verify(b"hello world!"));
        assert!(id.to_string().starts_with("bafkrei"));
    }

    #[test]
    fn test_datastore_key_is_namespaced_base32() {
        let id = ContentId::for_raw_bytes(b"payload");
        let key = id.datastore_key();
        let encoded = key.strip_prefix(BLOCK_KEY_PREFIX).unwrap();
        // sha2-256 multihash (0x12 0x20 ...) always encodes with this prefix
        assert!(encoded.starts_with("CIQ"), "unexpected key: {key}");
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        );
    }

    #[test]
    fn test_datastore_key_ignores_codec() {
        let dag_pb = ContentId::parse(DAG_PB).unwrap();
        let raw = ContentId::from_cid(Cid::new_v1(RAW_CODEC, *dag_pb.as_cid().hash()));
        assert_ne!(raw, dag_pb);
        assert_eq!(raw.datastore_key(), dag_pb.datastore_key());
    }

    #[test]
    fn test_meta_key_shares_encoding_with_datastore_key() {
        let id = ContentId::for_raw_bytes(b"payload");
        let meta = id.meta_key();
        assert_eq!(
            meta.strip_prefix(META_KEY_PREFIX),
            id.datastore_key().strip_prefix(BLOCK_KEY_PREFIX)
        );
    }

    #[test]
    fn test_distinct_content_gives_distinct_keys() {
        let a = ContentId::for_raw_bytes(b"a");
        let b = ContentId::for_raw_bytes(b"b");
        assert_ne!(a.datastore_key(), b.datastore_key());
    }

    #[test]
    fn test_serde_uses_text_form() {
        let id = ContentId::parse(DAG_PB).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{DAG_PB}\""));
        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
