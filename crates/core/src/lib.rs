//! Core domain types and shared logic for the Pantry content proxy.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content identifiers and their datastore key encoding
//! - Content paths derived from intercepted requests
//! - Response metadata stored with cached entries
//! - Configuration, including the persisted retrieval record

pub mod config;
pub mod content_id;
pub mod content_path;
pub mod entry;
pub mod error;

pub use config::{AppConfig, RetrievalConfig};
pub use content_id::ContentId;
pub use content_path::ContentPath;
pub use entry::EntryMeta;
pub use error::{Error, Result};

/// Datastore key of the reserved retrieval configuration slot.
pub const CONFIG_SLOT_KEY: &str = "config/retrieval.json";
