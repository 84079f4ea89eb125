//! Ledger entry model.
//!
//! # Responsibility
//! - Describe the persisted link between one gist and one remote note.
//!
//! # Invariants
//! - `content_hash` is the hash observed at the last successful sync.
//! - Entries are created on first sync and never deleted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One synced item as stored in `ledger.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub item_id: String,
    pub content_hash: String,
    /// Opaque remote note reference (Evernote note GUID).
    pub artifact_ref: String,
    #[serde(default)]
    pub raw_fields: BTreeMap<String, Value>,
}

impl LedgerEntry {
    pub fn new(
        item_id: impl Into<String>,
        content_hash: impl Into<String>,
        artifact_ref: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            content_hash: content_hash.into(),
            artifact_ref: artifact_ref.into(),
            raw_fields: BTreeMap::new(),
        }
    }

    pub fn with_raw_fields(mut self, raw_fields: BTreeMap<String, Value>) -> Self {
        self.raw_fields = raw_fields;
        self
    }
}
