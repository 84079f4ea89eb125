//! Gist item model.
//!
//! # Responsibility
//! - Represent one listed gist as consumed by the sync orchestrator.
//!
//! # Invariants
//! - `id` is the stable GitHub node id and the ledger key.
//! - `content_ref` points at raw gist text used for change detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One gist listed from the item source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GistItem {
    /// Stable GitHub node id.
    pub id: String,
    /// URL-safe gist name (the hash-like path segment).
    pub name: String,
    /// Free-form description; empty when the gist has none.
    pub description: String,
    /// Last push time reported by GitHub.
    pub pushed_at: Option<DateTime<Utc>>,
    /// Rendered gist page.
    pub url: String,
    /// Raw content location passed to `ItemSource::fetch_raw`.
    pub content_ref: String,
}

impl GistItem {
    /// Passthrough metadata persisted next to the ledger entry.
    pub fn raw_fields(&self) -> BTreeMap<String, Value> {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), Value::String(self.name.clone()));
        fields.insert(
            "description".to_string(),
            Value::String(self.description.clone()),
        );
        fields.insert("url".to_string(), Value::String(self.url.clone()));
        fields.insert(
            "pushed_at".to_string(),
            self.pushed_at
                .map(|at| Value::String(at.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
        fields
    }
}
