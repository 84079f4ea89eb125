//! Outbound note model.
//!
//! A `NoteDraft` is fully built in memory (content + resources) before any
//! note-store call, so a remote note never exists without its image.

use crate::digest::content_hash;

/// Binary attachment carried by a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub mime: String,
    pub body: Vec<u8>,
    /// Lowercase hex MD5 of `body`; referenced by `<en-media hash>`.
    pub body_hash: String,
}

impl Resource {
    pub fn new(mime: impl Into<String>, body: Vec<u8>) -> Self {
        let body_hash = content_hash(&body);
        Self {
            mime: mime.into(),
            body,
            body_hash,
        }
    }

    pub fn png(body: Vec<u8>) -> Self {
        Self::new("image/png", body)
    }

    /// Raw 16-byte digest as expected by the note-store wire format.
    pub fn body_hash_bytes(&self) -> Vec<u8> {
        hex::decode(&self.body_hash).unwrap_or_default()
    }
}

/// Complete note payload ready for create/update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    /// ENML document.
    pub content: String,
    pub resources: Vec<Resource>,
    /// Target notebook; `None` uses the account default.
    pub notebook_guid: Option<String>,
}
