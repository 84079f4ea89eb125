//! Content fingerprinting.
//!
//! # Responsibility
//! - Produce the MD5 fingerprint used for attachment identity in ENML.
//! - Produce the same fingerprint over raw gist text for change detection.
//!
//! # Invariants
//! - Output is always 32 lowercase hex characters.
//! - The function is pure: same bytes, same string.

use md5::{Digest, Md5};

/// Returns the lowercase hex MD5 digest of `bytes`.
pub fn content_hash(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}
