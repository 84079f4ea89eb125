//! Domain model for gist-to-note synchronization.
//!
//! # Responsibility
//! - Define the gist, ledger and outbound note shapes shared across layers.
//!
//! # Invariants
//! - Gists are identified by their stable GitHub id, notes by their GUID.
//! - Ledger entries are never deleted.

pub mod gist;
pub mod ledger;
pub mod note;
