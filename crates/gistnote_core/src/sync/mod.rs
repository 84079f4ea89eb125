//! Gist-to-note synchronization.
//!
//! # Responsibility
//! - Define collaborator seams (`provider`).
//! - Run create / update / skip passes over listed gists (`orchestrator`).

pub mod orchestrator;
pub mod provider;
