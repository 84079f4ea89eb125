//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the ledger contract consumed by the sync orchestrator.
//! - Isolate JSON file layout from orchestration policy.
//!
//! # Invariants
//! - Repository writes are flushed before returning.

pub mod ledger_repo;
