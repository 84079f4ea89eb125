//! Core of the gist-to-note synchronizer.
//!
//! One pass lists gists, detects changed content by hash, captures each
//! changed gist page as a stitched full-page image and creates or updates
//! a note carrying it. Progress survives restarts through a JSON ledger.

pub mod capture;
pub mod config;
pub mod digest;
pub mod enml;
pub mod evernote;
pub mod github;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;
pub mod sync;
pub mod webdriver;

pub use capture::stitch::{StitchError, StitchLayout, Stitcher};
pub use capture::tile::{CaptureRect, TilePlan, TilePlanError};
pub use config::{ConfigError, SyncConfig};
pub use digest::content_hash;
pub use evernote::{EvernoteNoteStore, EvernoteOptions};
pub use github::{GistClient, GistClientOptions};
pub use logging::{default_log_level, init_logging, logging_status, LogOptions, LoggingError};
pub use model::gist::GistItem;
pub use model::ledger::LedgerEntry;
pub use model::note::{NoteDraft, Resource};
pub use repo::ledger_repo::{JsonLedger, LedgerError, LedgerRepository};
pub use store::{open_state_dir, StoreError};
pub use sync::orchestrator::{
    ItemOutcome, RejectedItem, SyncError, SyncOptions, SyncReport, SyncService,
};
pub use sync::provider::{
    Browser, BrowserError, BrowserLauncher, ItemSource, NoteStore, NoteStoreError, PageMetrics,
    SourceError,
};
pub use webdriver::{WebDriverLauncher, WebDriverOptions};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
