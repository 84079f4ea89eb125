//! Evernote note-store adapter.
//!
//! # Responsibility
//! - Speak the note store's Thrift binary protocol over HTTP.
//! - Translate EDAM exceptions into `NoteStoreError` classes.
//!
//! # See also
//! - `sync::provider::NoteStore` for the contract implemented here.

mod note_store;
pub mod thrift;

pub use note_store::{EvernoteNoteStore, EvernoteOptions};
