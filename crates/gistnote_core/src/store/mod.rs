//! JSON state-file storage for the sync ledger.
//!
//! # Responsibility
//! - Prepare the state directory that holds ledger files.
//! - Read and wholesale-rewrite JSON documents durably.
//!
//! # Invariants
//! - A write either fully replaces the target file or leaves it untouched.
//! - A write returns only after data is flushed to disk.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod files;
mod open;

pub use files::{read_json, write_json_atomic};
pub use open::open_state_dir;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    InvalidStateDir(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "i/o error on `{}`: {source}", path.display()),
            Self::Json { path, source } => {
                write!(f, "malformed state file `{}`: {source}", path.display())
            }
            Self::InvalidStateDir(message) => write!(f, "invalid state directory: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::InvalidStateDir(_) => None,
        }
    }
}
