//! Sync ledger contracts and JSON-file implementation.
//!
//! # Responsibility
//! - Track, per gist, the last synced content hash and remote note reference.
//! - Track the process-wide cold-start flag, last write time and the
//!   listing cursor of the last completed pass.
//!
//! # Invariants
//! - Every mutation rewrites the changed files wholesale and flushes them
//!   before returning.
//! - `ledger_env.json` is written before `ledger.json`. The two files commit
//!   independently: a failed `ledger.json` write can leave only a newer
//!   `sync_at` on disk, never an entry the in-memory state lacks.
//! - A failed write leaves the in-memory state at its last committed value.
//! - `pass_at` only moves through `finish_pass`; entry writes never touch it.
//! - A missing state directory content means `cold_start = true`.
//!
//! # See also
//! - `store` for the durable write primitive.

use crate::model::ledger::LedgerEntry;
use crate::store::{read_json, write_json_atomic, StoreError};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const LEDGER_FILE_NAME: &str = "ledger.json";
pub const LEDGER_ENV_FILE_NAME: &str = "ledger_env.json";

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug)]
pub enum LedgerError {
    Store(StoreError),
    InvalidEntry(String),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidEntry(message) => write!(f, "invalid ledger entry: {message}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::InvalidEntry(_) => None,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Ledger interface used by the sync orchestrator.
///
/// `save` and `update` are both upserts; the split only mirrors whether the
/// orchestrator created or updated the remote note.
pub trait LedgerRepository {
    fn is_empty(&self) -> bool;
    fn is_cold_start(&self) -> bool;
    fn last_sync_at(&self) -> Option<DateTime<Utc>>;
    /// Start time of the last pass that ran to completion; the listing cursor.
    fn last_pass_at(&self) -> Option<DateTime<Utc>>;
    fn get(&self, item_id: &str) -> Option<&LedgerEntry>;
    fn upsert(&mut self, entry: LedgerEntry) -> LedgerResult<()>;
    fn set_cold_start(&mut self, cold_start: bool) -> LedgerResult<()>;
    /// Records a completed pass that started at `started_at`.
    fn finish_pass(&mut self, started_at: DateTime<Utc>, cold_start: bool) -> LedgerResult<()>;

    fn save(&mut self, entry: LedgerEntry) -> LedgerResult<()> {
        self.upsert(entry)
    }

    fn update(&mut self, entry: LedgerEntry) -> LedgerResult<()> {
        self.upsert(entry)
    }
}

/// Contents of `ledger_env.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEnv {
    pub cold_start: bool,
    /// ISO-8601 time of the last ledger mutation.
    pub sync_at: Option<DateTime<Utc>>,
    /// ISO-8601 start time of the last completed pass.
    #[serde(default)]
    pub pass_at: Option<DateTime<Utc>>,
}

impl Default for LedgerEnv {
    fn default() -> Self {
        Self {
            cold_start: true,
            sync_at: None,
            pass_at: None,
        }
    }
}

/// Full in-memory ledger state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub entries: BTreeMap<String, LedgerEntry>,
    pub env: LedgerEnv,
}

/// Ledger persisted as two JSON files in one state directory.
#[derive(Debug)]
pub struct JsonLedger {
    entries_path: PathBuf,
    env_path: PathBuf,
    state: LedgerState,
}

impl JsonLedger {
    /// Loads ledger files from `state_dir`, starting cold when none exist.
    ///
    /// A ledger file without its env sibling is loaded with `cold_start = true`.
    pub fn open(state_dir: impl AsRef<Path>) -> LedgerResult<Self> {
        let dir = state_dir.as_ref();
        let entries_path = dir.join(LEDGER_FILE_NAME);
        let env_path = dir.join(LEDGER_ENV_FILE_NAME);

        let entries: BTreeMap<String, LedgerEntry> =
            read_json(&entries_path)?.unwrap_or_default();
        let env: LedgerEnv = read_json(&env_path)?.unwrap_or_default();

        for (key, entry) in &entries {
            if key != &entry.item_id {
                return Err(LedgerError::InvalidEntry(format!(
                    "key `{key}` does not match item_id `{}`",
                    entry.item_id
                )));
            }
        }

        info!(
            "event=ledger_open module=ledger status=ok entries={} cold_start={}",
            entries.len(),
            env.cold_start
        );

        Ok(Self {
            entries_path,
            env_path,
            state: LedgerState { entries, env },
        })
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    fn persist(&self, entries_changed: bool) -> LedgerResult<()> {
        write_json_atomic(&self.env_path, &self.state.env)?;
        if entries_changed {
            write_json_atomic(&self.entries_path, &self.state.entries)?;
        }
        Ok(())
    }

    fn commit(&mut self, next: LedgerState) -> LedgerResult<()> {
        let entries_changed = next.entries != self.state.entries;
        let previous = std::mem::replace(&mut self.state, next);
        if let Err(err) = self.persist(entries_changed) {
            error!(
                "event=ledger_write module=ledger status=error error={}",
                err
            );
            self.state = previous;
            return Err(err);
        }
        Ok(())
    }
}

impl LedgerRepository for JsonLedger {
    fn is_empty(&self) -> bool {
        self.state.entries.is_empty()
    }

    fn is_cold_start(&self) -> bool {
        self.state.env.cold_start
    }

    fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.state.env.sync_at
    }

    fn last_pass_at(&self) -> Option<DateTime<Utc>> {
        self.state.env.pass_at
    }

    fn get(&self, item_id: &str) -> Option<&LedgerEntry> {
        self.state.entries.get(item_id)
    }

    fn upsert(&mut self, entry: LedgerEntry) -> LedgerResult<()> {
        if entry.item_id.trim().is_empty() {
            return Err(LedgerError::InvalidEntry("item_id is empty".to_string()));
        }

        let mut next = self.state.clone();
        debug!(
            "event=ledger_upsert module=ledger item_id={} replaced={}",
            entry.item_id,
            next.entries.contains_key(&entry.item_id)
        );
        next.entries.insert(entry.item_id.clone(), entry);
        next.env.sync_at = Some(Utc::now());
        self.commit(next)
    }

    fn set_cold_start(&mut self, cold_start: bool) -> LedgerResult<()> {
        let mut next = self.state.clone();
        next.env.cold_start = cold_start;
        self.commit(next)?;
        info!(
            "event=ledger_cold_start module=ledger status=ok cold_start={}",
            cold_start
        );
        Ok(())
    }

    fn finish_pass(&mut self, started_at: DateTime<Utc>, cold_start: bool) -> LedgerResult<()> {
        let mut next = self.state.clone();
        next.env.pass_at = Some(started_at);
        next.env.cold_start = cold_start;
        self.commit(next)?;
        info!(
            "event=ledger_pass module=ledger status=ok pass_at={} cold_start={}",
            started_at.to_rfc3339(),
            cold_start
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        JsonLedger, LedgerEnv, LedgerRepository, LEDGER_ENV_FILE_NAME, LEDGER_FILE_NAME,
    };
    use crate::model::ledger::LedgerEntry;

    #[test]
    fn env_defaults_to_cold_start() {
        assert_eq!(
            LedgerEnv::default(),
            LedgerEnv {
                cold_start: true,
                sync_at: None,
                pass_at: None,
            }
        );
    }

    #[test]
    fn upsert_rejects_blank_item_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = JsonLedger::open(dir.path()).unwrap();
        let err = ledger
            .upsert(LedgerEntry::new("  ", "hash", "note"))
            .unwrap_err();
        assert!(err.to_string().contains("item_id is empty"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn env_file_uses_sync_at_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = JsonLedger::open(dir.path()).unwrap();
        ledger.save(LedgerEntry::new("g1", "h", "n")).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(LEDGER_ENV_FILE_NAME)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["cold_start"], serde_json::Value::Bool(true));
        assert!(value["sync_at"].is_string());
    }

    #[test]
    fn env_file_without_pass_at_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(LEDGER_ENV_FILE_NAME),
            r#"{"cold_start": false, "sync_at": "2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();

        let ledger = JsonLedger::open(dir.path()).unwrap();
        assert!(!ledger.is_cold_start());
        assert!(ledger.last_sync_at().is_some());
        assert!(ledger.last_pass_at().is_none());
    }

    #[test]
    fn failed_entries_write_leaves_no_entry_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = JsonLedger::open(dir.path()).unwrap();

        // A non-empty directory at the target path makes the rename fail.
        let blocker = dir.path().join(LEDGER_FILE_NAME);
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        assert!(ledger.save(LedgerEntry::new("g1", "h", "n")).is_err());
        assert!(ledger.get("g1").is_none());
        assert!(ledger.last_sync_at().is_none());

        std::fs::remove_dir_all(&blocker).unwrap();
        let reopened = JsonLedger::open(dir.path()).unwrap();
        assert!(reopened.is_empty());
        assert!(reopened.is_cold_start());
    }
}
