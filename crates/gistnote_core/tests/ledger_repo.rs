use gistnote_core::repo::ledger_repo::{LEDGER_ENV_FILE_NAME, LEDGER_FILE_NAME};
use gistnote_core::{open_state_dir, JsonLedger, LedgerEntry, LedgerError, LedgerRepository};
use serde_json::Value;
use std::collections::BTreeMap;

#[test]
fn fresh_state_dir_starts_cold_and_empty() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = JsonLedger::open(dir.path()).unwrap();

    assert!(ledger.is_empty());
    assert!(ledger.is_cold_start());
    assert!(ledger.last_sync_at().is_none());
    assert!(ledger.get("g1").is_none());
    assert!(!dir.path().join(LEDGER_FILE_NAME).exists());
}

#[test]
fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut raw_fields = BTreeMap::new();
    raw_fields.insert("name".to_string(), Value::String("abc123".to_string()));

    {
        let mut ledger = JsonLedger::open(dir.path()).unwrap();
        ledger
            .save(LedgerEntry::new("g1", "hash-1", "note-1").with_raw_fields(raw_fields.clone()))
            .unwrap();
        ledger.save(LedgerEntry::new("g2", "hash-2", "note-2")).unwrap();
    }

    let ledger = JsonLedger::open(dir.path()).unwrap();
    assert!(!ledger.is_empty());
    let entry = ledger.get("g1").unwrap();
    assert_eq!(entry.content_hash, "hash-1");
    assert_eq!(entry.artifact_ref, "note-1");
    assert_eq!(entry.raw_fields, raw_fields);
    assert_eq!(ledger.get("g2").unwrap().artifact_ref, "note-2");
    assert!(ledger.last_sync_at().is_some());
}

#[test]
fn update_replaces_entry_and_advances_sync_at() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = JsonLedger::open(dir.path()).unwrap();

    ledger.save(LedgerEntry::new("g3", "abc", "note-3")).unwrap();
    let first_sync = ledger.last_sync_at().unwrap();
    ledger.update(LedgerEntry::new("g3", "def", "note-3")).unwrap();

    let reopened = JsonLedger::open(dir.path()).unwrap();
    let entry = reopened.get("g3").unwrap();
    assert_eq!(entry.content_hash, "def");
    assert_eq!(entry.artifact_ref, "note-3");
    assert_eq!(reopened.state().entries.len(), 1);
    assert!(reopened.last_sync_at().unwrap() >= first_sync);
}

#[test]
fn cold_start_flag_persists() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ledger = JsonLedger::open(dir.path()).unwrap();
        ledger.set_cold_start(false).unwrap();
    }
    assert!(!JsonLedger::open(dir.path()).unwrap().is_cold_start());

    {
        let mut ledger = JsonLedger::open(dir.path()).unwrap();
        ledger.set_cold_start(true).unwrap();
    }
    assert!(JsonLedger::open(dir.path()).unwrap().is_cold_start());
}

#[test]
fn ledger_file_is_keyed_by_item_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = JsonLedger::open(dir.path()).unwrap();
    ledger.save(LedgerEntry::new("g1", "h", "n")).unwrap();

    let raw = std::fs::read_to_string(dir.path().join(LEDGER_FILE_NAME)).unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["g1"]["item_id"], "g1");
    assert_eq!(value["g1"]["content_hash"], "h");
    assert_eq!(value["g1"]["artifact_ref"], "n");
}

#[test]
fn mismatched_entry_key_is_rejected_on_open() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(LEDGER_FILE_NAME),
        r#"{"g1": {"item_id": "g9", "content_hash": "h", "artifact_ref": "n"}}"#,
    )
    .unwrap();

    let err = JsonLedger::open(dir.path()).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidEntry(_)));
}

#[test]
fn corrupt_env_file_is_a_store_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(LEDGER_ENV_FILE_NAME), "{not json").unwrap();

    let err = JsonLedger::open(dir.path()).unwrap_err();
    assert!(matches!(err, LedgerError::Store(_)));
}

#[test]
fn open_state_dir_creates_nested_directories() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");

    let opened = open_state_dir(&nested).unwrap();
    assert!(opened.is_dir());

    let mut ledger = JsonLedger::open(&opened).unwrap();
    ledger.save(LedgerEntry::new("g1", "h", "n")).unwrap();
    assert!(nested.join(LEDGER_FILE_NAME).is_file());
    assert!(nested.join(LEDGER_ENV_FILE_NAME).is_file());
}

#[test]
fn finish_pass_moves_cursor_and_entry_writes_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let started_at = chrono::Utc::now();
    {
        let mut ledger = JsonLedger::open(dir.path()).unwrap();
        ledger.save(LedgerEntry::new("g1", "h", "n")).unwrap();
        assert!(ledger.last_pass_at().is_none());
        ledger.finish_pass(started_at, false).unwrap();
        ledger.update(LedgerEntry::new("g1", "h2", "n")).unwrap();
    }

    let ledger = JsonLedger::open(dir.path()).unwrap();
    assert_eq!(ledger.last_pass_at(), Some(started_at));
    assert!(!ledger.is_cold_start());
    assert!(ledger.last_sync_at().unwrap() >= started_at);

    let raw = std::fs::read_to_string(dir.path().join(LEDGER_ENV_FILE_NAME)).unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert!(value["pass_at"].is_string());
}
