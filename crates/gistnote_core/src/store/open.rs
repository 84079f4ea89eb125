//! State directory bootstrap.

use super::{StoreError, StoreResult};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Creates (if needed) and validates the directory holding ledger files.
///
/// # Side effects
/// - Creates missing parent directories.
/// - Emits `state_open` logging events with duration and status.
pub fn open_state_dir(path: impl AsRef<Path>) -> StoreResult<PathBuf> {
    let started_at = Instant::now();
    let dir = path.as_ref().to_path_buf();
    info!("event=state_open module=store status=start");

    if dir.as_os_str().is_empty() {
        error!("event=state_open module=store status=error error_code=empty_path");
        return Err(StoreError::InvalidStateDir(
            "state_dir cannot be empty".to_string(),
        ));
    }

    if dir.exists() && !dir.is_dir() {
        error!("event=state_open module=store status=error error_code=not_a_directory");
        return Err(StoreError::InvalidStateDir(format!(
            "`{}` exists and is not a directory",
            dir.display()
        )));
    }

    if let Err(source) = std::fs::create_dir_all(&dir) {
        error!(
            "event=state_open module=store status=error duration_ms={} error_code=create_failed error={}",
            started_at.elapsed().as_millis(),
            source
        );
        return Err(StoreError::Io { path: dir, source });
    }

    info!(
        "event=state_open module=store status=ok duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(dir)
}
