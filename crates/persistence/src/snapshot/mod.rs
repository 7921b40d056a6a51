//! Atomic JSON snapshot files
//!
//! Every persisted table is a whole-file JSON snapshot rewritten on each
//! mutation. Writes go to a sibling `.tmp` file first and are renamed
//! over the canonical path, so a crash mid-write never leaves a
//! truncated file where the next load would find it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use trove_core::{Error, Result};

/// Read and parse a snapshot file. Fails with [`Error::CorruptSnapshot`]
/// when the file exists but cannot be parsed.
pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::CorruptSnapshot(format!("{}: {}", path.display(), e)))
}

/// Load a snapshot, initializing it when absent and resetting it when
/// corrupt.
///
/// A missing file is created with the default value. An unparsable file
/// is logged and rewritten with the default value; the previous contents
/// are considered lost.
pub async fn load_or_init<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    if !tokio::fs::try_exists(path).await? {
        let initial = T::default();
        save_atomic(path, &initial).await?;
        info!("Created new snapshot file: {}", path.display());
        return Ok(initial);
    }

    match load(path).await {
        Ok(value) => Ok(value),
        Err(Error::CorruptSnapshot(msg)) => {
            error!("Corrupt snapshot, reinitializing empty: {}", msg);
            let initial = T::default();
            save_atomic(path, &initial).await?;
            Ok(initial)
        }
        Err(e) => Err(e),
    }
}

/// Serialize `value` and atomically replace the snapshot at `path`
pub async fn save_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // Sibling tmp path keeps the rename on one filesystem
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, json.as_bytes()).await?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::StorageError(format!("rename {}: {}", tmp.display(), e)))?;

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
