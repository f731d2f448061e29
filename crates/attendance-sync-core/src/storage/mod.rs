mod config;
pub mod kv;
pub mod record_store;

pub use config::{ApiConfig, Config, SyncConfig};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use record_store::{BatchSettlement, Bucket, RecordStore, StoreState, DEFAULT_MAX_CACHED_LECTURES};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/attendance-sync[-dev]/` based on ATTENDANCE_SYNC_ENV.
///
/// Set ATTENDANCE_SYNC_ENV=dev to use the development data directory, or
/// ATTENDANCE_SYNC_HOME to use an explicit directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("ATTENDANCE_SYNC_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("ATTENDANCE_SYNC_ENV")
                .unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("attendance-sync-dev")
            } else {
                base_dir.join("attendance-sync")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Directory holding the record store's bucket files.
pub fn store_dir() -> Result<PathBuf, ConfigError> {
    Ok(data_dir()?.join("store"))
}
