//! Key-value persistence backends.
//!
//! The engine only needs get/set/remove by string key. No transactions span
//! keys, so every bucket is written on its own and each write must be atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;

/// Persistent string storage addressed by key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One JSON file per key inside a directory.
///
/// Writes go to `<key>.json.tmp`, are flushed to disk and then renamed over
/// `<key>.json`, so a crash leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::Unavailable {
            path: root.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(StorageError::WriteFailed {
                key: key.to_string(),
                source: std::io::Error::new(ErrorKind::InvalidInput, "invalid storage key"),
            });
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)
}

fn join_error(err: tokio::task::JoinError) -> std::io::Error {
    std::io::Error::new(ErrorKind::Other, err.to_string())
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key).map_err(|_| StorageError::ReadFailed {
            key: key.to_string(),
            source: std::io::Error::new(ErrorKind::InvalidInput, "invalid storage key"),
        })?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed {
                key: key.to_string(),
                source: e,
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let contents = value.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&path, &contents))
            .await
            .map_err(join_error)
            .and_then(|r| r)
            .map_err(|e| StorageError::WriteFailed {
                key: key.to_string(),
                source: e,
            })
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key).map_err(|_| StorageError::RemoveFailed {
            key: key.to_string(),
            source: std::io::Error::new(ErrorKind::InvalidInput, "invalid storage key"),
        })?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFailed {
                key: key.to_string(),
                source: e,
            }),
        }
    }
}

/// Process-local store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(key: &str) -> std::io::Error {
    std::io::Error::new(ErrorKind::Other, format!("memory store lock poisoned at '{key}'"))
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::ReadFailed {
            key: key.to_string(),
            source: poisoned(key),
        })?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::WriteFailed {
            key: key.to_string(),
            source: poisoned(key),
        })?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::RemoveFailed {
            key: key.to_string(),
            source: poisoned(key),
        })?;
        entries.remove(key);
        Ok(())
    }
}
