//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::{Notify, Semaphore};

use crate::error::StorageError;
use crate::storage::kv::{KeyValueStore, MemoryKeyValueStore};
use crate::sync::remote::AttendanceApi;
use crate::sync::types::{AttendanceBatch, RemoteError};

/// Scriptable [`AttendanceApi`] that logs every batch it receives.
pub struct FakeApi {
    calls: Mutex<Vec<AttendanceBatch>>,
    failures: Mutex<HashMap<String, String>>,
    holding: AtomicBool,
    gate: Semaphore,
    entered: Notify,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            holding: AtomicBool::new(false),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    pub fn calls(&self) -> Vec<AttendanceBatch> {
        self.calls.lock().unwrap().clone()
    }

    /// Reject every batch for `lecture_id` with `message`.
    pub fn fail_lecture(&self, lecture_id: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(lecture_id.to_string(), message.to_string());
    }

    pub fn heal_lecture(&self, lecture_id: &str) {
        self.failures.lock().unwrap().remove(lecture_id);
    }

    /// Block every call until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.holding.store(true, Ordering::SeqCst);
    }

    /// Let one held call through.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Stop holding and let every waiting call through.
    pub fn release_all(&self) {
        self.holding.store(false, Ordering::SeqCst);
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Wait until a call has reached the API.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl AttendanceApi for FakeApi {
    async fn record_batch(&self, batch: &AttendanceBatch) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(batch.clone());
        self.entered.notify_one();

        if self.holding.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        let failure = self.failures.lock().unwrap().get(&batch.lecture_id).cloned();
        match failure {
            Some(message) => Err(RemoteError::Rejected {
                status: 422,
                message,
            }),
            None => Ok(()),
        }
    }
}

/// [`MemoryKeyValueStore`] with switchable read and write failures.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryKeyValueStore,
    fail_all_writes: AtomicBool,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
}

fn injected() -> std::io::Error {
    std::io::Error::new(ErrorKind::Other, "injected failure")
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryKeyValueStore {
        &self.inner
    }

    pub fn fail_reads_for(&self, key: &str) {
        self.failing_reads.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_all_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes_for(&self, key: &str) {
        self.failing_writes.lock().unwrap().insert(key.to_string());
    }

    fn write_blocked(&self, key: &str) -> bool {
        self.fail_all_writes.load(Ordering::SeqCst)
            || self.failing_writes.lock().unwrap().contains(key)
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.failing_reads.lock().unwrap().contains(key) {
            return Err(StorageError::ReadFailed {
                key: key.to_string(),
                source: injected(),
            });
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.write_blocked(key) {
            return Err(StorageError::WriteFailed {
                key: key.to_string(),
                source: injected(),
            });
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.write_blocked(key) {
            return Err(StorageError::RemoveFailed {
                key: key.to_string(),
                source: injected(),
            });
        }
        self.inner.remove(key).await
    }
}

/// [`MemoryKeyValueStore`] whose writes can be paused at a gate.
pub struct GatedStore {
    inner: MemoryKeyValueStore,
    holding: AtomicBool,
    gate: Semaphore,
    entered: Notify,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryKeyValueStore::new(),
            holding: AtomicBool::new(false),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    /// Block every `set` until [`release_writes`](Self::release_writes).
    pub fn hold_writes(&self) {
        self.holding.store(true, Ordering::SeqCst);
    }

    pub fn release_writes(&self) {
        self.holding.store(false, Ordering::SeqCst);
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Wait until a held write has reached the store.
    pub async fn wait_write_entered(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl KeyValueStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.holding.load(Ordering::SeqCst) {
            self.entered.notify_one();
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}
