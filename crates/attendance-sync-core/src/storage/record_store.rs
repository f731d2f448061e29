//! Durable record store: pending attendance records plus offline caches.
//!
//! State lives in memory behind one async mutex and is mirrored into four
//! independent key-value buckets:
//!
//! - `pending_records`: every record not yet pruned, synced or not
//! - `cached_lectures`: FIFO-capped lecture snapshots
//! - `cached_students`: course id to roster
//! - `last_sync`: time of the last completed sync run
//!
//! A bucket that cannot be read or parsed loads as empty; the others are
//! unaffected.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::attendance::{AttendanceRecord, LectureDetail, LectureSnapshot, NewAttendance, Student};
use crate::error::StorageError;
use crate::storage::kv::KeyValueStore;
use crate::sync::types::{InFlightRecord, LectureBatch};

/// Default cap on cached lecture snapshots.
pub const DEFAULT_MAX_CACHED_LECTURES: usize = 50;

/// Persistent bucket identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    PendingRecords,
    CachedLectures,
    CachedStudents,
    LastSync,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::PendingRecords,
        Bucket::CachedLectures,
        Bucket::CachedStudents,
        Bucket::LastSync,
    ];

    /// Storage key of this bucket.
    pub fn key(&self) -> &'static str {
        match self {
            Bucket::PendingRecords => "pending_records",
            Bucket::CachedLectures => "cached_lectures",
            Bucket::CachedStudents => "cached_students",
            Bucket::LastSync => "last_sync",
        }
    }
}

/// In-memory contents of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    records: Vec<AttendanceRecord>,
    lectures: VecDeque<LectureSnapshot>,
    students: HashMap<String, Vec<Student>>,
    last_sync: Option<DateTime<Utc>>,
}

/// How a delivered or rejected batch landed in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSettlement {
    /// Records now marked synced.
    pub delivered: usize,
    /// Records left unsynced with `sync_error` set.
    pub failed: usize,
    /// Records edited while in flight; left unsynced for the next run.
    pub superseded: usize,
}

impl StoreState {
    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| !r.synced).count()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    /// Merge an intent under the one-unsynced-record-per-pair rule.
    ///
    /// Returns the resulting record.
    pub fn upsert(&mut self, intent: NewAttendance, now: DateTime<Utc>) -> AttendanceRecord {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.is_pending_for(&intent.lecture_id, &intent.student_id))
        {
            existing.apply_update(intent, now);
            return existing.clone();
        }

        let record = AttendanceRecord::from_intent(intent, now);
        self.records.push(record.clone());
        record
    }

    /// Group unsynced records by lecture, in first-seen order.
    ///
    /// Entries whose `(local_id, revision)` is in `exclude` are skipped.
    pub fn pending_batches(&self, exclude: &HashSet<(String, u32)>) -> Vec<LectureBatch> {
        let mut batches: Vec<LectureBatch> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for record in self.records.iter().filter(|r| !r.synced) {
            let key = (record.local_id.clone(), record.revision);
            if exclude.contains(&key) {
                continue;
            }
            let entry = InFlightRecord {
                local_id: record.local_id.clone(),
                revision: record.revision,
                student_id: record.student_id.clone(),
                status: record.status,
            };
            match index.get(record.lecture_id.as_str()) {
                Some(&i) => batches[i].records.push(entry),
                None => {
                    index.insert(record.lecture_id.as_str(), batches.len());
                    batches.push(LectureBatch {
                        lecture_id: record.lecture_id.clone(),
                        records: vec![entry],
                    });
                }
            }
        }

        batches
    }

    /// Apply a batch outcome to the records it carried.
    ///
    /// Records that vanished (cleared) or were already synced are ignored.
    pub fn settle_batch(
        &mut self,
        batch: &LectureBatch,
        outcome: Result<(), &str>,
    ) -> BatchSettlement {
        let mut settlement = BatchSettlement::default();

        for sent in &batch.records {
            let Some(record) = self
                .records
                .iter_mut()
                .find(|r| r.local_id == sent.local_id && !r.synced)
            else {
                continue;
            };

            match outcome {
                Ok(()) if record.revision == sent.revision => {
                    record.synced = true;
                    record.sync_error = None;
                    settlement.delivered += 1;
                }
                Ok(()) => {
                    record.sync_error = None;
                    settlement.superseded += 1;
                }
                Err(message) if record.revision == sent.revision => {
                    record.sync_error = Some(message.to_string());
                    settlement.failed += 1;
                }
                Err(_) => {
                    settlement.superseded += 1;
                }
            }
        }

        settlement
    }

    /// Drop synced records whose timestamp is at least `max_age` old.
    pub fn prune_synced(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let before = self.records.len();
        self.records
            .retain(|r| !r.synced || now.signed_duration_since(r.timestamp) < max_age);
        before - self.records.len()
    }

    /// Insert or refresh a lecture snapshot, evicting the oldest inserted
    /// entries beyond `cap`.
    pub fn cache_lecture(&mut self, snapshot: LectureSnapshot, cap: usize) {
        self.lectures.retain(|l| l.id() != snapshot.id());
        self.lectures.push_back(snapshot);
        while self.lectures.len() > cap {
            if let Some(evicted) = self.lectures.pop_front() {
                debug!(lecture_id = %evicted.id(), "evicted cached lecture");
            }
        }
    }

    pub fn lecture(&self, id: &str) -> Option<&LectureSnapshot> {
        self.lectures.iter().find(|l| l.id() == id)
    }

    pub fn lectures(&self) -> impl Iterator<Item = &LectureSnapshot> {
        self.lectures.iter()
    }

    pub fn cache_students(&mut self, course_id: String, students: Vec<Student>) {
        self.students.insert(course_id, students);
    }

    pub fn students(&self, course_id: &str) -> Option<&[Student]> {
        self.students.get(course_id).map(Vec::as_slice)
    }

    fn encode(&self, bucket: Bucket) -> Result<String, StorageError> {
        let encoded = match bucket {
            Bucket::PendingRecords => serde_json::to_string(&self.records),
            Bucket::CachedLectures => serde_json::to_string(&self.lectures),
            Bucket::CachedStudents => serde_json::to_string(&self.students),
            Bucket::LastSync => serde_json::to_string(&self.last_sync),
        };
        encoded.map_err(|source| StorageError::EncodeFailed {
            bucket: bucket.key().to_string(),
            source,
        })
    }
}

/// Process-wide store shared by the write path and the sync coordinator.
pub struct RecordStore {
    kv: Arc<dyn KeyValueStore>,
    state: Mutex<StoreState>,
    pending: AtomicUsize,
    max_cached_lectures: usize,
}

async fn read_bucket<T>(kv: &dyn KeyValueStore, bucket: Bucket) -> T
where
    T: DeserializeOwned + Default,
{
    match kv.get(bucket.key()).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(bucket = bucket.key(), error = %e, "corrupt bucket, starting empty");
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(e) => {
            warn!(bucket = bucket.key(), error = %e, "unreadable bucket, starting empty");
            T::default()
        }
    }
}

async fn read_state(kv: &dyn KeyValueStore, max_cached_lectures: usize) -> StoreState {
    let records: Vec<AttendanceRecord> = read_bucket(kv, Bucket::PendingRecords).await;
    let mut lectures: VecDeque<LectureSnapshot> = read_bucket(kv, Bucket::CachedLectures).await;
    let students: HashMap<String, Vec<Student>> = read_bucket(kv, Bucket::CachedStudents).await;
    let last_sync: Option<DateTime<Utc>> = read_bucket(kv, Bucket::LastSync).await;

    while lectures.len() > max_cached_lectures {
        lectures.pop_front();
    }

    StoreState {
        records,
        lectures,
        students,
        last_sync,
    }
}

impl RecordStore {
    /// Load all buckets from `kv`. Never fails; bad buckets start empty.
    pub async fn load(kv: Arc<dyn KeyValueStore>, max_cached_lectures: usize) -> Self {
        let state = read_state(kv.as_ref(), max_cached_lectures).await;
        let pending = state.pending_count();
        debug!(
            records = state.records.len(),
            pending,
            lectures = state.lectures.len(),
            "record store loaded"
        );
        Self {
            kv,
            state: Mutex::new(state),
            pending: AtomicUsize::new(pending),
            max_cached_lectures,
        }
    }

    /// Replace in-memory state with what is currently persisted.
    pub async fn reload(&self) {
        let fresh = read_state(self.kv.as_ref(), self.max_cached_lectures).await;
        let mut state = self.state.lock().await;
        *state = fresh;
        self.refresh_pending(&state);
    }

    /// Unsynced record count as of the latest mutation.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn refresh_pending(&self, state: &StoreState) {
        self.pending.store(state.pending_count(), Ordering::Release);
    }

    /// Lock the state for a multi-step update.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().await
    }

    /// Write the given buckets from a locked state.
    ///
    /// Every bucket is attempted; the first failure is returned.
    pub(crate) async fn write_buckets(
        &self,
        state: &StoreState,
        buckets: &[Bucket],
    ) -> Result<(), StorageError> {
        let mut first_error = None;
        for bucket in buckets {
            let result = match state.encode(*bucket) {
                Ok(encoded) => self.kv.set(bucket.key(), &encoded).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(bucket = bucket.key(), error = %e, "bucket write failed");
                first_error.get_or_insert(e);
            }
        }
        self.refresh_pending(state);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Persist all four buckets.
    pub async fn save(&self) -> Result<(), StorageError> {
        let state = self.state.lock().await;
        self.write_buckets(&state, &Bucket::ALL).await
    }

    /// Persist only the given buckets.
    pub async fn save_buckets(&self, buckets: &[Bucket]) -> Result<(), StorageError> {
        let state = self.state.lock().await;
        self.write_buckets(&state, buckets).await
    }

    /// Remove every bucket and reset memory. Irreversible.
    ///
    /// If a bucket cannot be removed, memory is reloaded from storage so it
    /// keeps matching what a restart would see.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;

        let mut first_error = None;
        for bucket in Bucket::ALL {
            if let Err(e) = self.kv.remove(bucket.key()).await {
                warn!(bucket = bucket.key(), error = %e, "bucket removal failed");
                first_error.get_or_insert(e);
            }
        }

        *state = match first_error {
            None => StoreState::default(),
            Some(_) => read_state(self.kv.as_ref(), self.max_cached_lectures).await,
        };
        self.refresh_pending(&state);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deduplicating write. The record is persisted before this returns;
    /// if persisting fails the in-memory change is undone.
    pub async fn add(
        &self,
        intent: NewAttendance,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StorageError> {
        let mut state = self.state.lock().await;
        let previous = state.records.clone();
        let record = state.upsert(intent, now);

        if let Err(e) = self.write_buckets(&state, &[Bucket::PendingRecords]).await {
            state.records = previous;
            self.refresh_pending(&state);
            return Err(e);
        }
        Ok(record)
    }

    /// All records currently held, synced or not.
    pub async fn records(&self) -> Vec<AttendanceRecord> {
        self.state.lock().await.records.clone()
    }

    /// Records still awaiting delivery.
    pub async fn pending_records(&self) -> Vec<AttendanceRecord> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .filter(|r| !r.synced)
            .cloned()
            .collect()
    }

    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_sync
    }

    pub(crate) fn set_last_sync(state: &mut StoreState, at: DateTime<Utc>) {
        state.last_sync = Some(at);
    }

    /// Cache a lecture snapshot. The snapshot stays cached in memory even if
    /// persisting it fails.
    pub async fn cache_lecture(
        &self,
        lecture: LectureDetail,
        now: DateTime<Utc>,
    ) -> Result<LectureSnapshot, StorageError> {
        let mut state = self.state.lock().await;
        let snapshot = LectureSnapshot::capture(lecture, now);
        state.cache_lecture(snapshot.clone(), self.max_cached_lectures);
        self.write_buckets(&state, &[Bucket::CachedLectures]).await?;
        Ok(snapshot)
    }

    pub async fn cached_lecture(&self, id: &str) -> Option<LectureSnapshot> {
        self.state.lock().await.lecture(id).cloned()
    }

    /// Cached lectures, oldest inserted first.
    pub async fn cached_lectures(&self) -> Vec<LectureSnapshot> {
        self.state.lock().await.lectures().cloned().collect()
    }

    pub async fn cache_students(
        &self,
        course_id: &str,
        students: Vec<Student>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.cache_students(course_id.to_string(), students);
        self.write_buckets(&state, &[Bucket::CachedStudents]).await
    }

    pub async fn cached_students(&self, course_id: &str) -> Option<Vec<Student>> {
        self.state.lock().await.students(course_id).map(<[Student]>::to_vec)
    }
}
