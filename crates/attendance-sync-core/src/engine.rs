//! The attendance engine: the public contract for embedding applications.
//!
//! An [`AttendanceEngine`] owns one record store, one sync coordinator and
//! one connectivity signal. It is cheap to clone; clones share state.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::attendance::{AttendanceRecord, LectureDetail, LectureSnapshot, NewAttendance, Student};
use crate::error::{Result, ValidationError};
use crate::storage::kv::KeyValueStore;
use crate::storage::record_store::RecordStore;
use crate::sync::connectivity::{ConnectivityMonitor, ConnectivitySource, ConnectivityState, MonitorHandle};
use crate::sync::coordinator::{SyncCoordinator, SyncSettings};
use crate::sync::remote::AttendanceApi;
use crate::sync::types::{SyncReport, SyncStatus, SyncTrigger};

struct EngineInner {
    store: RecordStore,
    coordinator: SyncCoordinator,
    source: Arc<dyn ConnectivitySource>,
    network: Arc<ConnectivityState>,
    background: Mutex<Vec<JoinHandle<()>>>,
    auto_sync_scheduled: AtomicBool,
    /// Bumped by `shutdown`; automatic syncs still waiting give up.
    cancel: watch::Sender<u64>,
}

/// Offline-first attendance engine.
#[derive(Clone)]
pub struct AttendanceEngine {
    inner: Arc<EngineInner>,
}

impl AttendanceEngine {
    /// Load persisted state from `storage` and wire up the collaborators.
    ///
    /// The engine starts offline; call
    /// [`start_network_monitoring`](Self::start_network_monitoring) to begin
    /// observing reachability.
    pub async fn open(
        storage: Arc<dyn KeyValueStore>,
        api: Arc<dyn AttendanceApi>,
        connectivity: Arc<dyn ConnectivitySource>,
        settings: SyncSettings,
    ) -> Self {
        let store = RecordStore::load(storage, settings.max_cached_lectures).await;
        let coordinator = SyncCoordinator::new(api, settings);
        Self {
            inner: Arc::new(EngineInner {
                store,
                coordinator,
                source: connectivity,
                network: Arc::new(ConnectivityState::new()),
                background: Mutex::new(Vec::new()),
                auto_sync_scheduled: AtomicBool::new(false),
                cancel: watch::channel(0).0,
            }),
        }
    }

    /// Record an attendance decision.
    ///
    /// Collapses into the pair's unsynced record if there is one. The
    /// record is durable when this returns. When online a background sync
    /// is scheduled.
    pub async fn add_attendance_record(&self, intent: NewAttendance) -> Result<AttendanceRecord> {
        intent.validate()?;
        let record = self.inner.store.add(intent, Utc::now()).await?;
        debug!(
            local_id = %record.local_id,
            lecture_id = %record.lecture_id,
            status = %record.status,
            revision = record.revision,
            "attendance recorded"
        );

        if self.is_online() {
            self.schedule_auto_sync();
        }
        Ok(record)
    }

    pub fn pending_records_count(&self) -> usize {
        self.inner.store.pending_count()
    }

    pub async fn pending_records(&self) -> Vec<AttendanceRecord> {
        self.inner.store.pending_records().await
    }

    /// Every record held locally, including synced ones not yet pruned.
    pub async fn records(&self) -> Vec<AttendanceRecord> {
        self.inner.store.records().await
    }

    /// Cache a lecture fetched while online for offline reads.
    pub async fn cache_lecture(&self, lecture: LectureDetail) -> Result<LectureSnapshot> {
        if lecture.id.trim().is_empty() {
            return Err(ValidationError::EmptyField("id").into());
        }
        Ok(self.inner.store.cache_lecture(lecture, Utc::now()).await?)
    }

    pub async fn cache_students(&self, course_id: &str, students: Vec<Student>) -> Result<()> {
        if course_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("course_id").into());
        }
        Ok(self.inner.store.cache_students(course_id, students).await?)
    }

    pub async fn cached_lecture(&self, lecture_id: &str) -> Option<LectureSnapshot> {
        self.inner.store.cached_lecture(lecture_id).await
    }

    pub async fn cached_lectures(&self) -> Vec<LectureSnapshot> {
        self.inner.store.cached_lectures().await
    }

    pub async fn cached_students(&self, course_id: &str) -> Option<Vec<Student>> {
        self.inner.store.cached_students(course_id).await
    }

    /// Deliver pending records now, ignoring backoff.
    ///
    /// Never fails: delivery problems are recorded on the records and in
    /// [`status`](Self::status).
    pub async fn sync_pending_records(&self) -> SyncReport {
        self.inner
            .coordinator
            .run(&self.inner.store, &self.inner.network, SyncTrigger::Manual)
            .await
    }

    /// Drop every record and cache, in memory and on disk.
    pub async fn clear_all_data(&self) -> Result<()> {
        self.inner.store.clear().await?;
        self.inner.coordinator.clear_errors();
        info!("all local attendance data cleared");
        Ok(())
    }

    /// Write every bucket to storage.
    pub async fn persist(&self) -> Result<()> {
        Ok(self.inner.store.save().await?)
    }

    /// Replace in-memory state with what storage holds.
    pub async fn restore(&self) {
        self.inner.store.reload().await;
    }

    /// Begin observing reachability. Records queued while offline are
    /// delivered on the first offline to online transition, including the
    /// initial probe.
    pub fn start_network_monitoring(&self) -> MonitorHandle {
        let weak = Arc::downgrade(&self.inner);
        ConnectivityMonitor::start(
            self.inner.source.clone(),
            self.inner.network.clone(),
            move || {
                if let Some(engine) = Self::upgrade(&weak) {
                    engine.schedule_auto_sync();
                }
            },
        )
    }

    /// Probe reachability once and record the result without scheduling a
    /// sync. For one-shot callers that sync explicitly afterwards.
    pub async fn probe_connectivity(&self) -> bool {
        let online = self.inner.source.probe().await;
        self.inner.network.observe(online);
        online
    }

    pub fn is_online(&self) -> bool {
        self.inner.network.is_online()
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            is_online: self.is_online(),
            last_online_at: self.inner.network.last_online_at(),
            last_sync_at: self.inner.store.last_sync().await,
            pending_count: self.pending_records_count(),
            in_progress: self.inner.coordinator.is_running(),
            errors: self.inner.coordinator.errors(),
        }
    }

    /// Stop background work scheduled so far.
    ///
    /// Automatic syncs still waiting to start are cancelled; runs already
    /// started are awaited so no issued batch is abandoned. The engine stays
    /// usable and later requests schedule new syncs as usual.
    pub async fn shutdown(&self) {
        self.inner.cancel.send_modify(|generation| *generation += 1);
        loop {
            let handles = match self.inner.background.lock() {
                Ok(mut background) => std::mem::take(&mut *background),
                Err(_) => return,
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                // A cancelled or panicked sync has nothing left to wait for.
                let _ = handle.await;
            }
        }
    }

    fn upgrade(weak: &Weak<EngineInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Spawn an automatic sync after the current backoff delay. At most one
    /// is waiting at a time; a request that arrives while one is waiting is
    /// covered by it.
    fn schedule_auto_sync(&self) {
        if self.inner.auto_sync_scheduled.swap(true, Ordering::AcqRel) {
            debug!("automatic sync already scheduled");
            return;
        }

        let delay = self.inner.coordinator.backoff_delay();
        let mut cancelled = self.inner.cancel.subscribe();
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                debug!(delay_ms = delay.as_millis() as u64, "automatic sync backing off");
            }
            let proceed = tokio::select! {
                biased;
                _ = cancelled.changed() => false,
                _ = tokio::time::sleep(delay) => true,
            };
            let Some(engine) = Self::upgrade(&weak) else {
                return;
            };
            engine
                .inner
                .auto_sync_scheduled
                .store(false, Ordering::Release);
            if !proceed {
                debug!("automatic sync cancelled by shutdown");
                return;
            }
            engine
                .inner
                .coordinator
                .run(&engine.inner.store, &engine.inner.network, SyncTrigger::Automatic)
                .await;
        });

        if let Ok(mut background) = self.inner.background.lock() {
            background.retain(|h| !h.is_finished());
            background.push(task);
        }
    }
}
