//! Sync coordinator: delivers unsynced records, one remote call per lecture.
//!
//! A run snapshots the unsynced records as in-flight entries, releases the
//! store lock, calls the remote API per lecture, then settles each outcome
//! back into the store. The store lock is never held across a network call,
//! so writes keep landing during a run; a record edited while in flight
//! keeps its new status unsynced for the next pass.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::storage::record_store::{Bucket, RecordStore, DEFAULT_MAX_CACHED_LECTURES};
use crate::sync::backoff::{Backoff, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX};
use crate::sync::connectivity::ConnectivityState;
use crate::sync::remote::AttendanceApi;
use crate::sync::types::{LectureBatch, SyncFailure, SyncReport, SyncTrigger};

/// Default age after which synced records are pruned.
pub const DEFAULT_PRUNE_AFTER_DAYS: i64 = 7;

/// Default bound on the per-run failure list.
pub const DEFAULT_MAX_SYNC_ERRORS: usize = 20;

/// Tunables for the engine's sync behaviour.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Synced records at least this old are pruned after a run.
    pub prune_after: chrono::Duration,
    pub max_cached_lectures: usize,
    pub max_sync_errors: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            prune_after: chrono::Duration::days(DEFAULT_PRUNE_AFTER_DAYS),
            max_cached_lectures: DEFAULT_MAX_CACHED_LECTURES,
            max_sync_errors: DEFAULT_MAX_SYNC_ERRORS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

/// Owns the remote client, the single-run guard and the last run's errors.
pub struct SyncCoordinator {
    api: Arc<dyn AttendanceApi>,
    guard: tokio::sync::Mutex<()>,
    follow_up: AtomicBool,
    errors: Mutex<Vec<SyncFailure>>,
    backoff: Mutex<Backoff>,
    settings: SyncSettings,
}

impl SyncCoordinator {
    pub fn new(api: Arc<dyn AttendanceApi>, settings: SyncSettings) -> Self {
        let backoff = Backoff::new(settings.backoff_base, settings.backoff_max);
        Self {
            api,
            guard: tokio::sync::Mutex::new(()),
            follow_up: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
            backoff: Mutex::new(backoff),
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// Failures recorded by the last completed run.
    pub fn errors(&self) -> Vec<SyncFailure> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub(crate) fn clear_errors(&self) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.clear();
        }
    }

    /// How long an automatic run should wait before starting.
    pub fn backoff_delay(&self) -> Duration {
        self.backoff
            .lock()
            .map(|b| b.delay())
            .unwrap_or(self.settings.backoff_base)
    }

    /// Deliver every unsynced record.
    ///
    /// Returns `{0, 0}` without touching the network when offline or when
    /// another run holds the guard. An automatic request that finds a run in
    /// progress asks that run for one more pass instead; the request is
    /// honoured even when it lands while results are being persisted.
    pub async fn run(
        &self,
        store: &RecordStore,
        connectivity: &ConnectivityState,
        trigger: SyncTrigger,
    ) -> SyncReport {
        if !connectivity.is_online() {
            debug!(?trigger, "sync skipped: offline");
            return SyncReport::default();
        }
        let Ok(mut guard) = self.guard.try_lock() else {
            if trigger == SyncTrigger::Automatic {
                self.follow_up.store(true, Ordering::Release);
            }
            debug!(?trigger, "sync skipped: already in progress");
            return SyncReport::default();
        };
        self.follow_up.store(false, Ordering::Release);

        let mut report = SyncReport::default();
        let mut failures = Vec::new();
        let mut attempted: HashSet<(String, u32)> = HashSet::new();
        let mut pruned = 0;

        loop {
            self.deliver_pending(store, connectivity, &mut attempted, &mut report, &mut failures)
                .await;
            pruned += self
                .persist(store, !attempted.is_empty(), &mut failures)
                .await;

            if self.follow_up.swap(false, Ordering::AcqRel) && connectivity.is_online() {
                debug!("follow-up pass requested while persisting");
                continue;
            }
            self.publish_errors(&failures);
            drop(guard);

            // A request may have found the guard held just before release.
            if !self.follow_up.load(Ordering::Acquire) || !connectivity.is_online() {
                break;
            }
            match self.guard.try_lock() {
                Ok(reacquired) => {
                    self.follow_up.store(false, Ordering::Release);
                    guard = reacquired;
                    debug!("follow-up pass requested at release");
                }
                // Whoever holds the guard now serves the request.
                Err(_) => break,
            }
        }

        self.record_backoff(!failures.is_empty());
        if !attempted.is_empty() {
            info!(
                success = report.success_count,
                failed = report.failed_count,
                pruned,
                "sync finished"
            );
        }
        report
    }

    /// Deliver batches until no follow-up pass is requested. Pairs already
    /// attempted at the same revision are skipped.
    async fn deliver_pending(
        &self,
        store: &RecordStore,
        connectivity: &ConnectivityState,
        attempted: &mut HashSet<(String, u32)>,
        report: &mut SyncReport,
        failures: &mut Vec<SyncFailure>,
    ) {
        loop {
            let batches = store.lock().await.pending_batches(attempted);
            for batch in &batches {
                attempted.extend(
                    batch
                        .records
                        .iter()
                        .map(|r| (r.local_id.clone(), r.revision)),
                );
            }
            for batch in &batches {
                self.deliver(store, batch, report, failures).await;
            }

            if !self.follow_up.swap(false, Ordering::AcqRel) {
                return;
            }
            if !connectivity.is_online() {
                debug!("follow-up pass dropped: offline");
                return;
            }
            debug!("follow-up pass");
        }
    }

    async fn deliver(
        &self,
        store: &RecordStore,
        batch: &LectureBatch,
        report: &mut SyncReport,
        failures: &mut Vec<SyncFailure>,
    ) {
        let request = batch.to_request();
        let outcome = self.api.record_batch(&request).await;

        let mut state = store.lock().await;
        match outcome {
            Ok(()) => {
                let settled = state.settle_batch(batch, Ok(()));
                report.success_count += settled.delivered;
                info!(
                    lecture_id = %batch.lecture_id,
                    delivered = settled.delivered,
                    superseded = settled.superseded,
                    "batch delivered"
                );
            }
            Err(e) => {
                let message = e.to_string();
                let settled = state.settle_batch(batch, Err(&message));
                report.failed_count += settled.failed;
                warn!(
                    lecture_id = %batch.lecture_id,
                    records = batch.records.len(),
                    error = %message,
                    "batch failed"
                );
                failures.push(SyncFailure {
                    lecture_id: batch.lecture_id.clone(),
                    message,
                    record_count: batch.records.len(),
                    at: Utc::now(),
                });
            }
        }
        store.refresh_pending(&state);
    }

    /// Prune and write every bucket. A write failure becomes a
    /// [`SyncFailure`] with an empty lecture id. Returns the pruned count.
    async fn persist(
        &self,
        store: &RecordStore,
        attempted_any: bool,
        failures: &mut Vec<SyncFailure>,
    ) -> usize {
        let now = Utc::now();
        let mut state = store.lock().await;
        let pruned = state.prune_synced(now, self.settings.prune_after);

        if attempted_any || pruned > 0 {
            if attempted_any {
                RecordStore::set_last_sync(&mut state, now);
            }
            if let Err(e) = store.write_buckets(&state, &Bucket::ALL).await {
                error!(error = %e, "failed to persist sync results");
                failures.push(SyncFailure {
                    lecture_id: String::new(),
                    message: format!("failed to persist sync results: {e}"),
                    record_count: 0,
                    at: now,
                });
            }
        } else {
            store.refresh_pending(&state);
        }
        pruned
    }

    fn publish_errors(&self, failures: &[SyncFailure]) {
        let kept = failures.len().min(self.settings.max_sync_errors);
        if let Ok(mut errors) = self.errors.lock() {
            *errors = failures[..kept].to_vec();
        }
    }

    fn record_backoff(&self, failed: bool) {
        let Ok(mut backoff) = self.backoff.lock() else {
            return;
        };
        if failed {
            backoff.record_failure();
            debug!(
                consecutive_failures = backoff.failures(),
                next_delay_ms = backoff.delay().as_millis() as u64,
                "automatic sync backoff increased"
            );
        } else {
            backoff.reset();
        }
    }
}
