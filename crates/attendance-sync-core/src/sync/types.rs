//! Core types for attendance reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attendance::AttendanceStatus;

/// A record as it was when handed to the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightRecord {
    pub local_id: String,
    /// Revision at the time of sending; a mismatch on settle means the
    /// record was edited mid-flight.
    pub revision: u32,
    pub student_id: String,
    pub status: AttendanceStatus,
}

/// All unsynced records of one lecture, delivered in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureBatch {
    pub lecture_id: String,
    pub records: Vec<InFlightRecord>,
}

impl LectureBatch {
    /// Wire payload for this batch.
    pub fn to_request(&self) -> AttendanceBatch {
        AttendanceBatch {
            lecture_id: self.lecture_id.clone(),
            records: self
                .records
                .iter()
                .map(|r| BatchEntry {
                    student_id: r.student_id.clone(),
                    status: r.status,
                })
                .collect(),
            notes: None,
        }
    }
}

/// One `(student_id, status)` pair in a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub student_id: String,
    pub status: AttendanceStatus,
}

/// Request body for "record a batch of attendance for a lecture".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceBatch {
    pub lecture_id: String,
    pub records: Vec<BatchEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Aggregate outcome of a sync run, counted in records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub success_count: usize,
    pub failed_count: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.success_count == 0 && self.failed_count == 0
    }
}

/// One lecture batch that failed during the last run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// Empty when the failure was local (persisting the run's results).
    pub lecture_id: String,
    pub message: String,
    pub record_count: usize,
    pub at: DateTime<Utc>,
}

/// What asked for a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Explicit request; never delayed by backoff.
    Manual,
    /// Reconnect or write path; subject to backoff.
    Automatic,
}

/// Snapshot of engine sync state for display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    /// When the device was last seen going offline while online.
    pub last_online_at: Option<DateTime<Utc>>,
    /// Last completed sync run.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Number of records awaiting delivery.
    pub pending_count: usize,
    /// Whether a sync is currently in progress.
    pub in_progress: bool,
    /// Failures of the last run.
    pub errors: Vec<SyncFailure>,
}

/// Remote delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server rejected batch ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}
