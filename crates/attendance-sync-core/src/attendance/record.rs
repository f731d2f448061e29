//! Attendance decisions and their delivery state.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Provenance tag used when the caller does not supply one.
pub const DEFAULT_METHOD: &str = "offline_manual";

const LOCAL_ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Attendance status for one student in one lecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            other => Err(ValidationError::InvalidValue {
                field: "status".to_string(),
                message: format!(
                    "unknown status '{other}' (expected present, absent, late or excused)"
                ),
            }),
        }
    }
}

/// A caller's attendance intent, before it becomes a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttendance {
    pub lecture_id: String,
    pub course_id: String,
    pub student_id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub method: Option<String>,
}

impl NewAttendance {
    pub fn new(
        lecture_id: impl Into<String>,
        course_id: impl Into<String>,
        student_id: impl Into<String>,
        status: AttendanceStatus,
    ) -> Self {
        Self {
            lecture_id: lecture_id.into(),
            course_id: course_id.into(),
            student_id: student_id.into(),
            student_name: None,
            status,
            method: None,
        }
    }

    pub fn with_student_name(mut self, name: impl Into<String>) -> Self {
        self.student_name = Some(name.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Reject intents that would produce an undeliverable record.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lecture_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("lecture_id"));
        }
        if self.course_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("course_id"));
        }
        if self.student_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("student_id"));
        }
        Ok(())
    }
}

/// One attendance decision awaiting or having completed delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Client-generated identifier, fixed at creation.
    pub local_id: String,
    pub lecture_id: String,
    pub course_id: String,
    pub student_id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    pub status: AttendanceStatus,
    pub method: String,
    /// Creation or last in-place update.
    pub timestamp: DateTime<Utc>,
    /// True once the remote API confirmed receipt.
    pub synced: bool,
    /// Last delivery failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
    /// Bumped on every in-place update.
    #[serde(default)]
    pub revision: u32,
}

impl AttendanceRecord {
    /// Build a fresh unsynced record from an intent.
    pub fn from_intent(intent: NewAttendance, now: DateTime<Utc>) -> Self {
        Self {
            local_id: generate_local_id(now),
            lecture_id: intent.lecture_id,
            course_id: intent.course_id,
            student_id: intent.student_id,
            student_name: intent.student_name,
            status: intent.status,
            method: intent.method.unwrap_or_else(|| DEFAULT_METHOD.to_string()),
            timestamp: now,
            synced: false,
            sync_error: None,
            revision: 0,
        }
    }

    /// Whether this record is the unsynced entry for the given pair.
    pub fn is_pending_for(&self, lecture_id: &str, student_id: &str) -> bool {
        !self.synced && self.lecture_id == lecture_id && self.student_id == student_id
    }

    /// Apply a newer decision for the same pair, keeping `local_id`.
    pub fn apply_update(&mut self, intent: NewAttendance, now: DateTime<Utc>) {
        self.status = intent.status;
        self.timestamp = now;
        self.course_id = intent.course_id;
        if intent.student_name.is_some() {
            self.student_name = intent.student_name;
        }
        if let Some(method) = intent.method {
            self.method = method;
        }
        self.sync_error = None;
        self.revision = self.revision.wrapping_add(1);
    }
}

/// `<unix-millis>-<random base36 suffix>`
pub fn generate_local_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..LOCAL_ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}", now.timestamp_millis(), suffix)
}
