//! Read models cached for offline display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A student as listed in a lecture's roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub student_id: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
}

/// Lecture detail as fetched from the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LectureDetail {
    pub id: String,
    pub course_id: String,
    pub course_name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default)]
    pub students: Vec<RosterEntry>,
}

/// Cached copy of a lecture, stamped with the capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LectureSnapshot {
    #[serde(flatten)]
    pub lecture: LectureDetail,
    pub cached_at: DateTime<Utc>,
}

impl LectureSnapshot {
    pub fn capture(lecture: LectureDetail, now: DateTime<Utc>) -> Self {
        Self {
            lecture,
            cached_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.lecture.id
    }
}

/// Course roster member, cached per course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub student_id: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
}
