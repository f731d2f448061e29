//! Attendance domain types: records awaiting delivery and cached read models.

pub mod lecture;
pub mod record;

pub use lecture::{LectureDetail, LectureSnapshot, RosterEntry, Student};
pub use record::{generate_local_id, AttendanceRecord, AttendanceStatus, NewAttendance, DEFAULT_METHOD};
