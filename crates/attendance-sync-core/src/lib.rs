//! # Attendance Sync Core Library
//!
//! Offline-first attendance recording. A lecturer's attendance decisions are
//! durably queued on the device, collapsed so each student has at most one
//! undelivered decision per lecture, and delivered to the remote API once
//! connectivity returns.
//!
//! ## Architecture
//!
//! - **Record Store**: pending records plus lecture and roster caches,
//!   mirrored into independent key-value buckets
//! - **Sync Coordinator**: one remote call per lecture, per-record settlement,
//!   pruning of old delivered history
//! - **Connectivity Monitor**: turns a reachability source into
//!   offline/online transitions and triggers sync on reconnect
//! - **Storage**: file-backed key-value buckets and TOML configuration
//!
//! ## Key Components
//!
//! - [`AttendanceEngine`]: the facade embedding applications talk to
//! - [`RecordStore`]: durable state behind the engine
//! - [`SyncCoordinator`]: reconciliation with the remote API
//! - [`Config`]: application configuration management

pub mod attendance;
pub mod engine;
pub mod error;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod testing;

pub use attendance::{
    AttendanceRecord, AttendanceStatus, LectureDetail, LectureSnapshot, NewAttendance, RosterEntry,
    Student,
};
pub use engine::AttendanceEngine;
pub use error::{ConfigError, CoreError, StorageError, ValidationError};
pub use storage::{Config, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, RecordStore};
pub use sync::{
    AttendanceApi, ConnectivitySource, HttpAttendanceApi, HttpReachability, ManualConnectivity,
    MonitorHandle, RemoteError, SyncCoordinator, SyncFailure, SyncReport, SyncSettings,
    SyncStatus,
};
