//! Delivery of locally recorded attendance to the remote API.
//!
//! - [`remote`]: the API port and its HTTP adapter
//! - [`connectivity`]: reachability sources and the transition monitor
//! - [`coordinator`]: per-lecture batching, settlement and pruning
//! - [`backoff`]: delay schedule for automatic runs

pub mod backoff;
pub mod connectivity;
pub mod coordinator;
pub mod remote;
pub mod types;

pub use backoff::Backoff;
pub use connectivity::{
    ConnectivityMonitor, ConnectivitySource, ConnectivityState, HttpReachability,
    ManualConnectivity, MonitorHandle, Transition,
};
pub use coordinator::{SyncCoordinator, SyncSettings};
pub use remote::{AttendanceApi, HttpAttendanceApi};
pub use types::{
    AttendanceBatch, BatchEntry, InFlightRecord, LectureBatch, RemoteError, SyncFailure,
    SyncReport, SyncStatus, SyncTrigger,
};
