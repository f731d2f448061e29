//! Engine wiring for commands that touch local attendance data.

use attendance_sync_core::storage::{self, Config, FileKeyValueStore};
use attendance_sync_core::sync::{ConnectivitySource, HttpAttendanceApi, HttpReachability, ManualConnectivity};
use attendance_sync_core::AttendanceEngine;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Context {
    pub engine: AttendanceEngine,
    /// Kept so `watch` can re-probe; the engine's monitor follows its
    /// published values.
    pub source: Arc<dyn ConnectivitySource>,
}

impl Context {
    pub async fn open(offline: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let kv = Arc::new(FileKeyValueStore::open(storage::store_dir()?)?);
        let api = Arc::new(HttpAttendanceApi::new(
            &config.api.base_url,
            config.api.token.clone(),
            config.api_timeout(),
        )?);

        let source: Arc<dyn ConnectivitySource> = if offline {
            Arc::new(ManualConnectivity::new(false))
        } else {
            Arc::new(HttpReachability::new(
                config.api.base_url.clone(),
                PROBE_TIMEOUT.min(config.api_timeout()),
            )?)
        };

        let engine =
            AttendanceEngine::open(kv, api, source.clone(), config.sync_settings()).await;
        Ok(Self { engine, source })
    }
}
