//! Network reachability monitoring.
//!
//! A [`ConnectivitySource`] adapts whatever the platform offers (a callback
//! from the OS, an HTTP probe) into a watch channel. The
//! [`ConnectivityMonitor`] turns that channel into transitions and fires the
//! reconnect hook on offline to online only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Platform reachability primitive.
#[async_trait]
pub trait ConnectivitySource: Send + Sync {
    /// Check reachability now. Implementations publish the result to
    /// subscribers if it changed.
    async fn probe(&self) -> bool;

    /// Subscribe to reachability changes.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Reachability pushed in from outside: a platform callback or a test.
pub struct ManualConnectivity {
    tx: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

#[async_trait]
impl ConnectivitySource for ManualConnectivity {
    async fn probe(&self) -> bool {
        self.is_online()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Treats any HTTP response from `url` as "reachable".
pub struct HttpReachability {
    client: reqwest::Client,
    url: String,
    tx: watch::Sender<bool>,
}

impl HttpReachability {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (tx, _rx) = watch::channel(false);
        Ok(Self {
            client,
            url: url.into(),
            tx,
        })
    }
}

#[async_trait]
impl ConnectivitySource for HttpReachability {
    async fn probe(&self) -> bool {
        let reachable = self.client.head(&self.url).send().await.is_ok();
        debug!(url = %self.url, reachable, "reachability probe");
        self.tx.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });
        reachable
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Result of observing a reachability value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
    Unchanged,
}

/// Process-wide connectivity signal. Starts offline until observed.
#[derive(Debug, Default)]
pub struct ConnectivityState {
    online: AtomicBool,
    last_online_at: Mutex<Option<DateTime<Utc>>>,
}

impl ConnectivityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Last moment the device was online before dropping off.
    pub fn last_online_at(&self) -> Option<DateTime<Utc>> {
        self.last_online_at.lock().ok().and_then(|g| *g)
    }

    /// Record a reachability value and classify the change.
    pub fn observe(&self, online: bool) -> Transition {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        match (was_online, online) {
            (false, true) => Transition::CameOnline,
            (true, false) => {
                if let Ok(mut last) = self.last_online_at.lock() {
                    *last = Some(Utc::now());
                }
                Transition::WentOffline
            }
            _ => Transition::Unchanged,
        }
    }
}

/// Stops a running monitor. Clones share the same task.
#[derive(Clone, Default)]
pub struct MonitorHandle {
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MonitorHandle {
    /// Stop observing. Safe to call repeatedly.
    pub fn stop(&self) {
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            task.abort();
            debug!("connectivity monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|t| t.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

/// Watches a [`ConnectivitySource`] and reports transitions.
pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    /// Start observing. Probes once immediately, then follows change
    /// events. `on_reconnect` runs on every offline to online transition
    /// and must not block.
    pub fn start<F>(
        source: Arc<dyn ConnectivitySource>,
        state: Arc<ConnectivityState>,
        on_reconnect: F,
    ) -> MonitorHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut rx = source.subscribe();
        let task = tokio::spawn(async move {
            let observe = |online: bool| match state.observe(online) {
                Transition::CameOnline => {
                    info!("network reachable");
                    on_reconnect();
                }
                Transition::WentOffline => info!("network unreachable"),
                Transition::Unchanged => {}
            };

            let initial = source.probe().await;
            observe(initial);

            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                observe(online);
            }
            debug!("connectivity source closed");
        });

        MonitorHandle {
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}
