//! Monitor subscriptions.
//!
//! Each monitor owns a notification queue and one drain worker thread. The
//! client's event hook pushes the subscription handle; the worker pops it,
//! pulls one buffered update, serializes it and runs the callback. Updates of
//! one subscription are delivered in arrival order.

/// Drain loop worker.
pub mod drain;
/// Bounded notification queue.
pub mod queue;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::{Client, EventHook, Subscription};
use crate::config::BridgeConfig;
use crate::error::{BridgeResult, MonitorError, ValidationError};
use crate::json::SerializeOptions;

pub use queue::{NotificationQueue, Queued, Requeue};

/// Callback receiving the serialized text of each update.
pub type MonitorCallback = Box<dyn FnMut(&str) + Send>;

/// Unique id of one monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The wrapped UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-monitor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Updates passed to the callback.
    pub delivered: u64,
    /// Connection events skipped.
    pub skipped: u64,
    /// Updates whose serialization or callback failed.
    pub faults: u64,
    /// Re-enqueues dropped because the queue was full.
    pub requeue_dropped: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) delivered: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) faults: AtomicU64,
    pub(crate) requeue_dropped: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> MonitorStats {
        MonitorStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            requeue_dropped: self.requeue_dropped.load(Ordering::Relaxed),
        }
    }
}

/// What the queue carries: the subscription, once it exists.
pub(crate) struct SubscriptionHandle {
    pub(crate) id: SubscriptionId,
    pub(crate) name: String,
    queued: AtomicBool,
    sub: OnceLock<Arc<dyn Subscription>>,
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("queued", &self.queued.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriptionId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            queued: AtomicBool::new(false),
            sub: OnceLock::new(),
        }
    }

    pub(crate) fn attach(&self, sub: Arc<dyn Subscription>) {
        if self.sub.set(sub).is_err() {
            tracing::warn!(channel = %self.name, id = %self.id, "subscription already attached");
        }
    }

    pub(crate) fn subscription(&self) -> Option<&Arc<dyn Subscription>> {
        self.sub.get()
    }

    fn cancel(&self) {
        if let Some(sub) = self.sub.get() {
            sub.cancel();
        }
    }
}

impl Queued for SubscriptionHandle {
    fn queued(&self) -> &AtomicBool {
        &self.queued
    }
}

/// A running monitor. Dropping it closes the monitor.
pub struct MonitorHandle {
    id: SubscriptionId,
    name: String,
    queue: Arc<NotificationQueue<SubscriptionHandle>>,
    handle: Arc<SubscriptionHandle>,
    counters: Arc<Counters>,
    closed: AtomicBool,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl MonitorHandle {
    /// Subscribe to `name` and start the drain worker.
    ///
    /// On any failure the subscription is cancelled and no thread is left
    /// running.
    pub fn start(
        client: &dyn Client,
        name: &str,
        cfg: &BridgeConfig,
        callback: MonitorCallback,
    ) -> BridgeResult<Self> {
        if name.is_empty() {
            return Err(ValidationError::EmptyChannelName.into());
        }

        let id = SubscriptionId::new();
        let queue = Arc::new(NotificationQueue::new(cfg.queue_capacity));
        let handle = Arc::new(SubscriptionHandle::new(id, name));
        let counters = Arc::new(Counters::default());

        let hook: EventHook = {
            let queue = Arc::clone(&queue);
            let handle = Arc::clone(&handle);
            Arc::new(move || {
                if let Err(e) = queue.push(&handle) {
                    tracing::debug!(channel = %handle.name, error = %e, "event after monitor close");
                }
            })
        };

        let sub = client.subscribe(name, hook)?;
        handle.attach(sub);

        let opts = SerializeOptions::from(cfg);
        let spawned = {
            let queue = Arc::clone(&queue);
            let counters = Arc::clone(&counters);
            let mut callback = callback;
            thread::Builder::new()
                .name(format!("pva-monitor-{name}"))
                .spawn(move || drain::drain_loop(&queue, &opts, &mut callback, &counters))
        };
        let join = match spawned {
            Ok(join) => join,
            Err(e) => {
                handle.cancel();
                queue.close();
                return Err(MonitorError::SpawnFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                }
                .into());
            }
        };

        tracing::info!(channel = name, %id, "monitor started");
        Ok(Self {
            id,
            name: name.to_string(),
            queue,
            handle,
            counters,
            closed: AtomicBool::new(false),
            join: Mutex::new(Some(join)),
        })
    }

    /// Monitor id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        self.counters.snapshot()
    }

    /// True after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the monitor and wait for the worker to exit. No callback runs
    /// after this returns, unless it is called from the callback itself.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.close();
        self.handle.cancel();

        let join = self.join.lock().ok().and_then(|mut guard| guard.take());
        if let Some(join) = join {
            if join.thread().id() == thread::current().id() {
                // Closed from the callback; the loop exits when it returns.
                drop(join);
            } else if join.join().is_err() {
                tracing::error!(channel = %self.name, id = %self.id, "monitor worker panicked");
            }
        }
        tracing::info!(channel = %self.name, id = %self.id, stats = ?self.stats(), "monitor closed");
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc;
    use std::time::Duration;

    use crate::client::MemoryClient;
    use crate::data::{Member, ScalarKind, TypeDef, Value};

    fn counter(v: i64) -> Value {
        let ty = TypeDef::structure("", [Member::scalar(ScalarKind::Int64, "n")]).build().unwrap();
        let mut value = Value::create(&ty);
        value.set("n", v).unwrap();
        value
    }

    #[test]
    fn subscription_id_display_is_uuid() {
        let id = SubscriptionId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
        assert_ne!(id, SubscriptionId::new());
    }

    #[test]
    fn empty_name_is_rejected() {
        let client = MemoryClient::new();
        let err = MonitorHandle::start(&client, "", &BridgeConfig::default(), Box::new(|_: &str| {})).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn delivers_updates_in_order_then_closes() {
        let client = MemoryClient::new();
        client.open("pv", counter(0)).unwrap();
        let (tx, rx) = mpsc::channel();
        let cfg = BridgeConfig {
            output: crate::config::OutputMode::Strict,
            ..BridgeConfig::default()
        };
        let monitor = MonitorHandle::start(
            &client,
            "pv",
            &cfg,
            Box::new(move |s: &str| {
                let v: serde_json::Value = serde_json::from_str(s).unwrap();
                let _ = tx.send(v["n"].as_i64().unwrap());
            }),
        )
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 0);
        for n in 1..=3 {
            client.post("pv", counter(n)).unwrap();
            assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), n);
        }

        monitor.close();
        assert!(monitor.is_closed());
        let stats = monitor.stats();
        assert_eq!(stats.delivered, 4);
        assert_eq!(stats.skipped, 1);

        client.post("pv", counter(9)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        monitor.close();
    }
}
