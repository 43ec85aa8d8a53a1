//! Drain loop worker.
//!
//! Runs on the monitor's own thread: pops the subscription handle, pulls one
//! buffered update, serializes it and hands the text to the callback. Faults in
//! a single update are logged and counted; the loop keeps going.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::client::Update;
use crate::error::{BridgeError, ClientError};
use crate::json::{to_json, SerializeOptions};

use super::queue::{NotificationQueue, Requeue};
use super::{Counters, MonitorCallback, SubscriptionHandle};

/// What one pass over a popped handle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Nothing buffered. The event hook re-arms the handle.
    Idle,
    /// Connection event; no callback.
    Skipped,
    /// Callback ran.
    Delivered,
    /// Pulling, serializing or delivering the update failed.
    Fault,
}

impl Step {
    const fn requeue(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

pub(crate) fn drain_loop(
    queue: &NotificationQueue<SubscriptionHandle>,
    opts: &SerializeOptions,
    callback: &mut MonitorCallback,
    counters: &Counters,
) {
    while let Some(handle) = queue.pop() {
        let step = drain_one(&handle, opts, callback, counters);
        if !step.requeue() {
            continue;
        }
        match queue.requeue(&handle) {
            Requeue::Queued | Requeue::AlreadyQueued => {}
            Requeue::Full => {
                counters.requeue_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel = %handle.name, id = %handle.id, "notification queue full; handle not re-enqueued");
            }
            Requeue::Closed => break,
        }
    }
    tracing::debug!("monitor drain loop exiting");
}

pub(crate) fn drain_one(
    handle: &Arc<SubscriptionHandle>,
    opts: &SerializeOptions,
    callback: &mut MonitorCallback,
    counters: &Counters,
) -> Step {
    let Some(sub) = handle.subscription() else {
        return Step::Idle;
    };
    let update = match sub.pop() {
        Ok(Some(update)) => update,
        Ok(None) => return Step::Idle,
        Err(BridgeError::Client(ClientError::Cancelled { .. })) => return Step::Idle,
        Err(e) => {
            counters.faults.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(channel = %handle.name, id = %handle.id, error = %e, "subscription pop failed");
            return Step::Fault;
        }
    };

    let value = match update {
        Update::Data(value) => value,
        Update::Connected | Update::Disconnected => {
            tracing::debug!(channel = %handle.name, event = ?update, "connection event");
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Step::Skipped;
        }
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let text = to_json(&value, opts);
        callback(&text);
    }));
    match outcome {
        Ok(()) => {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
            Step::Delivered
        }
        Err(payload) => {
            counters.faults.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                channel = %handle.name,
                id = %handle.id,
                error = panic_message(payload.as_ref()),
                "monitor update failed"
            );
            Step::Fault
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
