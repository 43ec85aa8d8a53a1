//! Bounded notification queue.
//!
//! Multi-producer, single-consumer queue of subscription handles. A handle is
//! present at most once: producers flip the handle's `queued` flag before
//! sending and the consumer clears it on receipt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

use crate::error::{BridgeResult, MonitorError};

/// Items carried by a [`NotificationQueue`].
pub trait Queued: Send + Sync {
    /// Set while the item sits in a queue.
    fn queued(&self) -> &AtomicBool;
}

/// Outcome of a non-blocking [`NotificationQueue::requeue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Item was added.
    Queued,
    /// Item was already in the queue.
    AlreadyQueued,
    /// Queue full; item not added and its flag left clear.
    Full,
    /// Queue closed.
    Closed,
}

/// Bounded queue with a shutdown signal observed by both ends.
#[derive(Debug)]
pub struct NotificationQueue<T> {
    tx: Sender<Arc<T>>,
    rx: Receiver<Arc<T>>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    closed: AtomicBool,
}

impl<T: Queued> NotificationQueue<T> {
    /// Queue holding at most `capacity` items (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded(1);
        Self {
            tx,
            rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Add `item` unless it is already queued. Blocks while the queue is full
    /// until space frees up or the queue is closed.
    ///
    /// Returns `Ok(false)` when the item was already present.
    pub fn push(&self, item: &Arc<T>) -> BridgeResult<bool> {
        if self.is_closed() {
            return Err(MonitorError::QueueClosed.into());
        }
        if item.queued().swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        select! {
            send(self.tx, Arc::clone(item)) -> res => match res {
                Ok(()) => Ok(true),
                Err(_) => {
                    item.queued().store(false, Ordering::Release);
                    Err(MonitorError::QueueClosed.into())
                }
            },
            recv(self.shutdown_rx) -> _ => {
                item.queued().store(false, Ordering::Release);
                Err(MonitorError::QueueClosed.into())
            }
        }
    }

    /// Non-blocking variant of [`push`](Self::push).
    pub fn requeue(&self, item: &Arc<T>) -> Requeue {
        if self.is_closed() {
            return Requeue::Closed;
        }
        if item.queued().swap(true, Ordering::AcqRel) {
            return Requeue::AlreadyQueued;
        }
        match self.tx.try_send(Arc::clone(item)) {
            Ok(()) => Requeue::Queued,
            Err(TrySendError::Full(_)) => {
                item.queued().store(false, Ordering::Release);
                Requeue::Full
            }
            Err(TrySendError::Disconnected(_)) => {
                item.queued().store(false, Ordering::Release);
                Requeue::Closed
            }
        }
    }

    /// Take the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed.
    pub fn pop(&self) -> Option<Arc<T>> {
        if self.is_closed() {
            return None;
        }
        select! {
            recv(self.rx) -> msg => match msg {
                Ok(item) => {
                    item.queued().store(false, Ordering::Release);
                    Some(item)
                }
                Err(_) => None,
            },
            recv(self.shutdown_rx) -> _ => None,
        }
    }

    /// Wake every blocked producer and the consumer; later calls fail fast.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut guard) = self.shutdown_tx.lock() {
            guard.take();
        }
    }

    /// True after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
