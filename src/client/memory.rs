//! In-process provider.
//!
//! Serves channels held in memory. It backs the tests and any host that wants
//! to expose locally owned values through the bridge. A channel that has not
//! been opened behaves like an unreachable one: the search never completes and
//! operations fail once their timeout expires.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use crate::config::BridgeConfig;
use crate::data::{Type, Value};
use crate::error::{BridgeError, BridgeResult, ClientError, ValidationError};

use super::{Client, EventHook, PutRequest, Subscription, Update};

fn lock_err(context: &'static str) -> BridgeError {
    BridgeError::internal(format!("poisoned lock: {context}"))
}

fn timeout_err(name: &str, timeout: Duration) -> BridgeError {
    ClientError::Timeout {
        name: name.to_string(),
        duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
    }
    .into()
}

#[derive(Debug)]
struct Channel {
    value: Value,
    read_only: bool,
}

#[derive(Default)]
struct State {
    channels: HashMap<String, Channel>,
    subscribers: HashMap<String, Vec<Weak<MemorySubscription>>>,
}

impl State {
    /// Live subscribers of `name`, pruning dropped or cancelled ones.
    fn live_subscribers(&mut self, name: &str) -> Vec<Arc<MemorySubscription>> {
        let Some(list) = self.subscribers.get_mut(name) else {
            return Vec::new();
        };
        list.retain(|w| w.upgrade().is_some_and(|s| !s.is_cancelled()));
        list.iter().filter_map(Weak::upgrade).collect()
    }
}

/// Loopback client serving channels from memory.
pub struct MemoryClient {
    state: Mutex<State>,
    opened: Condvar,
    buffer: usize,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient").field("buffer", &self.buffer).finish_non_exhaustive()
    }
}

impl MemoryClient {
    /// Client buffering up to 4 updates per subscription.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(BridgeConfig::default().subscription_buffer)
    }

    /// Client buffering up to `buffer` updates per subscription.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            opened: Condvar::new(),
            buffer: buffer.max(1),
        }
    }

    /// Client sized from a configuration.
    #[must_use]
    pub fn from_config(cfg: &BridgeConfig) -> Self {
        Self::with_buffer(cfg.subscription_buffer)
    }

    fn lock(&self) -> BridgeResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| lock_err("memory client"))
    }

    /// Create or replace a channel. Subscribers see a connection event
    /// followed by the initial value.
    pub fn open(&self, name: &str, initial: Value) -> BridgeResult<()> {
        if name.is_empty() {
            return Err(ValidationError::EmptyChannelName.into());
        }
        let subs = {
            let mut state = self.lock()?;
            state.channels.insert(
                name.to_string(),
                Channel {
                    value: initial.clone(),
                    read_only: false,
                },
            );
            state.live_subscribers(name)
        };
        self.opened.notify_all();

        tracing::debug!(channel = name, subscribers = subs.len(), "channel opened");
        for sub in subs {
            sub.deliver(Update::Connected);
            sub.deliver(Update::Data(initial.clone()));
        }
        Ok(())
    }

    /// Publish a new value to a channel and its subscribers.
    pub fn post(&self, name: &str, value: Value) -> BridgeResult<()> {
        let subs = {
            let mut state = self.lock()?;
            let Some(channel) = state.channels.get_mut(name) else {
                return Err(ClientError::NotFound {
                    name: name.to_string(),
                }
                .into());
            };
            channel.value = value.clone();
            state.live_subscribers(name)
        };
        for sub in subs {
            sub.deliver(Update::Data(value.clone()));
        }
        Ok(())
    }

    /// Remove a channel. Subscribers see a disconnect event.
    pub fn close_channel(&self, name: &str) -> BridgeResult<()> {
        let subs = {
            let mut state = self.lock()?;
            if state.channels.remove(name).is_none() {
                return Err(ClientError::NotFound {
                    name: name.to_string(),
                }
                .into());
            }
            state.live_subscribers(name)
        };
        for sub in subs {
            sub.deliver(Update::Disconnected);
        }
        Ok(())
    }

    /// Reject puts to `name` while set.
    pub fn set_read_only(&self, name: &str, read_only: bool) -> BridgeResult<()> {
        let mut state = self.lock()?;
        let channel = state.channels.get_mut(name).ok_or_else(|| ClientError::NotFound {
            name: name.to_string(),
        })?;
        channel.read_only = read_only;
        Ok(())
    }

    /// Current value of an open channel, without waiting.
    pub fn current(&self, name: &str) -> BridgeResult<Option<Value>> {
        Ok(self.lock()?.channels.get(name).map(|c| c.value.clone()))
    }

    /// Wait until `name` is open, then run `f` on its channel.
    fn with_channel<T>(
        &self,
        name: &str,
        timeout: Duration,
        f: impl FnOnce(&mut Channel) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        let guard = self.lock()?;
        let (mut guard, _) = self
            .opened
            .wait_timeout_while(guard, timeout, |state| !state.channels.contains_key(name))
            .map_err(|_| lock_err("memory client"))?;
        match guard.channels.get_mut(name) {
            Some(channel) => f(channel),
            None => Err(timeout_err(name, timeout)),
        }
    }
}

impl Client for MemoryClient {
    fn get(&self, name: &str, timeout: Duration) -> BridgeResult<Value> {
        self.with_channel(name, timeout, |channel| Ok(channel.value.clone()))
    }

    fn info(&self, name: &str, timeout: Duration) -> BridgeResult<Type> {
        self.with_channel(name, timeout, |channel| {
            channel.value.ty().cloned().ok_or_else(|| {
                ClientError::Rejected {
                    name: name.to_string(),
                    message: "channel has no type".to_string(),
                }
                .into()
            })
        })
    }

    fn put(&self, name: &str, request: PutRequest, timeout: Duration) -> BridgeResult<()> {
        let started = Instant::now();
        let updated = self.with_channel(name, timeout, |channel| {
            if channel.read_only {
                return Err(ClientError::Rejected {
                    name: name.to_string(),
                    message: "channel is read-only".to_string(),
                }
                .into());
            }
            let same_type = match (channel.value.ty(), request.value.ty()) {
                (Some(a), Some(b)) => a.same(b),
                _ => false,
            };
            if !same_type {
                return Err(ClientError::Rejected {
                    name: name.to_string(),
                    message: "put value does not have the channel's type".to_string(),
                }
                .into());
            }

            // Apply to a copy so a failing field leaves the channel untouched.
            let mut next = channel.value.clone();
            for path in &request.fields {
                let store = request.value.get(path).cloned().ok_or_else(|| ValidationError::UnknownField {
                    path: path.clone(),
                })?;
                next.set(path, store)?;
            }
            channel.value = next.clone();
            Ok(next)
        })?;

        let subs = self.lock()?.live_subscribers(name);
        tracing::debug!(
            channel = name,
            fields = request.fields.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "put applied"
        );
        for sub in subs {
            sub.deliver(Update::Data(updated.clone()));
        }
        Ok(())
    }

    fn subscribe(&self, name: &str, on_event: EventHook) -> BridgeResult<Arc<dyn Subscription>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyChannelName.into());
        }
        let sub = Arc::new(MemorySubscription::new(name, self.buffer, on_event));
        let initial = {
            let mut state = self.lock()?;
            state
                .subscribers
                .entry(name.to_string())
                .or_default()
                .push(Arc::downgrade(&sub));
            state.channels.get(name).map(|c| c.value.clone())
        };
        if let Some(value) = initial {
            sub.deliver(Update::Connected);
            sub.deliver(Update::Data(value));
        }
        Ok(sub)
    }
}

/// Subscription served by [`MemoryClient`].
pub struct MemorySubscription {
    name: String,
    capacity: usize,
    buffer: Mutex<VecDeque<Update>>,
    hook: Mutex<Option<EventHook>>,
    cancelled: AtomicBool,
    overflows: AtomicU64,
}

impl std::fmt::Debug for MemorySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySubscription")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl MemorySubscription {
    fn new(name: &str, capacity: usize, hook: EventHook) -> Self {
        Self {
            name: name.to_string(),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            hook: Mutex::new(Some(hook)),
            cancelled: AtomicBool::new(false),
            overflows: AtomicU64::new(0),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Updates squashed because the buffer was full.
    #[must_use]
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Buffer `update` and signal the hook. When full, the newest slot is
    /// overwritten.
    fn deliver(&self, update: Update) {
        if self.is_cancelled() {
            return;
        }
        {
            let Ok(mut buffer) = self.buffer.lock() else {
                return;
            };
            if buffer.len() >= self.capacity {
                buffer.pop_back();
                self.overflows.fetch_add(1, Ordering::Relaxed);
            }
            buffer.push_back(update);
        }
        let hook = self.hook.lock().ok().and_then(|h| h.clone());
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl Subscription for MemorySubscription {
    fn name(&self) -> &str {
        &self.name
    }

    fn pop(&self) -> BridgeResult<Option<Update>> {
        if self.is_cancelled() {
            return Err(ClientError::Cancelled {
                name: self.name.clone(),
            }
            .into());
        }
        let mut buffer = self.buffer.lock().map_err(|_| lock_err("subscription buffer"))?;
        Ok(buffer.pop_front())
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the hook releases whatever it captured.
        if let Ok(mut hook) = self.hook.lock() {
            hook.take();
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
    }
}
