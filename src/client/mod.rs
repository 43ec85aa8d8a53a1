//! Client seam.
//!
//! Connection management, channel search and protocol framing belong to the
//! client library behind these traits. The bridge only needs single
//! round-trip get/put and a subscription that buffers updates and signals
//! their arrival through an [`EventHook`].

use std::sync::Arc;
use std::time::Duration;

use crate::data::{Type, Value};
use crate::error::BridgeResult;

/// In-process provider.
pub mod memory;

pub use memory::MemoryClient;

/// Called by the client library, on its own thread, whenever a subscription
/// has new updates buffered.
pub type EventHook = Arc<dyn Fn() + Send + Sync>;

/// One buffered subscription update.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// New data for the channel.
    Data(Value),
    /// Channel (re)connected; carries no payload.
    Connected,
    /// Channel lost; carries no payload.
    Disconnected,
}

impl Update {
    /// The payload, if this update has one.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        match self {
            Self::Data(v) => Some(v),
            Self::Connected | Self::Disconnected => None,
        }
    }
}

/// Assignments for one put.
#[derive(Debug, Clone)]
pub struct PutRequest {
    /// Value of the channel's type holding the assigned fields.
    pub value: Value,
    /// Dotted paths of the fields that were assigned.
    pub fields: Vec<String>,
}

/// A live monitor.
pub trait Subscription: Send + Sync {
    /// Channel name.
    fn name(&self) -> &str;

    /// Take the oldest buffered update. `Ok(None)` when nothing is buffered.
    fn pop(&self) -> BridgeResult<Option<Update>>;

    /// Stop delivering updates and release the event hook. Idempotent.
    fn cancel(&self);
}

/// Client library operations used by the bridge.
pub trait Client: Send + Sync {
    /// Fetch the current value.
    fn get(&self, name: &str, timeout: Duration) -> BridgeResult<Value>;

    /// Fetch the channel's type without its data.
    fn info(&self, name: &str, timeout: Duration) -> BridgeResult<Type>;

    /// Write the assigned fields as one operation.
    fn put(&self, name: &str, request: PutRequest, timeout: Duration) -> BridgeResult<()>;

    /// Start a monitor. `on_event` runs whenever updates become available.
    fn subscribe(&self, name: &str, on_event: EventHook) -> BridgeResult<Arc<dyn Subscription>>;
}
