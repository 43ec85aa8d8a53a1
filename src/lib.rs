//! # pva-bridge
//!
//! Blocking get/put and callback monitors over process variables, rendered as
//! JSON-like text and exposed through a flat C ABI.
//!
//! ## Core Concepts
//!
//! - **Type**: an immutable, shared descriptor tree (struct, union, any,
//!   scalar and array nodes)
//! - **Value**: a type paired with a parallel store of current data
//! - **Client**: the seam to the transport; [`MemoryClient`] serves
//!   channels in-process
//! - **Monitor**: a subscription drained on its own worker thread, handing
//!   each update's text to a callback
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use pvabridge::data::{ScalarKind, Value};
//! use pvabridge::nt::NTScalar;
//! use pvabridge::{BridgeConfig, Context, MemoryClient};
//!
//! let client = Arc::new(MemoryClient::new());
//! let ty = NTScalar::new(ScalarKind::Float64).build().unwrap();
//! let mut value = Value::create(&ty);
//! value.set("value", 1.5).unwrap();
//! client.open("demo:pv", value).unwrap();
//!
//! let ctx = Context::new(BridgeConfig::default(), client);
//! ctx.put_value("demo:pv", "42", 1.0).unwrap();
//! let text = ctx.get("demo:pv", 1.0).unwrap();
//! assert!(text.contains("\"value\": 42,"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod ffi;
pub mod json;
pub mod monitor;
pub mod nt;

pub use client::{Client, EventHook, MemoryClient, PutRequest, Subscription, Update};
pub use config::{BridgeConfig, OutputMode};
pub use context::Context;
pub use data::{Member, ScalarKind, Store, Type, TypeCode, TypeDef, Value};
pub use error::{BridgeError, BridgeResult, ClientError, MonitorError, ValidationError};
pub use json::{to_json, to_json_field, SerializeOptions};
pub use monitor::{MonitorHandle, MonitorStats, SubscriptionId};
