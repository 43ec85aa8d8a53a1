//! Blocking get / put and monitor start-up.
//!
//! A [`Context`] pairs a [`BridgeConfig`] with a [`Client`]. Every operation
//! runs on the calling thread and blocks for at most the caller's timeout;
//! nothing is retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::{Client, PutRequest};
use crate::config::BridgeConfig;
use crate::data::Value;
use crate::error::{BridgeResult, ClientError, ValidationError};
use crate::json::{to_json, SerializeOptions};
use crate::monitor::MonitorHandle;

/// Configuration and client shared by all bridge operations.
#[derive(Clone)]
pub struct Context {
    config: BridgeConfig,
    client: Arc<dyn Client>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Context {
    /// Context over `client`.
    #[must_use]
    pub fn new(config: BridgeConfig, client: Arc<dyn Client>) -> Self {
        Self { config, client }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Client in use.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn Client> {
        &self.client
    }

    fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions::from(&self.config)
    }

    /// Fetch the current value of `name`.
    pub fn get_value(&self, name: &str, timeout_secs: f64) -> BridgeResult<Value> {
        if name.is_empty() {
            return Err(ValidationError::EmptyChannelName.into());
        }
        let timeout = self.config.timeout(timeout_secs);
        self.client.get(name, timeout).map_err(|e| {
            tracing::debug!(channel = name, error = %e, "get failed");
            e
        })
    }

    /// Fetch the current value of `name` and render it as text.
    pub fn get(&self, name: &str, timeout_secs: f64) -> BridgeResult<String> {
        let value = self.get_value(name, timeout_secs)?;
        Ok(to_json(&value, &self.serialize_options()))
    }

    /// Assign `values[i]` to field path `fields[i]` and write them as one put.
    ///
    /// Either every assignment is sent or none is.
    pub fn put<F, V>(&self, name: &str, fields: &[F], values: &[V], timeout_secs: f64) -> BridgeResult<()>
    where
        F: AsRef<str>,
        V: AsRef<str>,
    {
        if name.is_empty() {
            return Err(ValidationError::EmptyChannelName.into());
        }
        if fields.len() != values.len() {
            return Err(ValidationError::FieldCountMismatch {
                fields: fields.len(),
                values: values.len(),
            }
            .into());
        }

        let timeout = self.config.timeout(timeout_secs);
        let started = Instant::now();
        self.put_inner(name, fields, values, timeout, started).map_err(|e| {
            tracing::debug!(
                channel = name,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "put failed"
            );
            e
        })
    }

    fn put_inner<F, V>(
        &self,
        name: &str,
        fields: &[F],
        values: &[V],
        timeout: Duration,
        started: Instant,
    ) -> BridgeResult<()>
    where
        F: AsRef<str>,
        V: AsRef<str>,
    {
        let ty = self.client.info(name, timeout)?;
        let mut value = Value::create(&ty);
        for (field, text) in fields.iter().zip(values) {
            value.set_from_str(field.as_ref(), text.as_ref())?;
        }

        let remaining = timeout.checked_sub(started.elapsed()).ok_or_else(|| ClientError::Timeout {
            name: name.to_string(),
            duration_ms: timeout.as_millis() as u64,
        })?;
        let request = PutRequest {
            value,
            fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
        };
        self.client.put(name, request, remaining)?;
        tracing::debug!(channel = name, fields = fields.len(), "put complete");
        Ok(())
    }

    /// Put a bare value into the channel's `value` field.
    pub fn put_value(&self, name: &str, text: &str, timeout_secs: f64) -> BridgeResult<()> {
        self.put(name, &["value"], &[text], timeout_secs)
    }

    /// Start a monitor on `name`; `callback` receives the text of each update
    /// on the monitor's worker thread.
    pub fn monitor<F>(&self, name: &str, callback: F) -> BridgeResult<MonitorHandle>
    where
        F: FnMut(&str) + Send + 'static,
    {
        MonitorHandle::start(self.client.as_ref(), name, &self.config, Box::new(callback)).map_err(|e| {
            tracing::debug!(channel = name, error = %e, "monitor failed");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::MemoryClient;
    use crate::data::{ScalarKind, Store};
    use crate::nt::NTScalar;

    fn context() -> (Arc<MemoryClient>, Context) {
        let client = Arc::new(MemoryClient::new());
        let ctx = Context::new(BridgeConfig::default(), client.clone());
        (client, ctx)
    }

    fn open_scalar(client: &MemoryClient, name: &str, v: f64) {
        let ty = NTScalar::new(ScalarKind::Float64).build().unwrap();
        let mut value = Value::create(&ty);
        value.set("value", v).unwrap();
        client.open(name, value).unwrap();
    }

    #[test]
    fn get_renders_value() {
        let (client, ctx) = context();
        open_scalar(&client, "demo:pv", 2.5);
        let text = ctx.get("demo:pv", 1.0).unwrap();
        assert!(text.contains("\"value\": 2.5,"));
        assert!(text.contains("\"id\": \"epics:nt/NTScalar:1.0\""));
    }

    #[test]
    fn empty_name_fails_validation() {
        let (_, ctx) = context();
        assert!(ctx.get("", 1.0).unwrap_err().is_validation());
        assert!(ctx.put_value("", "1", 1.0).unwrap_err().is_validation());
    }

    #[test]
    fn mismatched_lists_fail_before_contacting_channel() {
        let (_, ctx) = context();
        let started = Instant::now();
        let err = ctx.put("nowhere", &["value", "alarm.severity"], &["1"], 5.0).unwrap_err();
        assert!(err.is_validation());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn put_applies_all_fields() {
        let (client, ctx) = context();
        open_scalar(&client, "demo:pv", 0.0);
        ctx.put("demo:pv", &["value", "alarm.severity"], &["42", "2"], 1.0).unwrap();
        let v = client.current("demo:pv").unwrap().unwrap();
        assert_eq!(v.get("value").and_then(Store::as_f64), Some(42.0));
        assert_eq!(v.get("alarm.severity").and_then(Store::as_i64), Some(2));
    }

    #[test]
    fn bad_text_leaves_channel_untouched() {
        let (client, ctx) = context();
        open_scalar(&client, "demo:pv", 1.0);
        let err = ctx.put("demo:pv", &["value", "alarm.severity"], &["7", "high"], 1.0).unwrap_err();
        assert!(err.is_validation());
        let v = client.current("demo:pv").unwrap().unwrap();
        assert_eq!(v.get("value").and_then(Store::as_f64), Some(1.0));
    }

    #[test]
    fn put_value_targets_value_field() {
        let (client, ctx) = context();
        open_scalar(&client, "demo:pv", 0.0);
        ctx.put_value("demo:pv", "3.5", 1.0).unwrap();
        let v = client.current("demo:pv").unwrap().unwrap();
        assert_eq!(v.get("value").and_then(Store::as_f64), Some(3.5));
    }
}
