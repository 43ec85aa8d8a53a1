//! Bridge configuration.
//!
//! A `BridgeConfig` is built once (usually by the C boundary) and handed to a
//! [`Context`](crate::context::Context); operations never consult the process
//! environment themselves.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Environment variable overriding [`BridgeConfig::default_timeout_secs`].
pub const ENV_TIMEOUT: &str = "PVA_BRIDGE_TIMEOUT";
/// Environment variable overriding [`BridgeConfig::queue_capacity`].
pub const ENV_QUEUE_CAPACITY: &str = "PVA_BRIDGE_QUEUE_CAPACITY";
/// Environment variable overriding [`BridgeConfig::array_limit`].
pub const ENV_ARRAY_LIMIT: &str = "PVA_BRIDGE_ARRAY_LIMIT";
/// Environment variable overriding [`BridgeConfig::output`].
pub const ENV_OUTPUT: &str = "PVA_BRIDGE_OUTPUT";

/// Notification queue capacity used by every monitor unless overridden.
pub const DEFAULT_QUEUE_CAPACITY: usize = 42;

/// Textual dialect produced by the serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Every scalar and every nested closer carries a trailing comma.
    #[default]
    Literal,
    /// Standards-strict JSON.
    Strict,
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "literal" => Ok(Self::Literal),
            "strict" | "json" => Ok(Self::Strict),
            other => Err(format!("unknown output mode '{other}'")),
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Timeout used when a caller passes a non-positive or non-finite timeout.
    pub default_timeout_secs: f64,
    /// Capacity of each monitor's notification queue.
    pub queue_capacity: usize,
    /// Updates buffered per subscription by the in-process provider.
    pub subscription_buffer: usize,
    /// Maximum scalar array elements rendered; 0 renders all of them.
    pub array_limit: usize,
    pub output: OutputMode,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 5.0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            subscription_buffer: 4,
            array_limit: 0,
            output: OutputMode::Literal,
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with `PVA_BRIDGE_*` environment variables.
    ///
    /// Malformed values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Parse a JSON configuration document. Missing keys take their defaults.
    pub fn from_json(s: &str) -> BridgeResult<Self> {
        serde_json::from_str(s).map_err(|e| BridgeError::internal(format!("parse config: {e}")))
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() && v > 0.0 => self.default_timeout_secs = v,
                _ => tracing::warn!(var = ENV_TIMEOUT, value = %raw, "ignoring invalid timeout"),
            }
        }
        if let Some(raw) = lookup(ENV_QUEUE_CAPACITY) {
            match raw.trim().parse::<usize>() {
                Ok(v) if v > 0 => self.queue_capacity = v,
                _ => tracing::warn!(var = ENV_QUEUE_CAPACITY, value = %raw, "ignoring invalid queue capacity"),
            }
        }
        if let Some(raw) = lookup(ENV_ARRAY_LIMIT) {
            match raw.trim().parse::<usize>() {
                Ok(v) => self.array_limit = v,
                Err(_) => tracing::warn!(var = ENV_ARRAY_LIMIT, value = %raw, "ignoring invalid array limit"),
            }
        }
        if let Some(raw) = lookup(ENV_OUTPUT) {
            match raw.parse::<OutputMode>() {
                Ok(mode) => self.output = mode,
                Err(e) => tracing::warn!(var = ENV_OUTPUT, error = %e, "ignoring invalid output mode"),
            }
        }
        self
    }

    /// Resolve a caller-supplied timeout in seconds.
    #[must_use]
    pub fn timeout(&self, secs: f64) -> Duration {
        let secs = if secs.is_finite() && secs > 0.0 {
            secs
        } else {
            self.default_timeout_secs
        };
        Duration::from_secs_f64(secs.min(f64::from(u32::MAX)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    #[test]
    fn defaults_match_fixed_queue_bound() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.queue_capacity, 42);
        assert_eq!(cfg.array_limit, 0);
        assert_eq!(cfg.output, OutputMode::Literal);
    }

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = [
            (ENV_TIMEOUT, "2.5"),
            (ENV_QUEUE_CAPACITY, "zero"),
            (ENV_ARRAY_LIMIT, "16"),
            (ENV_OUTPUT, "strict"),
        ]
        .into_iter()
        .collect();

        let cfg = BridgeConfig::default().with_overrides(|k| vars.get(k).map(|v| (*v).to_string()));
        assert!((cfg.default_timeout_secs - 2.5).abs() < f64::EPSILON);
        assert_eq!(cfg.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(cfg.array_limit, 16);
        assert_eq!(cfg.output, OutputMode::Strict);
    }

    #[test]
    fn timeout_falls_back_for_nonsense_input() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.timeout(0.25), Duration::from_millis(250));
        assert_eq!(cfg.timeout(0.0), Duration::from_secs(5));
        assert_eq!(cfg.timeout(f64::NAN), Duration::from_secs(5));
        assert_eq!(cfg.timeout(-1.0), Duration::from_secs(5));
    }

    #[test]
    fn json_config_fills_missing_keys() {
        let cfg = BridgeConfig::from_json(r#"{"output": "strict", "array_limit": 8}"#).unwrap();
        assert_eq!(cfg.output, OutputMode::Strict);
        assert_eq!(cfg.array_limit, 8);
        assert_eq!(cfg.queue_capacity, 42);

        assert!(BridgeConfig::from_json("{").is_err());
    }
}
