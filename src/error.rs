//! Error types for pva-bridge.
//!
//! All errors are strongly typed using thiserror. Internally every operation
//! returns a [`BridgeResult`]; the C boundary is the only place where an error
//! is flattened into an integer status and a diagnostic line.

use thiserror::Error;

/// Validation errors that occur before anything is sent to a channel.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Channel name cannot be empty")]
    EmptyChannelName,

    #[error("Required argument '{argument}' is missing")]
    MissingArgument {
        argument: String,
    },

    #[error("Field list has {fields} entries but value list has {values}")]
    FieldCountMismatch {
        fields: usize,
        values: usize,
    },

    #[error("Field '{path}' does not exist")]
    UnknownField {
        path: String,
    },

    #[error("Cannot assign '{text}' to field '{path}' of type {type_code}: {reason}")]
    InvalidFieldValue {
        path: String,
        text: String,
        type_code: String,
        reason: String,
    },

    #[error("Invalid member name '{name}'")]
    InvalidMemberName {
        name: String,
    },

    #[error("Argument '{argument}' is invalid: {reason}")]
    InvalidArgument {
        argument: String,
        reason: String,
    },

    #[error("Argument '{argument}' is not valid UTF-8")]
    InvalidUtf8 {
        argument: String,
    },
}

/// Connection and protocol errors reported by the client collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Operation on '{name}' timed out after {duration_ms}ms")]
    Timeout {
        name: String,
        duration_ms: u64,
    },

    #[error("Channel '{name}' not found")]
    NotFound {
        name: String,
    },

    #[error("Server rejected request on '{name}': {message}")]
    Rejected {
        name: String,
        message: String,
    },

    #[error("Channel '{name}' disconnected")]
    Disconnected {
        name: String,
    },

    #[error("Subscription to '{name}' was cancelled")]
    Cancelled {
        name: String,
    },
}

/// Errors from monitor setup and teardown.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Unable to create monitor worker for '{name}': {message}")]
    SpawnFailed {
        name: String,
        message: String,
    },

    #[error("Notification queue is closed")]
    QueueClosed,

    #[error("Monitor {id} is not registered")]
    UnknownMonitor {
        id: u64,
    },
}

/// Top-level error type for pva-bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl BridgeError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a client error.
    #[must_use]
    pub const fn is_client(&self) -> bool {
        matches!(self, Self::Client(_))
    }

    /// Returns true if this is a monitor error.
    #[must_use]
    pub const fn is_monitor(&self) -> bool {
        matches!(self, Self::Monitor(_))
    }

    /// Returns true if the operation ran out of time.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Client(ClientError::Timeout { .. }))
    }

    /// Returns true if a caller could reasonably try again.
    ///
    /// This layer never retries on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Client(e) => matches!(
                e,
                ClientError::Timeout { .. } | ClientError::Disconnected { .. }
            ),
            Self::Validation(_) | Self::Monitor(_) | Self::Internal { .. } => false,
        }
    }

    /// Integer status reported across the C boundary.
    #[must_use]
    pub const fn status_code(&self) -> i32 {
        -1
    }
}

/// Result type alias for pva-bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
