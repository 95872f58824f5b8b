//! Error types for blegui-client.

use thiserror::Error;

use crate::value::ValueType;

/// Main error type for all protocol, codec and tree operations.
#[derive(Debug, Error)]
pub enum GuiError {
    /// Malformed, overflowing or out-of-sequence fragment.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Codec read past the end of the buffer.
    #[error("Read of {requested} bytes exceeds remaining {remaining} bytes")]
    OutOfRange { requested: usize, remaining: usize },

    /// Tagged value shape does not match the requested or expected one.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: ValueType, actual: ValueType },

    /// Path does not resolve to a node in the value tree.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Value has the right shape but is not acceptable (NaN, out of bounds, ...).
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Characteristic write rejected.
    #[error("Transport write failed: {0}")]
    TransportWrite(String),

    /// Notification start/stop rejected.
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// Descriptor document is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// String payload is not valid UTF-8.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A request was not answered within the configured timeout.
    #[error("Request {0} timed out")]
    RequestTimeout(u32),

    /// Protocol violation (unknown packet kind, bad command, ...).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Session or writer has been shut down.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using GuiError.
pub type Result<T> = std::result::Result<T, GuiError>;
