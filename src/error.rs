//! Error types for smartnet.

use thiserror::Error;

/// Main error type for all smartnet operations.
#[derive(Debug, Error)]
pub enum SmartError {
    /// I/O error during socket operations (bind, accept, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// YAML configuration error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File watcher error.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Protocol error (malformed frame or envelope body).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame length is at or above the configured maximum.
    #[error("Frame too big: {length} >= {max}")]
    FrameTooBig { length: usize, max: usize },

    /// Payload codec failure or unsupported codec kind.
    #[error("Codec error: {0}")]
    Codec(String),

    /// No handler registered for the route code.
    #[error("Route not found: {0}")]
    RouteNotFound(i32),

    /// Handler registration rejected.
    #[error("Registration of `{name}` failed: {reason}")]
    Registration { name: String, reason: String },

    /// Server lifecycle transition attempted from the wrong state.
    #[error("Invalid state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Channel closed; no more frames can be sent.
    #[error("Channel closed")]
    ChannelClosed,

    /// Outbound queue is full.
    #[error("Backpressure timeout")]
    Backpressure,

    /// Connection could not be established before the dial timeout.
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(std::time::Duration),
}

/// Result type alias using SmartError.
pub type Result<T> = std::result::Result<T, SmartError>;
