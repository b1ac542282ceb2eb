//! Error types for i3wire-client.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::MessageType;

/// Main error type for all IPC operations.
///
/// The type is `Clone` so a single fatal cause can be handed to every
/// waiter when the dispatcher shuts down. I/O and JSON sources are kept
/// behind an `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum IpcError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    /// Header corrupt, truncated or declaring an oversized payload.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Type tag outside the enumerated message or event range.
    #[error("Unknown type tag {tag:#010x}")]
    UnknownType {
        /// Raw type tag as received.
        tag: u32,
    },

    /// Could not connect to the server socket.
    #[error("Failed to connect to {path}: {source}")]
    ConnectionError {
        /// Socket path that was dialed.
        path: String,
        /// Underlying I/O failure.
        source: Arc<std::io::Error>,
    },

    /// Connection closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No reply arrived within the configured bound.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A reply arrived that no pending request was waiting for.
    #[error("Unexpected {0} reply")]
    UnexpectedReply(MessageType),

    /// The server refused a subscription.
    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    /// The dispatcher was stopped while the operation was in flight.
    #[error("Cancelled")]
    Cancelled,

    /// Misuse of the API (e.g. an empty command).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server socket path could not be determined.
    #[error("Socket path not found: {0}")]
    SocketPathNotFound(String),

    /// Error reported by a hook callback.
    #[error("Hook error: {0}")]
    Hook(String),
}

impl IpcError {
    /// Whether this error leaves the connection unusable.
    ///
    /// Fatal errors terminate the dispatcher; the owning application has to
    /// reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IpcError::Io(_)
                | IpcError::MalformedFrame(_)
                | IpcError::ConnectionError { .. }
                | IpcError::ConnectionClosed
                | IpcError::UnexpectedReply(_)
                | IpcError::Cancelled
        )
    }

    /// Create a hook error from any displayable value.
    pub fn hook(message: impl std::fmt::Display) -> Self {
        IpcError::Hook(message.to_string())
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        IpcError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        IpcError::Json(Arc::new(err))
    }
}

/// Result type alias using IpcError.
pub type Result<T> = std::result::Result<T, IpcError>;
