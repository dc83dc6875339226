//! Error types for the topology client.

use topostream_types::CodecError;

/// Errors raised by the connection side of the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The `WebSocket` handshake did not complete in time.
    #[error("connect to {url} timed out after {timeout_ms}ms")]
    ConnectTimeout {
        /// Server URL.
        url: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The `WebSocket` handshake failed.
    #[error("connect to {url} failed: {reason}")]
    Connect {
        /// Server URL.
        url: String,
        /// Failure reported by the transport.
        reason: String,
    },

    /// A request could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// `start` was called while the connection loop is running.
    #[error("consumer service already started")]
    AlreadyStarted,
}

/// Error returned by a [`Consumer`](crate::Consumer) callback.
///
/// A failing consumer never affects delivery to the others; the error is
/// only logged.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ConsumerError(String);

impl ConsumerError {
    /// Wrap a failure description.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
