//! Error types for the streaming server.
//!
//! [`EngineError`] covers request handling in the broadcast engine,
//! [`SourceError`] covers the backend pull side, and [`ServerError`]
//! covers binding and serving the HTTP listener.

use topostream_types::ConnectionId;

/// Errors raised by a [`TopologySource`](crate::source::TopologySource).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The backend could not be reached or refused the read.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding in-memory backend data was poisoned.
    #[error("backend state poisoned")]
    Poisoned,

    /// A fixture file could not be read.
    #[error("failed to read fixture: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A fixture file did not contain a valid topology.
    #[error("failed to parse fixture: {source}")]
    Fixture {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

/// Errors raised while handling a client request.
///
/// The first two variants are protocol violations: they indicate a client
/// bug and are reported back to the transport, which logs and rejects the
/// request without closing the connection.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// SUBSCRIBE on a connection that already has a subscription.
    #[error("{0} is already subscribed")]
    AlreadySubscribed(ConnectionId),

    /// UNSUBSCRIBE on a connection without a subscription.
    #[error("{0} is not subscribed")]
    NotSubscribed(ConnectionId),

    /// The snapshot could not be generated from the backend.
    #[error("snapshot generation failed: {0}")]
    Source(#[from] SourceError),
}

impl EngineError {
    /// Whether this error is a client protocol violation.
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::AlreadySubscribed(_) | Self::NotSubscribed(_))
    }
}

/// Errors that can occur when starting or running the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
