//! Error types surfaced by the routing client.

use std::io;

use thiserror::Error;

use crate::protocol::RoutingAction;

/// Errors raised by [`RoutingClient`](crate::RoutingClient) operations.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The routing service could not be reached; it is not running or not
    /// installed. Retrying without outside intervention will not help.
    #[error("routing service at {endpoint} is unavailable: {source}")]
    ServiceUnavailable {
        /// Endpoint the client tried to reach.
        endpoint: String,
        /// Underlying connect error.
        #[source]
        source: io::Error,
    },

    /// `configure` was called while a connection is still open.
    #[error("already connected to the routing service")]
    AlreadyConnected,

    /// An operation of the same kind is still awaiting its response.
    #[error("a {action} request is already in flight")]
    OperationInFlight {
        /// Action that is already pending.
        action: RoutingAction,
    },

    /// The request could not be written to the service.
    #[error("failed to send {action} request: {source}")]
    Send {
        /// Action being sent.
        action: RoutingAction,
        /// Underlying write error.
        #[source]
        source: io::Error,
    },

    /// The request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The connection reader thread could not be started.
    #[error("failed to start connection reader: {source}")]
    Reader {
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// The service cannot configure the host routing table layout.
    #[error("routing table is not supported by the routing service{}", detail(.message))]
    UnsupportedRoutingTable {
        /// Message supplied by the service.
        message: Option<String>,
    },

    /// The service reported a configure failure.
    #[error("routing service failed to configure routing{}", detail(.message))]
    ConfigureFailed {
        /// Message supplied by the service.
        message: Option<String>,
    },

    /// The service reported a reset failure.
    #[error("routing service failed to reset routing{}", detail(.message))]
    ResetFailed {
        /// Message supplied by the service.
        message: Option<String>,
    },

    /// The service sent something the protocol does not allow.
    #[error("routing protocol violation: {detail}")]
    ProtocolViolation {
        /// What was received.
        detail: String,
    },

    /// The connection closed before the response arrived.
    #[error("connection to routing service closed before {action} completed")]
    ConnectionLost {
        /// Action left without a response.
        action: RoutingAction,
    },

    /// No response arrived within the caller's deadline.
    #[error("{action} did not complete within {timeout_ms} ms")]
    Timeout {
        /// Action still pending.
        action: RoutingAction,
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },
}

fn detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|text| format!(": {text}"))
        .unwrap_or_default()
}
