//! Client for the privileged service that installs and removes OS routing
//! rules for the Burrow tunnel.
//!
//! [`RoutingClient::configure`] and [`RoutingClient::reset`] write one JSON
//! request each over a named pipe (Windows) or Unix domain socket and return
//! a [`PendingOperation`] that settles when the matching response arrives.
//! Responses and unsolicited `statusChanged` events share the connection and
//! are told apart by their `action` field.

mod client;
mod errors;
mod pending;
#[cfg(windows)]
mod pipe;
pub mod protocol;
mod transport;

#[cfg(all(test, unix))]
mod tests;

pub use client::{ConnectionPhase, RoutingClient};
pub use errors::RoutingError;
pub use pending::PendingOperation;
pub use protocol::{RoutingAction, ServiceStatus, StatusCode};
pub use transport::{CONNECT_TIMEOUT, Connector, EndpointConnector, ServiceStream};
