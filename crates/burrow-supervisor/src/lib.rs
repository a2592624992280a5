//! Supervision of the external tunneling processes.
//!
//! [`ProcessSupervisor`] launches one executable, kills it on request and
//! reports once per launch that it is no longer running. [`SocksBridge`] and
//! [`TunRelay`] fix the executable and argument list for the two processes
//! the tunnel depends on.

mod errors;
mod socks_bridge;
mod supervisor;
mod tun_relay;

#[cfg(all(test, unix))]
mod tests;

pub use errors::SupervisorError;
pub use socks_bridge::{ProxyServer, SOCKS_BRIDGE_TIMEOUT_SECS, SocksBridge, socks_bridge_arguments};
pub use supervisor::{DEFAULT_POLL_INTERVAL, ProcessSupervisor};
pub use tun_relay::{TunRelay, tun_relay_arguments};
