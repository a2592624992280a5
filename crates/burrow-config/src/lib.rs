//! Shared configuration for the Burrow traffic-interception core.
//!
//! Platform-specific choices (named pipe versus Unix socket, TUN versus TAP
//! device naming) are resolved once into a [`Platform`] value and carried in
//! [`Config`], which the routing client and the process supervisors receive
//! by injection rather than querying the host themselves.

mod config;
mod defaults;
mod endpoint;
mod network;
mod platform;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_PIPE_NAME, DEFAULT_SOCKET_PATH, DEFAULT_SOCKS_PORT,
    default_log_format, default_service_endpoint, default_socks_bridge_binary,
    default_tun_relay_binary,
};
pub use endpoint::{EndpointParseError, ServiceEndpoint, pipe_path};
pub use network::{NetworkLayout, TunDevice};
pub use platform::{Platform, PlatformParseError};
pub use telemetry::{LogFormat, LogFormatParseError};
