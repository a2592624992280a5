use std::net::Ipv4Addr;

use camino::Utf8PathBuf;

use crate::Platform;
use crate::endpoint::ServiceEndpoint;
use crate::telemetry::LogFormat;

/// Named pipe served by the routing service on Windows.
pub const DEFAULT_PIPE_NAME: &str = "BurrowRoutingService";

/// Socket path served by the routing service on Unix hosts.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/burrow_routing.sock";

/// Local port the SOCKS bridge listens on.
pub const DEFAULT_SOCKS_PORT: u16 = 1081;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

pub(crate) const ROUTER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 85, 1);
pub(crate) const DEVICE_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 85, 2);
pub(crate) const NETWORK: Ipv4Addr = Ipv4Addr::new(10, 0, 85, 0);
pub(crate) const NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

pub(crate) const TUN_DEVICE_NAME: &str = "burrow-tun0";
pub(crate) const TAP_DEVICE_NAME: &str = "burrow-tap0";
pub(crate) const TAP_COMPONENT_ID: &str = "tap0901";

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the routing service endpoint for the running platform.
#[must_use]
pub fn default_service_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::for_platform(Platform::current())
}

/// Default SOCKS bridge executable, resolved through `PATH`.
#[must_use]
pub fn default_socks_bridge_binary(platform: Platform) -> Utf8PathBuf {
    executable_name("ss-local", platform)
}

/// Default TUN relay executable, resolved through `PATH`.
#[must_use]
pub fn default_tun_relay_binary(platform: Platform) -> Utf8PathBuf {
    executable_name("badvpn-tun2socks", platform)
}

fn executable_name(stem: &str, platform: Platform) -> Utf8PathBuf {
    match platform {
        Platform::Windows => Utf8PathBuf::from(format!("{stem}.exe")),
        Platform::Unix => Utf8PathBuf::from(stem),
    }
}
