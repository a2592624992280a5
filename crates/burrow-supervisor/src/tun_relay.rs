//! Supervisor for the relay moving virtual interface traffic to SOCKS.

use burrow_config::{Config, NetworkLayout, TunDevice};
use camino::Utf8PathBuf;

use crate::{ProcessSupervisor, SupervisorError};

/// Builds the relay command line for the SOCKS endpoint at
/// `socks_host:socks_port`, used for both TCP and UDP relaying.
#[must_use]
pub fn tun_relay_arguments(
    device: &TunDevice,
    layout: &NetworkLayout,
    socks_host: &str,
    socks_port: u16,
) -> Vec<String> {
    let socks_address = format!("{socks_host}:{socks_port}");
    vec![
        String::from("--tundev"),
        device.descriptor(layout),
        String::from("--netif-ipaddr"),
        layout.router_ip.to_string(),
        String::from("--netif-netmask"),
        layout.netmask.to_string(),
        String::from("--socks-server-addr"),
        socks_address.clone(),
        String::from("--socks5-udp"),
        String::from("--udp-relay-addr"),
        socks_address,
        String::from("--transparent-dns"),
        String::from("--loglevel"),
        String::from("error"),
    ]
}

/// Virtual interface relaying all traffic to a local SOCKS endpoint.
pub struct TunRelay {
    supervisor: ProcessSupervisor,
    device: TunDevice,
    layout: NetworkLayout,
}

impl TunRelay {
    /// Creates a relay running `executable` for `device`.
    #[must_use]
    pub fn new(executable: impl Into<Utf8PathBuf>, device: TunDevice, layout: NetworkLayout) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(executable),
            device,
            layout,
        }
    }

    /// Creates a relay from the configured binary, device and layout.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tun_relay_binary.clone(),
            config.tun_device.clone(),
            config.network,
        )
    }

    /// Launches the relay towards the SOCKS endpoint.
    ///
    /// # Errors
    ///
    /// See [`ProcessSupervisor::start`].
    pub fn start(&self, socks_host: &str, socks_port: u16) -> Result<(), SupervisorError> {
        self.supervisor.start(&tun_relay_arguments(
            &self.device,
            &self.layout,
            socks_host,
            socks_port,
        ))
    }

    /// Kills the relay; see [`ProcessSupervisor::stop`].
    pub fn stop(&self) {
        self.supervisor.stop();
    }

    /// Underlying supervisor, for listeners and state queries.
    #[must_use]
    pub const fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }
}
