//! Addressing of the virtual network interface brought up by the TUN relay.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::Platform;
use crate::defaults::{
    DEVICE_IP, NETMASK, NETWORK, ROUTER_IP, TAP_COMPONENT_ID, TAP_DEVICE_NAME, TUN_DEVICE_NAME,
};

/// Fixed addressing of the virtual interface.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkLayout {
    /// Gateway address the relay presents for the interface.
    pub router_ip: Ipv4Addr,
    /// Address assigned to the device itself.
    pub device_ip: Ipv4Addr,
    /// Network address of the interface subnet.
    pub network: Ipv4Addr,
    /// Subnet mask of the interface.
    pub netmask: Ipv4Addr,
}

impl Default for NetworkLayout {
    fn default() -> Self {
        Self {
            router_ip: ROUTER_IP,
            device_ip: DEVICE_IP,
            network: NETWORK,
            netmask: NETMASK,
        }
    }
}

/// Virtual device the TUN relay attaches to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TunDevice {
    /// A named TUN device, as used on Unix hosts.
    Tun {
        /// Interface name.
        name: String,
    },
    /// A TAP adapter addressed by driver component, as used on Windows.
    Tap {
        /// Driver component identifier, e.g. `tap0901`.
        component_id: String,
        /// Adapter name.
        name: String,
    },
}

impl TunDevice {
    /// Returns the device naming scheme for a platform family.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => Self::Tap {
                component_id: TAP_COMPONENT_ID.to_owned(),
                name: TAP_DEVICE_NAME.to_owned(),
            },
            Platform::Unix => Self::Tun {
                name: TUN_DEVICE_NAME.to_owned(),
            },
        }
    }

    /// Renders the `--tundev` descriptor understood by the relay.
    ///
    /// TAP adapters carry their addressing inline:
    /// `<component>:<name>:<device ip>:<network>:<netmask>`.
    #[must_use]
    pub fn descriptor(&self, layout: &NetworkLayout) -> String {
        match self {
            Self::Tun { name } => name.clone(),
            Self::Tap { component_id, name } => format!(
                "{component_id}:{name}:{}:{}:{}",
                layout.device_ip, layout.network, layout.netmask
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn default_layout_uses_fixed_subnet() {
        let layout = NetworkLayout::default();
        assert_eq!(layout.router_ip.to_string(), "10.0.85.1");
        assert_eq!(layout.device_ip.to_string(), "10.0.85.2");
        assert_eq!(layout.network.to_string(), "10.0.85.0");
        assert_eq!(layout.netmask.to_string(), "255.255.255.0");
    }

    #[rstest]
    #[case(Platform::Unix, "burrow-tun0")]
    #[case(
        Platform::Windows,
        "tap0901:burrow-tap0:10.0.85.2:10.0.85.0:255.255.255.0"
    )]
    fn descriptor_follows_platform(#[case] platform: Platform, #[case] expected: &str) {
        let device = TunDevice::for_platform(platform);
        assert_eq!(device.descriptor(&NetworkLayout::default()), expected);
    }
}
