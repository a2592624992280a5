use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Host platform family, resolved once at startup.
///
/// The family decides which IPC transport reaches the routing service and how
/// the virtual network device is named.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Platform {
    /// Windows hosts: named pipe IPC and a TAP adapter.
    Windows,
    /// Linux and other Unix hosts: domain socket IPC and a TUN device.
    Unix,
}

impl Platform {
    /// Detects the platform family of the running binary.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

/// Errors encountered while parsing a [`Platform`] from text.
pub type PlatformParseError = strum::ParseError;
