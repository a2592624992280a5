//! Supervisor for the local SOCKS bridge to the remote proxy.

use std::fmt;

use burrow_config::Config;
use camino::Utf8PathBuf;

use crate::{ProcessSupervisor, SupervisorError};

/// Connection timeout, in seconds, passed to the bridge.
pub const SOCKS_BRIDGE_TIMEOUT_SECS: u16 = 5;

/// Remote proxy the bridge forwards to.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyServer {
    /// Host name or address of the proxy.
    pub host: String,
    /// Port of the proxy.
    pub port: u16,
    /// Shared secret for the proxy.
    pub password: String,
    /// Cipher method, e.g. `aes-128-cfb`.
    pub method: String,
}

impl fmt::Debug for ProxyServer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProxyServer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("method", &self.method)
            .finish()
    }
}

/// Builds the bridge command line: bind `local_port`, forward to `server`
/// with UDP relay enabled.
#[must_use]
pub fn socks_bridge_arguments(server: &ProxyServer, local_port: u16) -> Vec<String> {
    vec![
        String::from("-l"),
        local_port.to_string(),
        String::from("-s"),
        server.host.clone(),
        String::from("-p"),
        server.port.to_string(),
        String::from("-k"),
        server.password.clone(),
        String::from("-m"),
        server.method.clone(),
        String::from("-t"),
        SOCKS_BRIDGE_TIMEOUT_SECS.to_string(),
        String::from("-u"),
    ]
}

/// Local SOCKS endpoint forwarding to a remote proxy.
pub struct SocksBridge {
    supervisor: ProcessSupervisor,
    local_port: u16,
}

impl SocksBridge {
    /// Creates a bridge running `executable` and binding `local_port`.
    #[must_use]
    pub fn new(executable: impl Into<Utf8PathBuf>, local_port: u16) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(executable),
            local_port,
        }
    }

    /// Creates a bridge from the configured binary and SOCKS port.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.socks_bridge_binary.clone(), config.socks_port)
    }

    /// Local port the bridge binds.
    #[must_use]
    pub const fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Launches the bridge towards `server`.
    ///
    /// # Errors
    ///
    /// See [`ProcessSupervisor::start`].
    pub fn start(&self, server: &ProxyServer) -> Result<(), SupervisorError> {
        self.supervisor
            .start(&socks_bridge_arguments(server, self.local_port))
    }

    /// Kills the bridge; see [`ProcessSupervisor::stop`].
    pub fn stop(&self) {
        self.supervisor.stop();
    }

    /// Underlying supervisor, for listeners and state queries.
    #[must_use]
    pub const fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }
}

#[cfg(test)]
mod tests {
    use burrow_config::Platform;
    use rstest::rstest;

    use super::*;

    fn proxy() -> ProxyServer {
        ProxyServer {
            host: String::from("203.0.113.5"),
            port: 65336,
            password: String::from("pw"),
            method: String::from("aes-128-cfb"),
        }
    }

    #[rstest]
    fn builds_bridge_arguments() {
        assert_eq!(
            socks_bridge_arguments(&proxy(), 1081),
            [
                "-l",
                "1081",
                "-s",
                "203.0.113.5",
                "-p",
                "65336",
                "-k",
                "pw",
                "-m",
                "aes-128-cfb",
                "-t",
                "5",
                "-u"
            ]
        );
    }

    #[rstest]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", proxy());
        assert!(!rendered.contains("\"pw\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[rstest]
    fn from_config_uses_configured_port() {
        let config = Config {
            socks_port: 2080,
            ..Config::for_platform(Platform::Unix)
        };
        let bridge = SocksBridge::from_config(&config);
        assert_eq!(bridge.local_port(), 2080);
        assert_eq!(bridge.supervisor().executable().as_str(), "ss-local");
    }
}
