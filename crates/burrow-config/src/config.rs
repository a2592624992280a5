//! Resolved configuration and its TOML loader.
//!
//! Every field is optional in the file. Omitted fields fall back to the
//! defaults of the configured (or detected) platform, so a file that only
//! sets `platform = "windows"` still yields a named pipe endpoint and a TAP
//! device.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_SOCKS_PORT, default_log_format, default_socks_bridge_binary,
    default_tun_relay_binary,
};
use crate::telemetry::LogFormat;
use crate::{NetworkLayout, Platform, ServiceEndpoint, TunDevice};

/// Configuration shared by the routing client and the process supervisors.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Config {
    /// Platform family the other fields were resolved for.
    pub platform: Platform,
    /// Address of the privileged routing service.
    pub routing_service: ServiceEndpoint,
    /// Executable exposing the local SOCKS endpoint.
    pub socks_bridge_binary: Utf8PathBuf,
    /// Executable bringing up the virtual interface.
    pub tun_relay_binary: Utf8PathBuf,
    /// Local port the SOCKS bridge binds.
    pub socks_port: u16,
    /// Addressing of the virtual interface.
    pub network: NetworkLayout,
    /// Virtual device naming.
    pub tun_device: TunDevice,
    /// `tracing` filter directive.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Config {
    /// Builds the default configuration for a platform family.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            routing_service: ServiceEndpoint::for_platform(platform),
            socks_bridge_binary: default_socks_bridge_binary(platform),
            tun_relay_binary: default_tun_relay_binary(platform),
            socks_port: DEFAULT_SOCKS_PORT,
            network: NetworkLayout::default(),
            tun_device: TunDevice::for_platform(platform),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
        }
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not valid
    /// configuration.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Self::parse(input, None)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`], carrying `path`, when its contents are invalid.
    pub fn load_from_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, Some(path))
    }

    fn parse(input: &str, origin: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        toml::from_str::<ConfigFile>(input)
            .map(ConfigFile::resolve)
            .map_err(|source| ConfigError::Parse {
                path: origin.map(Utf8Path::to_path_buf),
                source: Box::new(source),
            })
    }

    /// Filter directive used by telemetry.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Format used by telemetry.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_platform(Platform::current())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    platform: Option<Platform>,
    routing_service: Option<ServiceEndpoint>,
    socks_bridge_binary: Option<Utf8PathBuf>,
    tun_relay_binary: Option<Utf8PathBuf>,
    socks_port: Option<u16>,
    network: Option<NetworkLayout>,
    tun_device: Option<TunDevice>,
    log_filter: Option<String>,
    log_format: Option<LogFormat>,
}

impl ConfigFile {
    fn resolve(self) -> Config {
        let defaults = Config::for_platform(self.platform.unwrap_or_default());
        Config {
            platform: defaults.platform,
            routing_service: self.routing_service.unwrap_or(defaults.routing_service),
            socks_bridge_binary: self
                .socks_bridge_binary
                .unwrap_or(defaults.socks_bridge_binary),
            tun_relay_binary: self.tun_relay_binary.unwrap_or(defaults.tun_relay_binary),
            socks_port: self.socks_port.unwrap_or(defaults.socks_port),
            network: self.network.unwrap_or(defaults.network),
            tun_device: self.tun_device.unwrap_or(defaults.tun_device),
            log_filter: self.log_filter.unwrap_or(defaults.log_filter),
            log_format: self.log_format.unwrap_or(defaults.log_format),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        /// File that failed to read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The configuration text was not valid.
    #[error("invalid configuration: {source}")]
    Parse {
        /// File the text came from, when loaded from disk.
        path: Option<Utf8PathBuf>,
        /// Underlying TOML error.
        #[source]
        source: Box<toml::de::Error>,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn empty_file_yields_platform_defaults() {
        let config = Config::from_toml_str("").expect("empty config parses");
        assert_eq!(config, Config::default());
    }

    #[rstest]
    fn platform_drives_unset_fields() {
        let config = Config::from_toml_str("platform = \"windows\"\n").expect("config parses");
        assert_eq!(
            config.routing_service,
            ServiceEndpoint::named_pipe("BurrowRoutingService")
        );
        assert_eq!(config.tun_device, TunDevice::for_platform(Platform::Windows));
        assert_eq!(
            config.tun_relay_binary,
            Utf8PathBuf::from("badvpn-tun2socks.exe")
        );
    }

    #[rstest]
    fn explicit_fields_override_defaults() {
        let toml = r#"
platform = "unix"
socks_port = 2080
log_format = "compact"
routing_service = { transport = "unix", path = "/tmp/routing.sock" }
"#;
        let config = Config::from_toml_str(toml).expect("config parses");
        assert_eq!(config.socks_port, 2080);
        assert_eq!(config.log_format, LogFormat::Compact);
        assert_eq!(
            config.routing_service,
            ServiceEndpoint::unix("/tmp/routing.sock")
        );
    }

    #[rstest]
    fn file_parse_errors_name_the_file() {
        let dir = tempfile::TempDir::new().expect("create temporary directory");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("burrow.toml"))
            .unwrap_or_else(|path| panic!("non UTF-8 temp path: {}", path.display()));
        fs::write(&path, "socks_port = \"high\"\n").expect("write config file");

        let error = Config::load_from_path(&path).expect_err("invalid port");

        assert!(matches!(
            error,
            ConfigError::Parse { path: Some(ref origin), .. } if *origin == path
        ));
    }

    #[rstest]
    fn unknown_keys_are_rejected() {
        let error = Config::from_toml_str("proxy_timeout = 1\n").expect_err("unknown key");
        assert!(matches!(error, ConfigError::Parse { path: None, .. }));
    }
}
