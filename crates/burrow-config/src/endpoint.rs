use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::Platform;
use crate::defaults::{DEFAULT_PIPE_NAME, DEFAULT_SOCKET_PATH};

const PIPE_PREFIX: &str = r"\\.\pipe\";

/// Declarative address of the privileged routing service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ServiceEndpoint {
    /// Windows named pipe endpoint.
    NamedPipe {
        /// Pipe name without the `\\.\pipe\` prefix.
        name: String,
    },
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
}

impl ServiceEndpoint {
    /// Builds a named pipe endpoint.
    #[must_use]
    pub fn named_pipe(name: impl Into<String>) -> Self {
        Self::NamedPipe { name: name.into() }
    }

    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Returns the fixed service endpoint for a platform family.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => Self::named_pipe(DEFAULT_PIPE_NAME),
            Platform::Unix => Self::unix(DEFAULT_SOCKET_PATH),
        }
    }

    /// Returns the full `\\.\pipe\<name>` path for named pipe endpoints.
    #[must_use]
    pub fn pipe_path(&self) -> Option<String> {
        match self {
            Self::NamedPipe { name } => Some(pipe_path(name)),
            Self::Unix { .. } => None,
        }
    }

    /// Returns the socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::NamedPipe { .. } => None,
        }
    }
}

/// Full `\\.\pipe\<name>` path of the named pipe called `name`.
#[must_use]
pub fn pipe_path(name: &str) -> String {
    format!("{PIPE_PREFIX}{name}")
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedPipe { name } => write!(formatter, "pipe://{name}"),
            Self::Unix { path } => write!(formatter, "unix://{path}"),
        }
    }
}

impl FromStr for ServiceEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() {
                    return Err(EndpointParseError::MissingUnixPath(input.to_owned()));
                }
                Ok(Self::unix(path))
            }
            "pipe" => {
                let name = url
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .map_or_else(|| url.path().trim_start_matches('/'), |host| host);
                if name.is_empty() {
                    return Err(EndpointParseError::MissingPipeName(input.to_owned()));
                }
                Ok(Self::named_pipe(name))
            }
            other => Err(EndpointParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Errors encountered while parsing a [`ServiceEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme was not recognised.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    /// Named pipe name was absent.
    #[error("missing pipe name in '{0}'")]
    MissingPipeName(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn display_unix_socket() {
        let endpoint = ServiceEndpoint::unix("/var/run/burrow_routing.sock");
        assert_eq!(endpoint.to_string(), "unix:///var/run/burrow_routing.sock");
    }

    #[rstest]
    fn parse_named_pipe() {
        let endpoint: ServiceEndpoint = "pipe://burrow-routing".parse().expect("pipe parses");
        assert_eq!(endpoint, ServiceEndpoint::named_pipe("burrow-routing"));
        assert_eq!(
            endpoint.pipe_path().as_deref(),
            Some(r"\\.\pipe\burrow-routing")
        );
    }

    #[rstest]
    fn parse_unix_socket() {
        let endpoint: ServiceEndpoint = "unix:///tmp/routing.sock".parse().expect("unix parses");
        assert_eq!(
            endpoint.unix_path().map(Utf8Path::as_str),
            Some("/tmp/routing.sock")
        );
    }

    #[rstest]
    fn rejects_unknown_scheme() {
        let error = "tcp://127.0.0.1:9000"
            .parse::<ServiceEndpoint>()
            .expect_err("tcp is not a routing transport");
        assert!(matches!(error, EndpointParseError::UnsupportedScheme(_)));
    }

    #[rstest]
    #[case(Platform::Windows, true)]
    #[case(Platform::Unix, false)]
    fn platform_selects_transport(#[case] platform: Platform, #[case] expects_pipe: bool) {
        let endpoint = ServiceEndpoint::for_platform(platform);
        assert_eq!(endpoint.pipe_path().is_some(), expects_pipe);
        assert_eq!(endpoint.unix_path().is_some(), !expects_pipe);
    }
}
