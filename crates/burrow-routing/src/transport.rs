//! Transport streams to the routing service.
//!
//! Windows reaches the service over a named pipe and every other platform
//! over a Unix domain socket. Both are wrapped in [`ServiceStream`] so the
//! client only sees a duplex byte stream.

use std::io::{self, Read, Write};
use std::time::Duration;

use burrow_config::{ServiceEndpoint, pipe_path};

#[cfg(windows)]
use std::sync::Arc;
#[cfg(unix)]
use std::net::Shutdown;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

#[cfg(windows)]
use crate::pipe::NamedPipe;

/// Bound on opening a connection: the Unix socket connect, or the wait for
/// a busy pipe instance.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Duplex stream connected to the routing service.
#[derive(Debug)]
pub enum ServiceStream {
    /// Unix domain socket connection.
    #[cfg(unix)]
    Unix(UnixStream),
    /// Named pipe client opened for overlapped I/O.
    #[cfg(windows)]
    Pipe(Arc<NamedPipe>),
}

impl ServiceStream {
    /// Returns an independent handle to the same connection.
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
            #[cfg(windows)]
            Self::Pipe(pipe) => Ok(Self::Pipe(Arc::clone(pipe))),
        }
    }

    /// Closes both directions so a blocked reader observes end of stream.
    ///
    /// A pipe has its pending operations cancelled; the instance is released
    /// once the reader drops its clone.
    pub fn close(&self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Self::Unix(stream) => match stream.shutdown(Shutdown::Both) {
                Err(error) if error.kind() == io::ErrorKind::NotConnected => Ok(()),
                other => other,
            },
            #[cfg(windows)]
            Self::Pipe(pipe) => {
                pipe.close();
                Ok(())
            }
        }
    }
}

impl Read for ServiceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
            #[cfg(windows)]
            Self::Pipe(pipe) => pipe.read(buf),
        }
    }
}

impl Write for &ServiceStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            #[cfg(unix)]
            ServiceStream::Unix(stream) => {
                let mut writer: &UnixStream = stream;
                writer.write(buf)
            }
            #[cfg(windows)]
            ServiceStream::Pipe(pipe) => pipe.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            #[cfg(unix)]
            ServiceStream::Unix(stream) => {
                let mut writer: &UnixStream = stream;
                writer.flush()
            }
            #[cfg(windows)]
            ServiceStream::Pipe(_) => Ok(()),
        }
    }
}

/// Opens connections to the routing service.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    /// Opens a new stream to the service.
    fn connect(&self) -> io::Result<ServiceStream>;

    /// Human-readable address used in logs and errors.
    fn describe(&self) -> String;
}

/// [`Connector`] for a configured [`ServiceEndpoint`].
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    endpoint: ServiceEndpoint,
    timeout: Duration,
}

impl EndpointConnector {
    /// Creates a connector using [`CONNECT_TIMEOUT`].
    #[must_use]
    pub const fn new(endpoint: ServiceEndpoint) -> Self {
        Self {
            endpoint,
            timeout: CONNECT_TIMEOUT,
        }
    }

    /// Overrides the connect timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint this connector targets.
    #[must_use]
    pub const fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }
}

impl Connector for EndpointConnector {
    fn connect(&self) -> io::Result<ServiceStream> {
        match &self.endpoint {
            ServiceEndpoint::Unix { path } => connect_unix(path.as_str(), self.timeout),
            ServiceEndpoint::NamedPipe { name } => {
                connect_pipe(&pipe_path(name), self.timeout)
            }
        }
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

#[cfg(unix)]
fn connect_unix(path: &str, timeout: Duration) -> io::Result<ServiceStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    let stream: UnixStream = socket.into();
    Ok(ServiceStream::Unix(stream))
}

#[cfg(not(unix))]
fn connect_unix(path: &str, _timeout: Duration) -> io::Result<ServiceStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("Unix sockets are not available on this platform: {path}"),
    ))
}

#[cfg(windows)]
fn connect_pipe(path: &str, timeout: Duration) -> io::Result<ServiceStream> {
    NamedPipe::connect(path, timeout).map(|pipe| ServiceStream::Pipe(Arc::new(pipe)))
}

#[cfg(not(windows))]
fn connect_pipe(path: &str, _timeout: Duration) -> io::Result<ServiceStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("named pipes are not available on this platform: {path}"),
    ))
}
