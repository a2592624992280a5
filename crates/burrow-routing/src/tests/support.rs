//! Scripted routing service ends for client tests.
//!
//! A [`MockConnector`] hands the client one half of a Unix socket pair per
//! expected connection and passes the other half to the test as a
//! [`ServicePeer`], so each test plays the service side explicitly.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, Shutdown};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use serde_json::de::IoRead;
use serde_json::{StreamDeserializer, Value};

use crate::transport::{MockConnector, ServiceStream};
use crate::RoutingClient;

pub(super) const ROUTER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 85, 1);
pub(super) const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Service side of one client connection.
pub(super) struct ServicePeer {
    writer: UnixStream,
    requests: StreamDeserializer<'static, IoRead<UnixStream>, Value>,
}

impl ServicePeer {
    fn new(stream: UnixStream) -> Self {
        stream
            .set_read_timeout(Some(SETTLE_TIMEOUT))
            .expect("set peer read timeout");
        let reader = stream.try_clone().expect("clone peer stream");
        Self {
            writer: stream,
            requests: serde_json::Deserializer::from_reader(reader).into_iter(),
        }
    }

    /// Reads the next request written by the client.
    pub(super) fn next_request(&mut self) -> Value {
        self.requests
            .next()
            .expect("client should send a request")
            .expect("request should be valid JSON")
    }

    /// Writes a JSON message without any delimiter.
    pub(super) fn send(&mut self, message: &Value) {
        let bytes = serde_json::to_vec(message).expect("encode message");
        self.send_raw(&bytes);
    }

    /// Writes raw bytes to the client.
    pub(super) fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write to client");
    }

    /// Closes the service end of the connection.
    pub(super) fn hang_up(self) {
        self.writer
            .shutdown(Shutdown::Both)
            .expect("shut down peer stream");
    }

    /// Drops the service end with whatever the client sent still unread,
    /// which resets the client's side of the socket.
    pub(super) fn abort(self) {
        drop(self);
    }

    /// Asserts that the client has closed its end.
    pub(super) fn assert_closed_by_client(mut self) {
        let mut buffer = [0_u8; 16];
        let read = self.writer.read(&mut buffer).expect("read after close");
        assert_eq!(read, 0, "client should have closed the connection");
    }
}

/// Connector double that serves `connections` socket pairs.
pub(super) fn pair_connector(connections: usize) -> (MockConnector, Receiver<ServicePeer>) {
    let (peers_tx, peers_rx) = mpsc::channel();
    let mut connector = MockConnector::new();
    connector
        .expect_describe()
        .return_const(String::from("unix:///test/routing.sock"));
    connector
        .expect_connect()
        .times(connections)
        .returning(move || {
            let (client, service) = UnixStream::pair()?;
            peers_tx
                .send(ServicePeer::new(service))
                .expect("test should hold the peer receiver");
            Ok(ServiceStream::Unix(client))
        });
    (connector, peers_rx)
}

/// Client connected through [`pair_connector`].
pub(super) fn paired_client(connections: usize) -> (RoutingClient, Receiver<ServicePeer>) {
    let (connector, peers) = pair_connector(connections);
    (RoutingClient::with_connector(connector, ROUTER_IP), peers)
}

/// Receives the peer for the next connection the client opens.
pub(super) fn accept(peers: &Receiver<ServicePeer>) -> ServicePeer {
    peers
        .recv_timeout(SETTLE_TIMEOUT)
        .expect("client should have connected")
}

/// Installs a disconnect listener and returns its invocation counter.
pub(super) fn count_disconnects(client: &RoutingClient) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let listener_count = Arc::clone(&count);
    client.set_disconnect_listener(move || {
        listener_count.fetch_add(1, Ordering::SeqCst);
    });
    count
}
