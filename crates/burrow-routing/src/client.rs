//! Client for the privileged routing service.
//!
//! A [`RoutingClient`] holds at most one live connection. Each connection is
//! served by a reader thread that decodes back-to-back JSON messages and
//! settles the pending configure or reset handle by action. Listener calls
//! and handle settlements are collected while the state lock is held and
//! delivered after it is released.

use std::io::{BufReader, Write};
use std::net::Ipv4Addr;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use burrow_config::Config;
use serde_json::Deserializer;
use tracing::{debug, info, warn};

use crate::errors::RoutingError;
use crate::pending::{OperationResult, PendingOperation};
use crate::protocol::{RoutingAction, RoutingRequest, ServiceMessage, ServiceStatus, StatusCode};
use crate::transport::{Connector, EndpointConnector, ServiceStream};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

type DisconnectListener = Arc<dyn Fn() + Send + Sync>;
type StatusListener = Arc<dyn Fn(ServiceStatus) + Send + Sync>;

/// Observable connection state of a [`RoutingClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No connection is open.
    Disconnected,
    /// A connection attempt is under way.
    Connecting,
    /// A connection is open.
    Connected {
        /// A configure request awaits its response.
        configure_pending: bool,
        /// A reset request awaits its response.
        reset_pending: bool,
    },
}

/// Client of the privileged routing service.
pub struct RoutingClient {
    shared: Arc<Shared>,
}

struct Shared {
    connector: Box<dyn Connector>,
    router_ip: Ipv4Addr,
    state: Mutex<ClientState>,
    phase_changed: Condvar,
}

#[derive(Default)]
struct ClientState {
    link: Link,
    next_generation: u64,
    disconnect_listener: Option<DisconnectListener>,
    status_listener: Option<StatusListener>,
}

#[derive(Default)]
enum Link {
    #[default]
    Idle,
    Connecting,
    Live(LiveConnection),
}

struct LiveConnection {
    generation: u64,
    stream: Arc<ServiceStream>,
    configure: Option<Sender<OperationResult>>,
    reset: Option<Sender<OperationResult>>,
}

impl LiveConnection {
    const fn slot(&mut self, action: RoutingAction) -> Option<&mut Option<Sender<OperationResult>>> {
        match action {
            RoutingAction::ConfigureRouting => Some(&mut self.configure),
            RoutingAction::ResetRouting => Some(&mut self.reset),
            RoutingAction::StatusChanged => None,
        }
    }
}

/// Why a connection is being torn down; decides how pending handles fail.
enum CloseCause {
    Transport,
    Protocol(String),
}

impl CloseCause {
    fn error_for(&self, action: RoutingAction) -> RoutingError {
        match self {
            Self::Transport => RoutingError::ConnectionLost { action },
            Self::Protocol(detail) => RoutingError::ProtocolViolation {
                detail: detail.clone(),
            },
        }
    }
}

/// Work deferred until the state lock has been released.
#[derive(Default)]
#[must_use]
struct Effects {
    status: Option<(StatusListener, ServiceStatus)>,
    disconnected: Option<DisconnectListener>,
    settlements: Vec<(RoutingAction, Sender<OperationResult>, OperationResult)>,
}

impl Effects {
    fn settle(&mut self, action: RoutingAction, sender: Sender<OperationResult>, result: OperationResult) {
        self.settlements.push((action, sender, result));
    }

    fn run(self) {
        if let Some((listener, status)) = self.status {
            listener(status);
        }
        if let Some(listener) = self.disconnected {
            listener();
        }
        for (action, sender, result) in self.settlements {
            if sender.send(result).is_err() {
                debug!(
                    target: CLIENT_TARGET,
                    %action,
                    "operation handle dropped before it settled"
                );
            }
        }
    }
}

impl RoutingClient {
    /// Creates a client for the endpoint and router address in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::with_connector(
            EndpointConnector::new(config.routing_service.clone()),
            config.network.router_ip,
        )
    }

    /// Creates a client that opens connections through `connector`.
    #[must_use]
    pub fn with_connector(connector: impl Connector + 'static, router_ip: Ipv4Addr) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector: Box::new(connector),
                router_ip,
                state: Mutex::new(ClientState::default()),
                phase_changed: Condvar::new(),
            }),
        }
    }

    /// Asks the service to route system traffic around the proxy at
    /// `proxy_ip`.
    ///
    /// Always opens a fresh connection. A successful response leaves the
    /// connection open so later events and the reset can use it.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::AlreadyConnected`] without any I/O when a
    /// connection is open or opening, [`RoutingError::ServiceUnavailable`]
    /// when the service cannot be reached, and send or encode errors when
    /// the request cannot be written.
    pub fn configure(&self, proxy_ip: &str) -> Result<PendingOperation, RoutingError> {
        let request = RoutingRequest::configure(proxy_ip, self.shared.router_ip);
        let payload = serde_json::to_vec(&request)?;
        {
            let mut state = self.shared.lock();
            if !matches!(state.link, Link::Idle) {
                return Err(RoutingError::AlreadyConnected);
            }
            state.link = Link::Connecting;
        }
        let generation = self.shared.open()?;
        info!(target: CLIENT_TARGET, proxy_ip, "requesting routing configuration");
        self.shared.dispatch(generation, request.action(), &payload)
    }

    /// Asks the service to remove its routes.
    ///
    /// Reuses the open connection or opens one. The connection is closed as
    /// soon as the reset response arrives, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::OperationInFlight`] while another reset is
    /// pending, [`RoutingError::ServiceUnavailable`] when the service cannot
    /// be reached, and send or encode errors when the request cannot be
    /// written.
    pub fn reset(&self) -> Result<PendingOperation, RoutingError> {
        let request = RoutingRequest::reset();
        let payload = serde_json::to_vec(&request)?;
        let generation = self.shared.acquire()?;
        info!(target: CLIENT_TARGET, "requesting routing reset");
        self.shared.dispatch(generation, request.action(), &payload)
    }

    /// Closes the open connection, if any.
    ///
    /// Pending handles fail with [`RoutingError::ConnectionLost`] and the
    /// disconnect listener fires.
    pub fn disconnect(&self) {
        let mut state = self.shared.lock();
        let effects = self.shared.close(&mut state, &CloseCause::Transport);
        drop(state);
        effects.run();
    }

    /// Current connection phase.
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        match &self.shared.lock().link {
            Link::Idle => ConnectionPhase::Disconnected,
            Link::Connecting => ConnectionPhase::Connecting,
            Link::Live(connection) => ConnectionPhase::Connected {
                configure_pending: connection.configure.is_some(),
                reset_pending: connection.reset.is_some(),
            },
        }
    }

    /// Returns `true` while a connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.phase(), ConnectionPhase::Connected { .. })
    }

    /// Installs the listener invoked each time a connection closes,
    /// replacing any previous one.
    pub fn set_disconnect_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.shared.lock().disconnect_listener = Some(Arc::new(listener));
    }

    /// Removes the disconnect listener.
    pub fn clear_disconnect_listener(&self) {
        self.shared.lock().disconnect_listener = None;
    }

    /// Installs the listener receiving `statusChanged` events, replacing any
    /// previous one.
    pub fn set_status_listener(&self, listener: impl Fn(ServiceStatus) + Send + Sync + 'static) {
        self.shared.lock().status_listener = Some(Arc::new(listener));
    }

    /// Removes the status listener.
    pub fn clear_status_listener(&self) {
        self.shared.lock().status_listener = None;
    }
}

impl Drop for RoutingClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Returns the generation of the open connection, opening one when
    /// needed. Waits out a connection attempt made by another caller.
    fn acquire(self: &Arc<Self>) -> Result<u64, RoutingError> {
        {
            let mut state = self.lock();
            loop {
                let connecting = match &state.link {
                    Link::Live(connection) => return Ok(connection.generation),
                    Link::Connecting => true,
                    Link::Idle => false,
                };
                if !connecting {
                    break;
                }
                state = self
                    .phase_changed
                    .wait(state)
                    .unwrap_or_else(|poison| poison.into_inner());
            }
            state.link = Link::Connecting;
        }
        self.open()
    }

    /// Connects with the link already marked as connecting, then starts the
    /// reader and publishes the connection.
    fn open(self: &Arc<Self>) -> Result<u64, RoutingError> {
        let endpoint = self.connector.describe();
        debug!(target: CLIENT_TARGET, endpoint = %endpoint, "connecting to routing service");
        let connected = self.connector.connect();

        let mut state = self.lock();
        let result = connected
            .map_err(|source| RoutingError::ServiceUnavailable {
                endpoint: endpoint.clone(),
                source,
            })
            .and_then(|stream| self.start_reader(&mut state, stream));
        if result.is_err() {
            state.link = Link::Idle;
        }
        self.phase_changed.notify_all();
        drop(state);

        match &result {
            Ok(generation) => {
                info!(target: CLIENT_TARGET, endpoint = %endpoint, generation, "connected to routing service");
            }
            Err(error) => {
                warn!(target: CLIENT_TARGET, endpoint = %endpoint, %error, "routing service connection failed");
            }
        }
        result
    }

    fn start_reader(
        self: &Arc<Self>,
        state: &mut ClientState,
        stream: ServiceStream,
    ) -> Result<u64, RoutingError> {
        let reader = stream
            .try_clone()
            .map_err(|source| RoutingError::Reader { source })?;
        let generation = state.next_generation;
        state.next_generation = state.next_generation.wrapping_add(1);

        let shared = Arc::clone(self);
        thread::Builder::new()
            .name(format!("routing-reader-{generation}"))
            .spawn(move || shared.read_loop(generation, reader))
            .map_err(|source| RoutingError::Reader { source })?;

        state.link = Link::Live(LiveConnection {
            generation,
            stream: Arc::new(stream),
            configure: None,
            reset: None,
        });
        Ok(generation)
    }

    /// Arms the handle for `action` on connection `generation`, then writes
    /// the request outside the state lock.
    fn dispatch(
        &self,
        generation: u64,
        action: RoutingAction,
        payload: &[u8],
    ) -> Result<PendingOperation, RoutingError> {
        let (stream, receiver) = {
            let mut state = self.lock();
            let Link::Live(connection) = &mut state.link else {
                return Err(RoutingError::ConnectionLost { action });
            };
            if connection.generation != generation {
                return Err(RoutingError::ConnectionLost { action });
            }
            let Some(slot) = connection.slot(action) else {
                return Err(RoutingError::ProtocolViolation {
                    detail: format!("{action} cannot be requested"),
                });
            };
            if slot.is_some() {
                return Err(RoutingError::OperationInFlight { action });
            }
            let (sender, receiver) = mpsc::channel();
            *slot = Some(sender);
            (Arc::clone(&connection.stream), receiver)
        };

        let mut writer = &*stream;
        let written = writer.write_all(payload).and_then(|()| writer.flush());
        drop(stream);

        if let Err(source) = written {
            warn!(target: CLIENT_TARGET, %action, error = %source, "failed to send request");
            self.abandon(generation, action);
            return Err(RoutingError::Send { action, source });
        }
        debug!(target: CLIENT_TARGET, %action, generation, "request sent");
        Ok(PendingOperation::new(action, receiver))
    }

    /// Drops the handle armed for a request that could not be sent and
    /// closes its connection if it is still the current one.
    fn abandon(&self, generation: u64, action: RoutingAction) {
        let mut state = self.lock();
        let Link::Live(connection) = &mut state.link else {
            return;
        };
        if connection.generation != generation {
            return;
        }
        if let Some(slot) = connection.slot(action) {
            slot.take();
        }
        let effects = self.close(&mut state, &CloseCause::Transport);
        drop(state);
        effects.run();
    }

    /// Tears down the open connection and fails its pending handles.
    fn close(&self, state: &mut ClientState, cause: &CloseCause) -> Effects {
        let mut effects = Effects::default();
        if !matches!(state.link, Link::Live(_)) {
            return effects;
        }
        let Link::Live(mut connection) = std::mem::take(&mut state.link) else {
            return effects;
        };
        self.phase_changed.notify_all();
        if let Err(error) = connection.stream.close() {
            debug!(target: CLIENT_TARGET, %error, "error while closing routing connection");
        }
        info!(
            target: CLIENT_TARGET,
            generation = connection.generation,
            "routing service connection closed"
        );
        for action in [RoutingAction::ConfigureRouting, RoutingAction::ResetRouting] {
            if let Some(sender) = connection.slot(action).and_then(Option::take) {
                effects.settle(action, sender, Err(cause.error_for(action)));
            }
        }
        effects.disconnected.clone_from(&state.disconnect_listener);
        effects
    }

    fn read_loop(&self, generation: u64, stream: ServiceStream) {
        let messages =
            Deserializer::from_reader(BufReader::new(stream)).into_iter::<ServiceMessage>();
        for message in messages {
            let keep_reading = match message {
                Ok(message) => self.handle_message(generation, message),
                Err(error) if error.is_io() || error.is_eof() => {
                    debug!(target: CLIENT_TARGET, generation, %error, "routing connection ended");
                    break;
                }
                Err(error) => {
                    warn!(target: CLIENT_TARGET, generation, %error, "malformed message from routing service");
                    self.close_generation(generation, &CloseCause::Protocol(error.to_string()));
                    false
                }
            };
            if !keep_reading {
                return;
            }
        }
        self.close_generation(generation, &CloseCause::Transport);
    }

    fn close_generation(&self, generation: u64, cause: &CloseCause) {
        let mut state = self.lock();
        if !is_current(&state, generation) {
            return;
        }
        let effects = self.close(&mut state, cause);
        drop(state);
        effects.run();
    }

    /// Applies one message; returns whether the reader should continue.
    fn handle_message(&self, generation: u64, message: ServiceMessage) -> bool {
        let mut state = self.lock();
        if !is_current(&state, generation) {
            return false;
        }
        let effects = self.apply(&mut state, message);
        let keep_reading = is_current(&state, generation);
        drop(state);
        effects.run();
        keep_reading
    }

    fn apply(&self, state: &mut ClientState, message: ServiceMessage) -> Effects {
        let action = message.action;
        if action == RoutingAction::StatusChanged {
            let status = message.service_status();
            debug!(target: CLIENT_TARGET, ?status, "routing status changed");
            return Effects {
                status: state
                    .status_listener
                    .clone()
                    .map(|listener| (listener, status)),
                ..Effects::default()
            };
        }

        let Link::Live(connection) = &mut state.link else {
            return Effects::default();
        };
        let Some(sender) = connection.slot(action).and_then(Option::take) else {
            let detail = format!("unexpected {action} response");
            warn!(target: CLIENT_TARGET, %action, "response without a pending request");
            return self.close(state, &CloseCause::Protocol(detail));
        };
        let Some(status) = message.status_code else {
            let detail = format!("{action} response without a status code");
            let mut effects = self.close(state, &CloseCause::Protocol(detail.clone()));
            effects.settle(action, sender, Err(RoutingError::ProtocolViolation { detail }));
            return effects;
        };

        let result = response_outcome(action, status, message.error_message);
        match &result {
            Ok(()) => info!(target: CLIENT_TARGET, %action, "routing service acknowledged request"),
            Err(error) => warn!(target: CLIENT_TARGET, %action, %error, "routing service rejected request"),
        }

        let closes = action == RoutingAction::ResetRouting || result.is_err();
        let mut effects = if closes {
            self.close(state, &CloseCause::Transport)
        } else {
            Effects::default()
        };
        effects.settle(action, sender, result);
        effects
    }
}

fn is_current(state: &ClientState, generation: u64) -> bool {
    matches!(&state.link, Link::Live(connection) if connection.generation == generation)
}

fn response_outcome(
    action: RoutingAction,
    status: StatusCode,
    message: Option<String>,
) -> OperationResult {
    match (action, status) {
        (_, StatusCode::Success) => Ok(()),
        (RoutingAction::ConfigureRouting, StatusCode::UnsupportedRoutingTable) => {
            Err(RoutingError::UnsupportedRoutingTable { message })
        }
        (RoutingAction::ConfigureRouting, _) => Err(RoutingError::ConfigureFailed { message }),
        (_, _) => Err(RoutingError::ResetFailed { message }),
    }
}
