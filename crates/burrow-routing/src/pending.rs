//! Completion handles returned by routing operations.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use crate::errors::RoutingError;
use crate::protocol::RoutingAction;

pub(crate) type OperationResult = Result<(), RoutingError>;

/// Handle to a request awaiting its response from the routing service.
///
/// The outcome is delivered once. After it has been observed through
/// [`try_result`](Self::try_result) or [`wait_timeout`](Self::wait_timeout),
/// further queries report [`RoutingError::ConnectionLost`].
#[derive(Debug)]
#[must_use = "dropping the handle discards the operation outcome"]
pub struct PendingOperation {
    action: RoutingAction,
    receiver: Receiver<OperationResult>,
}

impl PendingOperation {
    pub(crate) const fn new(action: RoutingAction, receiver: Receiver<OperationResult>) -> Self {
        Self { action, receiver }
    }

    /// Action this handle is waiting on.
    #[must_use]
    pub const fn action(&self) -> RoutingAction {
        self.action
    }

    /// Blocks until the operation settles.
    pub fn wait(self) -> OperationResult {
        self.receiver.recv().unwrap_or_else(|_| Err(self.lost()))
    }

    /// Blocks for at most `timeout`.
    ///
    /// Expiry fails with [`RoutingError::Timeout`]; the request stays in
    /// flight and the handle may be queried again.
    pub fn wait_timeout(&self, timeout: Duration) -> OperationResult {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(RoutingError::Timeout {
                action: self.action,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(self.lost()),
        }
    }

    /// Returns the outcome if the operation has settled.
    #[must_use]
    pub fn try_result(&self) -> Option<OperationResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.lost())),
        }
    }

    const fn lost(&self) -> RoutingError {
        RoutingError::ConnectionLost {
            action: self.action,
        }
    }
}
