use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors returned synchronously by [`ProcessSupervisor`](crate::ProcessSupervisor).
///
/// Launch failures and exits are not errors here; they are reported through
/// the exit listener.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The supervisor already holds a running process.
    #[error("{executable} is already running with pid {pid}")]
    AlreadyRunning {
        /// Supervised executable.
        executable: Utf8PathBuf,
        /// Process identifier of the running child.
        pid: u32,
    },

    /// The monitor thread for a new child could not be started. The child
    /// has been killed.
    #[error("failed to monitor {executable}: {source}")]
    Monitor {
        /// Supervised executable.
        executable: Utf8PathBuf,
        /// Underlying thread spawn error.
        #[source]
        source: io::Error,
    },
}
