//! Lifecycle of a single external executable.
//!
//! A [`ProcessSupervisor`] moves between holding no child and holding one.
//! Every successful call to [`ProcessSupervisor::start`] is matched by
//! exactly one exit notification, always delivered off the caller's thread:
//! from a short-lived thread when the launch fails, or from the launch's
//! monitor thread once the child terminates. The handle is
//! cleared before the listener runs, so the listener may start the process
//! again.

use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::errors::SupervisorError;

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Interval between child status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

type ExitListener = Arc<dyn Fn() + Send + Sync>;

/// Best-effort supervisor for one external executable.
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
}

struct Shared {
    executable: Utf8PathBuf,
    poll_interval: Duration,
    state: Mutex<SupervisorState>,
}

#[derive(Default)]
struct SupervisorState {
    running: Option<RunningChild>,
    next_launch: u64,
    exit_listener: Option<ExitListener>,
}

struct RunningChild {
    launch: u64,
    child: Child,
}

impl ProcessSupervisor {
    /// Creates a supervisor for `executable` holding no process.
    #[must_use]
    pub fn new(executable: impl Into<Utf8PathBuf>) -> Self {
        Self::with_poll_interval(executable, DEFAULT_POLL_INTERVAL)
    }

    /// Creates a supervisor polling its child every `poll_interval`.
    #[must_use]
    pub fn with_poll_interval(executable: impl Into<Utf8PathBuf>, poll_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                executable: executable.into(),
                poll_interval,
                state: Mutex::new(SupervisorState::default()),
            }),
        }
    }

    /// Path of the supervised executable.
    #[must_use]
    pub fn executable(&self) -> &Utf8Path {
        &self.shared.executable
    }

    /// Launches the executable with `args` and returns without waiting.
    ///
    /// A launch failure is not returned; it is logged and reported through
    /// the exit listener, after which `start` may be called again.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::AlreadyRunning`] while a previous child is
    /// still held and [`SupervisorError::Monitor`] when the thread that would
    /// deliver the exit notification cannot be started.
    pub fn start<S: AsRef<str>>(&self, args: &[S]) -> Result<(), SupervisorError> {
        let mut state = self.shared.lock();
        if let Some(running) = &state.running {
            return Err(SupervisorError::AlreadyRunning {
                executable: self.shared.executable.clone(),
                pid: running.child.id(),
            });
        }

        let argv: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        debug!(
            target: SUPERVISOR_TARGET,
            executable = %self.shared.executable,
            ?argv,
            "spawning supervised process"
        );
        let spawned = Command::new(self.shared.executable.as_std_path())
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(error) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    executable = %self.shared.executable,
                    %error,
                    "supervised process failed to launch"
                );
                drop(state);
                return self.report_launch_failure();
            }
        };

        let launch = state.next_launch;
        state.next_launch = state.next_launch.wrapping_add(1);
        let pid = child.id();
        state.running = Some(RunningChild { launch, child });

        let shared = Arc::clone(&self.shared);
        let monitor = thread::Builder::new()
            .name(format!("supervisor-monitor-{pid}"))
            .spawn(move || shared.monitor(launch));
        if let Err(source) = monitor {
            if let Some(mut running) = state.running.take() {
                kill_child(&self.shared.executable, &mut running.child);
                if let Err(error) = running.child.wait() {
                    debug!(target: SUPERVISOR_TARGET, %error, "failed to reap unmonitored process");
                }
            }
            return Err(SupervisorError::Monitor {
                executable: self.shared.executable.clone(),
                source,
            });
        }

        info!(
            target: SUPERVISOR_TARGET,
            executable = %self.shared.executable,
            pid,
            "supervised process started"
        );
        Ok(())
    }

    /// Delivers the exit notification for a failed launch from its own
    /// thread, as the monitor does for a launched child.
    fn report_launch_failure(&self) -> Result<(), SupervisorError> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(String::from("supervisor-launch-failure"))
            .spawn(move || {
                let listener = shared.lock().exit_listener.clone();
                notify(listener);
            })
            .map(drop)
            .map_err(|source| SupervisorError::Monitor {
                executable: self.shared.executable.clone(),
                source,
            })
    }

    /// Kills the held child without waiting for it to exit.
    ///
    /// Does nothing when no child is held. The exit notification follows
    /// once the monitor observes the termination.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        let Some(running) = state.running.as_mut() else {
            debug!(
                target: SUPERVISOR_TARGET,
                executable = %self.shared.executable,
                "stop requested with no running process"
            );
            return;
        };
        info!(
            target: SUPERVISOR_TARGET,
            executable = %self.shared.executable,
            pid = running.child.id(),
            "stopping supervised process"
        );
        kill_child(&self.shared.executable, &mut running.child);
    }

    /// Returns `true` while a child is held.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lock().running.is_some()
    }

    /// Process identifier of the held child.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.shared
            .lock()
            .running
            .as_ref()
            .map(|running| running.child.id())
    }

    /// Installs the listener called once per start when the child is gone,
    /// replacing any previous one.
    pub fn set_exit_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.shared.lock().exit_listener = Some(Arc::new(listener));
    }

    /// Removes the exit listener.
    pub fn clear_exit_listener(&self) {
        self.shared.lock().exit_listener = None;
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.exit_listener = None;
        if let Some(running) = state.running.as_mut() {
            kill_child(&self.shared.executable, &mut running.child);
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Polls the child of `launch` until it exits, then clears the handle
    /// and notifies.
    fn monitor(&self, launch: u64) {
        loop {
            let mut state = self.lock();
            let Some(running) = state
                .running
                .as_mut()
                .filter(|running| running.launch == launch)
            else {
                return;
            };

            let outcome = running.child.try_wait();
            let pid = running.child.id();
            match outcome {
                Ok(None) => {
                    drop(state);
                    thread::sleep(self.poll_interval);
                    continue;
                }
                Ok(Some(status)) => info!(
                    target: SUPERVISOR_TARGET,
                    executable = %self.executable,
                    pid,
                    %status,
                    "supervised process exited"
                ),
                Err(error) => warn!(
                    target: SUPERVISOR_TARGET,
                    executable = %self.executable,
                    pid,
                    %error,
                    "lost track of supervised process"
                ),
            }
            state.running = None;
            let listener = state.exit_listener.clone();
            drop(state);
            notify(listener);
            return;
        }
    }
}

fn kill_child(executable: &Utf8Path, child: &mut Child) {
    match child.kill() {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::InvalidInput => {
            debug!(
                target: SUPERVISOR_TARGET,
                %executable,
                "supervised process had already exited"
            );
        }
        Err(error) => warn!(
            target: SUPERVISOR_TARGET,
            %executable,
            %error,
            "failed to kill supervised process"
        ),
    }
}

fn notify(listener: Option<ExitListener>) {
    if let Some(listener) = listener {
        listener();
    }
}
