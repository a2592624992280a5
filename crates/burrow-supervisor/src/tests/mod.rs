//! Unit tests for the process supervisor, using `/bin/sh` as the child.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::{ProcessSupervisor, SupervisorError};

const SHELL: &str = "/bin/sh";
const POLL: Duration = Duration::from_millis(10);
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

struct Harness {
    supervisor: ProcessSupervisor,
    exits: Receiver<()>,
}

impl Harness {
    fn new(executable: &str) -> Self {
        let supervisor = ProcessSupervisor::with_poll_interval(executable, POLL);
        let (exits_tx, exits) = mpsc::channel();
        supervisor.set_exit_listener(move || exits_tx.send(()).unwrap_or_default());
        Self { supervisor, exits }
    }

    fn expect_exit(&self) {
        self.exits
            .recv_timeout(NOTIFY_TIMEOUT)
            .expect("exit notification should arrive");
    }

    fn expect_no_further_exit(&self) {
        assert!(
            self.exits.recv_timeout(QUIET_PERIOD).is_err(),
            "only one exit notification per start"
        );
    }
}

#[fixture]
fn shell() -> Harness {
    Harness::new(SHELL)
}

#[rstest]
fn start_then_stop_notifies_once(shell: Harness) {
    shell
        .supervisor
        .start(&["-c", "sleep 30"])
        .expect("shell starts");
    assert!(shell.supervisor.is_running());
    assert!(shell.supervisor.pid().is_some());

    shell.supervisor.stop();

    shell.expect_exit();
    shell.expect_no_further_exit();
    assert!(!shell.supervisor.is_running());
    assert_eq!(shell.supervisor.pid(), None);
}

#[rstest]
fn natural_exit_notifies_and_permits_restart(shell: Harness) {
    shell
        .supervisor
        .start(&["-c", "exit 3"])
        .expect("shell starts");
    shell.expect_exit();
    assert!(!shell.supervisor.is_running());

    shell
        .supervisor
        .start(&["-c", "exit 0"])
        .expect("restart is permitted");
    shell.expect_exit();
    shell.expect_no_further_exit();
}

#[rstest]
fn missing_executable_notifies_once_and_permits_restart() {
    let dir = TempDir::new().expect("create temporary directory");
    let missing = dir.path().join("no-such-binary");
    let harness = Harness::new(missing.to_str().expect("UTF-8 temp path"));

    harness
        .supervisor
        .start(&["--version"])
        .expect("launch failure is not returned");
    harness.expect_exit();
    harness.expect_no_further_exit();
    assert!(!harness.supervisor.is_running());

    harness
        .supervisor
        .start(&["--version"])
        .expect("restart is permitted");
    harness.expect_exit();
}

#[rstest]
fn launch_failure_is_reported_off_the_callers_thread() {
    let dir = TempDir::new().expect("create temporary directory");
    let missing = dir.path().join("no-such-binary");
    let supervisor =
        ProcessSupervisor::with_poll_interval(missing.to_str().expect("UTF-8 temp path"), POLL);
    let orchestrator = Arc::new(Mutex::new(()));
    let listener_lock = Arc::clone(&orchestrator);
    let (exits_tx, exits) = mpsc::channel();
    supervisor.set_exit_listener(move || {
        let _held = listener_lock.lock().expect("orchestrator lock is not poisoned");
        exits_tx
            .send(thread::current().id())
            .unwrap_or_default();
    });

    {
        let _held = orchestrator.lock().expect("orchestrator lock is not poisoned");
        supervisor
            .start(&["--version"])
            .expect("launch failure is not returned");
        assert!(
            exits.try_recv().is_err(),
            "listener must not run before start returns"
        );
    }

    let notifier = exits
        .recv_timeout(NOTIFY_TIMEOUT)
        .expect("exit notification should arrive");
    assert_ne!(notifier, thread::current().id());
}

#[rstest]
fn second_start_is_rejected_while_running(shell: Harness) {
    shell
        .supervisor
        .start(&["-c", "sleep 30"])
        .expect("shell starts");
    let pid = shell.supervisor.pid().expect("running child has a pid");

    let error = shell
        .supervisor
        .start(&["-c", "sleep 30"])
        .expect_err("second start is rejected");

    assert!(matches!(
        error,
        SupervisorError::AlreadyRunning { pid: reported, .. } if reported == pid
    ));
    shell.supervisor.stop();
    shell.expect_exit();
    shell.expect_no_further_exit();
}

#[rstest]
fn stop_without_process_is_a_no_op(shell: Harness) {
    shell.supervisor.stop();

    shell.expect_no_further_exit();
    assert!(!shell.supervisor.is_running());
}

#[rstest]
fn cleared_listener_is_not_called(shell: Harness) {
    shell.supervisor.clear_exit_listener();
    shell
        .supervisor
        .start(&["-c", "exit 0"])
        .expect("shell starts");

    shell.expect_no_further_exit();
    assert!(!shell.supervisor.is_running());
}
