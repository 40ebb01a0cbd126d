//! One supervised command: identity, state machine, and output log.

use super::pty::ExitStatus;
use super::ring_log::RingLog;
use std::fmt;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};
use ttymux_core::signal::Signal;
use ttymux_core::{SessionId, TtyError, TtyResult};

/// Live-output fan-out depth per session. Slow subscribers lag and skip;
/// they can recover from the ring log.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of a supervised process. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

impl ProcState {
    /// The process is gone and the state can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcState::Stopped | ProcState::Crashed)
    }

    /// A stop request makes sense in this state.
    pub fn is_running(self) -> bool {
        matches!(self, ProcState::Starting | ProcState::Running)
    }
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcState::Created => "created",
            ProcState::Starting => "starting",
            ProcState::Running => "running",
            ProcState::Stopping => "stopping",
            ProcState::Stopped => "stopped",
            ProcState::Crashed => "crashed",
        };
        f.write_str(name)
    }
}

/// Fields the supervisor and stop requests race over; guarded by one mutex.
struct SessionInner {
    state: ProcState,
    os_pid: u32,
    exit_status: Option<ExitStatus>,
    last_error: Option<String>,
}

/// One supervised command session.
///
/// The supervisor task is the sole writer of `os_pid`, `exit_status`,
/// `last_error`, and of terminal states; `request_stop` may only advance
/// to `Stopping`. Every transition is published on a watch channel so
/// observers never poll.
pub struct Session {
    id: SessionId,
    argv: Vec<String>,
    display_command: String,
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<ProcState>,
    log: Mutex<RingLog>,
    output_tx: broadcast::Sender<Vec<u8>>,
    input: Mutex<Option<Box<dyn Write + Send>>>,
}

impl Session {
    pub(crate) fn new(id: SessionId, argv: Vec<String>, log_capacity: usize) -> Self {
        let display_command = argv.join(" ");
        let (state_tx, _) = watch::channel(ProcState::Created);
        let (output_tx, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        Self {
            id,
            argv,
            display_command,
            inner: Mutex::new(SessionInner {
                state: ProcState::Created,
                os_pid: 0,
                exit_status: None,
                last_error: None,
            }),
            state_tx,
            log: Mutex::new(RingLog::new(log_capacity)),
            output_tx,
            input: Mutex::new(None),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The argv joined by single spaces, for display.
    pub fn display_command(&self) -> &str {
        &self.display_command
    }

    pub fn state(&self) -> ProcState {
        self.guarded().state
    }

    /// OS process id, 0 until the spawn primitive has reported one.
    pub fn os_pid(&self) -> u32 {
        self.guarded().os_pid
    }

    /// Raw termination status; `Some` only once the state is terminal.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.guarded().exit_status
    }

    pub fn last_error(&self) -> Option<String> {
        self.guarded().last_error.clone()
    }

    pub fn is_running(&self) -> bool {
        self.guarded().state.is_running()
    }

    /// Observe state transitions without polling.
    pub fn watch_state(&self) -> watch::Receiver<ProcState> {
        self.state_tx.subscribe()
    }

    /// Receive live output chunks as the supervisor pumps them.
    pub fn subscribe_output(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output_tx.subscribe()
    }

    /// Copy out buffered output, oldest first. `requested == 0` means all.
    pub fn snapshot(&self, requested: usize) -> TtyResult<super::ring_log::ByteBuffer> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(requested)
    }

    /// Forward bytes to the command's input.
    pub fn write_input(&self, data: &[u8]) -> TtyResult<()> {
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = input
            .as_mut()
            .ok_or_else(|| TtyError::Other(format!("session {} has no input channel", self.id)))?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Request termination: deliver `sig` to the process and mark the
    /// session `Stopping`. Returns false if the session is not active, so
    /// exactly one of any concurrent callers observes the transition.
    /// Never waits for the process to exit.
    pub fn request_stop(&self, sig: Signal) -> bool {
        let mut inner = self.guarded();
        if !inner.state.is_running() {
            return false;
        }
        if inner.os_pid != 0 {
            if let Err(e) = nix::sys::signal::kill(pid_of(inner.os_pid), sig) {
                warn!(session_id = %self.id, pid = inner.os_pid, error = %e, "failed to signal process");
            }
        }
        inner.state = ProcState::Stopping;
        self.state_tx.send_replace(ProcState::Stopping);
        true
    }

    // --- supervisor-only mutations ---

    pub(crate) fn mark_starting(&self) {
        self.advance(ProcState::Starting);
    }

    /// Record the pid and move to `Running`. Returns false when a stop
    /// arrived during the spawn, in which case the caller still owes the
    /// process its close signal.
    pub(crate) fn mark_running(&self, pid: u32) -> bool {
        let mut inner = self.guarded();
        inner.os_pid = pid;
        if inner.state != ProcState::Starting {
            return false;
        }
        inner.state = ProcState::Running;
        self.state_tx.send_replace(ProcState::Running);
        debug!(session_id = %self.id, pid, "process running");
        true
    }

    pub(crate) fn install_input(&self, writer: Box<dyn Write + Send>) {
        *self.input.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer);
    }

    /// Append a pumped output chunk to the ring log and fan it out to
    /// attached subscribers. No subscribers is not an error.
    pub(crate) fn push_output(&self, chunk: &[u8]) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(chunk);
        let _ = self.output_tx.send(chunk.to_vec());
    }

    /// The spawn primitive failed: record the reason and go straight to
    /// `Crashed`.
    pub(crate) fn mark_spawn_failed(&self, reason: String) {
        let mut inner = self.guarded();
        inner.last_error = Some(reason);
        self.terminate(&mut inner, ProcState::Crashed);
    }

    /// The process terminated; classify and record the authoritative
    /// terminal state. Normal exit, or any exit after a stop was
    /// requested, is `Stopped`; everything else is `Crashed`.
    pub(crate) fn mark_exited(&self, status: ExitStatus) {
        let mut inner = self.guarded();
        inner.exit_status = Some(status);
        if status.success() || inner.state == ProcState::Stopping {
            self.terminate(&mut inner, ProcState::Stopped);
        } else {
            if inner.last_error.is_none() {
                inner.last_error = Some(format!("process exited with code {}", status.code));
            }
            self.terminate(&mut inner, ProcState::Crashed);
        }
    }

    /// The child could not be reaped; treat as a crash.
    pub(crate) fn mark_reap_failed(&self, reason: String) {
        let mut inner = self.guarded();
        inner.last_error = Some(reason);
        self.terminate(&mut inner, ProcState::Crashed);
    }

    fn terminate(&self, inner: &mut SessionInner, state: ProcState) {
        if inner.state.is_terminal() {
            return;
        }
        debug!(session_id = %self.id, from = %inner.state, to = %state, "state transition");
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn advance(&self, next: ProcState) -> bool {
        let mut inner = self.guarded();
        if inner.state.is_terminal() || next <= inner.state {
            return false;
        }
        debug!(session_id = %self.id, from = %inner.state, to = %next, "state transition");
        inner.state = next;
        self.state_tx.send_replace(next);
        true
    }

    // A poisoned lock only means some holder panicked mid-update; the
    // guarded fields stay usable.
    fn guarded(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("command", &self.display_command)
            .field("state", &self.state())
            .finish()
    }
}

fn pid_of(pid: u32) -> nix::unistd::Pid {
    nix::unistd::Pid::from_raw(pid as i32)
}
