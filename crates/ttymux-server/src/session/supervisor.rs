//! The per-session supervisor task.
//!
//! Owns the spawn, pumps PTY output into the ring log and the live
//! broadcast, reaps the child, performs the authoritative terminal state
//! transition, and removes the session from the registry as its very last
//! step.

use super::pty::Spawner;
use super::state::Session;
use crate::registry::Registry;
use std::io::Read;
use std::sync::Arc;
use tracing::{info, warn};

const PUMP_CHUNK: usize = 4096;

pub(crate) async fn run(registry: Arc<Registry>, session: Arc<Session>, spawner: Arc<dyn Spawner>) {
    session.mark_starting();

    let policy = registry.policy();
    let mut child = match spawner.spawn(session.argv(), &policy.terminal_type) {
        Ok(child) => child,
        Err(e) => {
            warn!(session_id = %session.id(), command = %session.display_command(), error = %e, "spawn failed");
            session.mark_spawn_failed(e.to_string());
            registry.remove_session(session.id()).await;
            return;
        }
    };

    let pid = child.pid();
    if let Some(writer) = child.take_writer() {
        session.install_input(writer);
    }

    if session.mark_running(pid) {
        info!(session_id = %session.id(), pid, command = %session.display_command(), "session running");
    } else {
        // A stop arrived while the spawn was in flight; the process never
        // got its close signal, deliver it now.
        if pid != 0 {
            if let Err(e) =
                nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), policy.close_signal)
            {
                warn!(session_id = %session.id(), pid, error = %e, "failed to signal process");
            }
        }
    }

    // Pump output until EOF, then reap. Both block, so the whole tail of
    // the child's life runs on one blocking thread.
    let reader = child.take_reader();
    let pump_session = Arc::clone(&session);
    let reaped = tokio::task::spawn_blocking(move || {
        if let Some(mut reader) = reader {
            let mut buf = [0u8; PUMP_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => pump_session.push_output(&buf[..n]),
                    // The PTY master errors once the slave side is gone.
                    Err(_) => break,
                }
            }
        }
        child.wait()
    })
    .await;

    match reaped {
        Ok(Ok(status)) => {
            session.mark_exited(status);
            info!(
                session_id = %session.id(),
                pid,
                code = status.code,
                state = %session.state(),
                "session terminated"
            );
        }
        Ok(Err(e)) => {
            warn!(session_id = %session.id(), pid, error = %e, "failed to reap process");
            session.mark_reap_failed(e.to_string());
        }
        Err(e) => {
            warn!(session_id = %session.id(), pid, error = %e, "output pump panicked");
            session.mark_reap_failed(e.to_string());
        }
    }

    registry.remove_session(session.id()).await;
}
