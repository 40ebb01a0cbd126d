//! Process-wide session and client registry.
//!
//! One instance per server, created at startup and passed explicitly to
//! whatever needs it, so tests can run independent registries side by
//! side. A single lock guards both the session set and the client set;
//! critical sections only touch set membership, never a session's own
//! guarded state.

use crate::config::ServerPolicy;
use crate::session::{supervisor, PtySpawner, Session, Spawner};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use ttymux_core::{SessionId, TtyError, TtyResult};

struct RegistryInner {
    sessions: HashMap<SessionId, Arc<Session>>,
    clients: HashSet<u64>,
}

/// The set of live sessions and attached clients, plus server policy.
pub struct Registry {
    policy: ServerPolicy,
    spawner: Arc<dyn Spawner>,
    inner: RwLock<RegistryInner>,
}

impl Registry {
    /// Create a registry that spawns real PTY-backed processes.
    pub fn new(policy: ServerPolicy) -> Arc<Self> {
        Self::with_spawner(policy, Arc::new(PtySpawner::default()))
    }

    /// Create a registry with a custom spawn primitive.
    pub fn with_spawner(policy: ServerPolicy, spawner: Arc<dyn Spawner>) -> Arc<Self> {
        Arc::new(Self {
            policy,
            spawner,
            inner: RwLock::new(RegistryInner {
                sessions: HashMap::new(),
                clients: HashSet::new(),
            }),
        })
    }

    /// Server policy, write-once at startup; reads need no locking.
    pub fn policy(&self) -> &ServerPolicy {
        &self.policy
    }

    /// Start supervising a command.
    ///
    /// Allocates the session, registers it, and launches its supervisor
    /// task. The session is visible to `find_by_id` before this returns.
    /// Spawn failures discovered by the supervisor surface as the session
    /// reaching `Crashed` with `last_error` set, not as an error here.
    pub async fn start_session(self: &Arc<Self>, argv: Vec<String>) -> TtyResult<SessionId> {
        if argv.is_empty() {
            return Err(TtyError::Spawn("empty argument vector".into()));
        }

        let session = Arc::new(Session::new(
            SessionId::next(),
            argv,
            self.policy.log_capacity,
        ));
        let id = session.id();

        {
            let mut inner = self.inner.write().await;
            inner.sessions.insert(id, Arc::clone(&session));
        }
        info!(session_id = %id, command = %session.display_command(), "session created");

        // Registration precedes the launch: the supervisor may finish (and
        // remove the session) arbitrarily fast.
        tokio::spawn(supervisor::run(
            Arc::clone(self),
            session,
            Arc::clone(&self.spawner),
        ));

        Ok(id)
    }

    /// Request termination of a session with the configured close signal.
    ///
    /// Returns false if the session does not exist or is not active.
    /// Never waits for the process to exit; the supervisor performs the
    /// terminal transition once it observes actual termination.
    pub async fn stop_session(&self, id: SessionId) -> bool {
        let Some(session) = self.find_by_id(id).await else {
            return false;
        };
        let stopped = session.request_stop(self.policy.close_signal);
        if stopped {
            info!(session_id = %id, signal = self.policy.close_signal_name.as_str(), "stop requested");
        }
        stopped
    }

    pub async fn find_by_id(&self, id: SessionId) -> Option<Arc<Session>> {
        self.inner.read().await.sessions.get(&id).cloned()
    }

    /// Find a session by OS process id. With `only_running`, sessions
    /// already past their active states are skipped.
    pub async fn find_by_pid(&self, pid: u32, only_running: bool) -> Option<Arc<Session>> {
        let inner = self.inner.read().await;
        inner
            .sessions
            .values()
            .find(|s| s.os_pid() == pid && (!only_running || s.is_running()))
            .cloned()
    }

    /// All live sessions, for shutdown walks and status listings.
    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.read().await.sessions.values().cloned().collect()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Drop a session from the set. Called only by the session's own
    /// supervisor task after the process has been reaped; the memory is
    /// released when the last `Arc` holder lets go.
    pub(crate) async fn remove_session(&self, id: SessionId) -> bool {
        let removed = self.inner.write().await.sessions.remove(&id).is_some();
        if removed {
            info!(session_id = %id, "session removed");
        } else {
            debug!(session_id = %id, "session already removed");
        }
        removed
    }

    /// Request a stop on every live session. Used by shutdown; does not
    /// wait for any of them to exit.
    pub async fn stop_all(&self) {
        let sessions = self.sessions().await;
        let mut stopped = 0usize;
        for session in &sessions {
            if session.request_stop(self.policy.close_signal) {
                stopped += 1;
            }
        }
        info!(total = sessions.len(), stopped, "stop requested for all sessions");
    }

    /// Track a newly attached client. Returns false (and refuses the
    /// membership) once `max_clients` is reached; 0 means unlimited.
    pub async fn add_client(&self, client_id: u64) -> bool {
        let mut inner = self.inner.write().await;
        if self.policy.max_clients > 0 && inner.clients.len() >= self.policy.max_clients {
            warn!(client_id, max = self.policy.max_clients, "client refused: limit reached");
            return false;
        }
        let added = inner.clients.insert(client_id);
        if added {
            info!(client_id, attached = inner.clients.len(), "client attached");
        }
        added
    }

    /// Drop a client from the set. Returns whether it was a member.
    pub async fn remove_client(&self, client_id: u64) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.clients.remove(&client_id);
        if removed {
            info!(client_id, attached = inner.clients.len(), "client detached");
        }
        removed
    }

    pub async fn client_count(&self) -> usize {
        self.inner.read().await.clients.len()
    }

    /// The `once` policy: the server should exit after the first client
    /// disconnects. Interpreted by the transport layer.
    pub fn exit_after_disconnect(&self) -> bool {
        self.policy.once
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
