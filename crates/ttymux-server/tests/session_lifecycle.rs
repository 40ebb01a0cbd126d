//! End-to-end lifecycle tests against real processes.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use ttymux_core::{TtyError, TtyResult};
use ttymux_server::{ProcState, Registry, ServerPolicy, ShutdownTier, ShutdownCoordinator, SpawnedChild, Spawner};

const WAIT: Duration = Duration::from_secs(10);

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

async fn wait_terminal(session: &ttymux_server::Session) -> ProcState {
    let mut rx = session.watch_state();
    timeout(WAIT, rx.wait_for(|s| s.is_terminal()))
        .await
        .expect("session did not reach a terminal state")
        .map(|s| *s)
        .expect("state channel closed")
}

async fn wait_removed(registry: &Registry, id: ttymux_core::SessionId) {
    timeout(WAIT, async {
        while registry.find_by_id(id).await.is_some() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("session was not removed");
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_session_stops_and_replays_output() {
    init_tracing();
    let registry = Registry::new(ServerPolicy::default());

    let id = registry
        .start_session(argv(&["/bin/echo", "hello"]))
        .await
        .unwrap();
    let session = registry.find_by_id(id).await.expect("session visible");

    assert_eq!(wait_terminal(&session).await, ProcState::Stopped);
    let status = session.exit_status().expect("exit status recorded");
    assert!(status.success());

    // The PTY may translate the line terminator; the payload must be there.
    let replay = session.snapshot(0).unwrap();
    assert!(
        replay.windows(5).any(|w| w == b"hello"),
        "replay missing output: {:?}",
        String::from_utf8_lossy(&replay)
    );

    wait_removed(&registry, id).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn started_session_is_immediately_visible() {
    let registry = Registry::new(ServerPolicy::default());

    let id = registry
        .start_session(argv(&["/bin/sleep", "5"]))
        .await
        .unwrap();
    let session = registry.find_by_id(id).await.expect("visible right away");
    assert_eq!(session.display_command(), "/bin/sleep 5");

    assert!(registry.stop_session(id).await);
    wait_removed(&registry, id).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn find_by_pid_scans_running_sessions() {
    let registry = Registry::new(ServerPolicy::default());

    let id = registry
        .start_session(argv(&["/bin/sleep", "5"]))
        .await
        .unwrap();
    let session = registry.find_by_id(id).await.unwrap();

    let mut rx = session.watch_state();
    timeout(WAIT, rx.wait_for(|s| *s >= ProcState::Running))
        .await
        .expect("never reached running")
        .unwrap();

    let pid = session.os_pid();
    assert_ne!(pid, 0);
    let found = registry.find_by_pid(pid, true).await.expect("found by pid");
    assert_eq!(found.id(), id);
    assert!(registry.find_by_pid(pid.wrapping_add(100_000), false).await.is_none());

    registry.stop_session(id).await;
    wait_removed(&registry, id).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_stops_race_to_a_single_winner() {
    init_tracing();
    let registry = Registry::new(ServerPolicy::default());

    let id = registry
        .start_session(argv(&["/bin/sleep", "5"]))
        .await
        .unwrap();
    let session = registry.find_by_id(id).await.unwrap();

    let mut rx = session.watch_state();
    timeout(WAIT, rx.wait_for(|s| *s >= ProcState::Running))
        .await
        .expect("never reached running")
        .unwrap();

    let (a, b) = tokio::join!(registry.stop_session(id), registry.stop_session(id));
    assert!(a ^ b, "exactly one stop may observe the transition");

    assert_eq!(wait_terminal(&session).await, ProcState::Stopped);
    wait_removed(&registry, id).await;

    // The session is gone; a third stop is a miss.
    assert!(!registry.stop_session(id).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_on_unknown_session_is_a_miss() {
    let registry = Registry::new(ServerPolicy::default());
    assert!(!registry.stop_session(ttymux_core::SessionId::from(u64::MAX)).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_argv_is_a_spawn_error() {
    let registry = Registry::new(ServerPolicy::default());
    let err = registry.start_session(Vec::new()).await.unwrap_err();
    assert!(matches!(err, TtyError::Spawn(_)));
    assert_eq!(registry.session_count().await, 0);
}

/// Spawner that always fails, after a short delay so the test can grab the
/// session before its supervisor tears it down.
struct FailingSpawner;

impl Spawner for FailingSpawner {
    fn spawn(&self, _argv: &[String], _term: &str) -> TtyResult<SpawnedChild> {
        std::thread::sleep(Duration::from_millis(100));
        Err(TtyError::Spawn("simulated spawn failure".into()))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_spawn_crashes_and_removes_the_session() {
    init_tracing();
    let registry = Registry::with_spawner(ServerPolicy::default(), Arc::new(FailingSpawner));

    let id = registry
        .start_session(argv(&["/does/not/matter"]))
        .await
        .unwrap();
    let session = registry.find_by_id(id).await.expect("registered before crash");

    assert_eq!(wait_terminal(&session).await, ProcState::Crashed);
    let reason = session.last_error().expect("failure reason recorded");
    assert!(!reason.is_empty());
    assert!(session.exit_status().is_none());

    wait_removed(&registry, id).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn live_output_reaches_subscribers_and_input_drives_the_command() {
    init_tracing();
    let registry = Registry::new(ServerPolicy::default());

    let id = registry.start_session(argv(&["/bin/cat"])).await.unwrap();
    let session = registry.find_by_id(id).await.unwrap();

    let mut rx = session.watch_state();
    timeout(WAIT, rx.wait_for(|s| *s >= ProcState::Running))
        .await
        .expect("never reached running")
        .unwrap();

    let mut output = session.subscribe_output();
    session.write_input(b"ping\n").unwrap();

    let mut seen = Vec::new();
    timeout(WAIT, async {
        loop {
            match output.recv().await {
                Ok(chunk) => {
                    seen.extend_from_slice(&chunk);
                    if seen.windows(4).any(|w| w == b"ping") {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    })
    .await
    .expect("echoed input never arrived");
    assert!(seen.windows(4).any(|w| w == b"ping"));

    // The same bytes are retained for replay.
    let replay = session.snapshot(0).unwrap();
    assert!(replay.windows(4).any(|w| w == b"ping"));

    registry.stop_session(id).await;
    wait_removed(&registry, id).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn client_set_honors_max_clients() {
    let policy = ServerPolicy {
        max_clients: 2,
        once: true,
        ..ServerPolicy::default()
    };
    let registry = Registry::with_spawner(policy, Arc::new(FailingSpawner));

    assert!(registry.add_client(1).await);
    assert!(registry.add_client(2).await);
    assert!(!registry.add_client(3).await);
    assert_eq!(registry.client_count().await, 2);

    assert!(registry.remove_client(1).await);
    assert!(!registry.remove_client(1).await);
    assert!(registry.add_client(3).await);

    assert!(registry.exit_after_disconnect());
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_sessions_then_escalates() {
    init_tracing();
    let registry = Registry::new(ServerPolicy::default());
    let coordinator = ShutdownCoordinator::new();

    let id = registry
        .start_session(argv(&["/bin/sleep", "5"]))
        .await
        .unwrap();
    let session = registry.find_by_id(id).await.unwrap();
    let mut rx = session.watch_state();
    timeout(WAIT, rx.wait_for(|s| *s >= ProcState::Running))
        .await
        .expect("never reached running")
        .unwrap();

    assert!(!coordinator.is_requested());
    assert_eq!(coordinator.request(&registry).await, ShutdownTier::Graceful);
    assert!(coordinator.is_requested());

    // The transport loop unblocks at once.
    timeout(Duration::from_secs(1), coordinator.wait())
        .await
        .expect("wait did not unblock");

    assert_eq!(wait_terminal(&session).await, ProcState::Stopped);
    wait_removed(&registry, id).await;

    // Escalation is reported to the caller, which owns the hard exit.
    assert_eq!(coordinator.request(&registry).await, ShutdownTier::Immediate);
}
