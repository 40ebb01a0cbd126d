//! ttymux-server: Process-supervision and session-registry core.
//!
//! Creates, tracks, and tears down supervised command sessions, buffers
//! their recent PTY output for replay, and coordinates signal-driven
//! shutdown. The network transport, CLI, and asset serving sit above this
//! crate and drive it through [`Registry`] and [`ShutdownCoordinator`].

pub mod config;
pub mod registry;
pub mod session;
pub mod shutdown;

pub use config::ServerPolicy;
pub use registry::Registry;
pub use session::{
    ByteBuffer, ExitStatus, ProcState, PtySpawner, RingLog, Session, SpawnedChild, Spawner,
};
pub use shutdown::{ShutdownCoordinator, ShutdownTier};
