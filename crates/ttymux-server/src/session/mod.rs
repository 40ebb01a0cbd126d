//! Session supervision: state machine, PTY seam, output ring log.

pub mod pty;
pub mod ring_log;
pub mod state;
pub(crate) mod supervisor;

pub use pty::{ExitStatus, PtySpawner, SpawnedChild, Spawner};
pub use ring_log::{ByteBuffer, RingLog};
pub use state::{ProcState, Session};
