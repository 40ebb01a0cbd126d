//! PTY spawn seam.
//!
//! The supervisor drives child processes only through the [`Spawner`]
//! trait, so tests can substitute a failing implementation. The real one
//! wraps portable-pty: it opens a pseudo-terminal, execs the argument
//! vector on the slave side, and hands back the master-side byte streams.
//! Failures inside the nascent child before exec travel back over
//! portable-pty's own pipe, which stays valid across the exec image swap.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use tracing::debug;
use ttymux_core::{TtyError, TtyResult};

/// Normalized termination status of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: u32,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// A live child process attached to a pseudo-terminal.
pub struct SpawnedChild {
    pid: u32,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
    /// Keeps the master side open while the child runs; dropping it would
    /// close the PTY under the reader.
    _master: Box<dyn MasterPty + Send>,
}

impl SpawnedChild {
    /// OS process id of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take the PTY output stream. Yields `None` on a second call.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// Take the PTY input stream. Yields `None` on a second call.
    pub fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    /// Block until the child terminates and reap it.
    ///
    /// Call from a `spawn_blocking` context.
    pub fn wait(&mut self) -> TtyResult<ExitStatus> {
        let status = self.child.wait()?;
        Ok(ExitStatus {
            code: status.exit_code(),
        })
    }
}

/// Creates an OS process from an argument vector, per server policy.
pub trait Spawner: Send + Sync + 'static {
    fn spawn(&self, argv: &[String], term: &str) -> TtyResult<SpawnedChild>;
}

/// The production [`Spawner`], backed by the native PTY system.
#[derive(Debug, Clone, Copy)]
pub struct PtySpawner {
    pub cols: u16,
    pub rows: u16,
}

impl Default for PtySpawner {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl Spawner for PtySpawner {
    fn spawn(&self, argv: &[String], term: &str) -> TtyResult<SpawnedChild> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| TtyError::Spawn("empty argument vector".into()))?;

        let pty_system = native_pty_system();
        let size = PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(size)
            .map_err(|e| TtyError::Spawn(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(program);
        for arg in args {
            cmd.arg(arg);
        }
        cmd.env("TERM", term);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TtyError::Spawn(format!("failed to spawn command: {e}")))?;
        let pid = child.process_id().unwrap_or(0);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TtyError::Spawn(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TtyError::Spawn(format!("failed to take PTY writer: {e}")))?;

        debug!(pid, program = %program, "PTY spawned");

        Ok(SpawnedChild {
            pid,
            reader: Some(reader),
            writer: Some(writer),
            child,
            _master: pair.master,
        })
    }
}
