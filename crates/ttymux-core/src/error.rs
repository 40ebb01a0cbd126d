use crate::id::SessionId;
use thiserror::Error;

/// Errors produced by the ttymux supervision core.
#[derive(Debug, Error)]
pub enum TtyError {
    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("snapshot of {requested} bytes exceeds log capacity {capacity}")]
    SnapshotTooLarge { requested: usize, capacity: usize },

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type TtyResult<T> = Result<T, TtyError>;
