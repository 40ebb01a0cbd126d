//! ttymux-core: Shared library for the ttymux terminal server.
//!
//! Provides the common error type, stable session identifiers, and the
//! close-signal name/number mapping used to validate server policy.

pub mod error;
pub mod id;
pub mod signal;

// Re-export commonly used items at crate root.
pub use error::{TtyError, TtyResult};
pub use id::SessionId;
pub use signal::{signal_from_name, signal_name, DEFAULT_CLOSE_SIGNAL};
