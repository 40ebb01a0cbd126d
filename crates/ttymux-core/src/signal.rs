//! Close-signal mapping.
//!
//! Server policy names the signal delivered to a supervised command when a
//! stop is requested. Operators may configure it by name (`HUP`, `SIGTERM`)
//! or by number; an unknown value is fatal at startup.

use crate::error::{TtyError, TtyResult};
use std::str::FromStr;

pub use nix::sys::signal::Signal;

/// Signal sent to a command on stop when none is configured (SIGHUP).
pub const DEFAULT_CLOSE_SIGNAL: Signal = Signal::SIGHUP;

/// Resolve a configured signal value to a [`Signal`].
///
/// Accepts a bare name (`HUP`), a `SIG`-prefixed name (`SIGHUP`), or a
/// decimal signal number (`1`).
pub fn signal_from_name(value: &str) -> TtyResult<Signal> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TtyError::InvalidSignal(value.to_string()));
    }

    if let Ok(num) = value.parse::<i32>() {
        return Signal::try_from(num).map_err(|_| TtyError::InvalidSignal(value.to_string()));
    }

    let mut name = value.to_ascii_uppercase();
    if !name.starts_with("SIG") {
        name.insert_str(0, "SIG");
    }
    Signal::from_str(&name).map_err(|_| TtyError::InvalidSignal(value.to_string()))
}

/// Display name for a signal (`SIGHUP`).
pub fn signal_name(sig: Signal) -> &'static str {
    sig.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_bare_name() {
        assert_eq!(signal_from_name("hup").unwrap(), Signal::SIGHUP);
        assert_eq!(signal_from_name("TERM").unwrap(), Signal::SIGTERM);
    }

    #[test]
    fn resolves_prefixed_name() {
        assert_eq!(signal_from_name("SIGINT").unwrap(), Signal::SIGINT);
    }

    #[test]
    fn resolves_number() {
        assert_eq!(signal_from_name("1").unwrap(), Signal::SIGHUP);
        assert_eq!(signal_from_name("9").unwrap(), Signal::SIGKILL);
    }

    #[test]
    fn rejects_unknown() {
        assert!(matches!(
            signal_from_name("SIGNOPE"),
            Err(TtyError::InvalidSignal(_))
        ));
        assert!(matches!(
            signal_from_name("999"),
            Err(TtyError::InvalidSignal(_))
        ));
        assert!(signal_from_name("").is_err());
    }

    #[test]
    fn names_round_trip() {
        assert_eq!(signal_name(Signal::SIGHUP), "SIGHUP");
    }
}
