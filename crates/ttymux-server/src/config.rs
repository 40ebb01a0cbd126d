//! Server policy configuration: TOML file + programmatic defaults.
//!
//! Policy is resolved once at startup and read-only afterwards, so no
//! locking guards it. Validation failures (an unknown close signal, a
//! malformed credential) are fatal to startup by design.

use crate::session::ring_log::DEFAULT_LOG_CAPACITY;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use ttymux_core::signal::Signal;
use ttymux_core::{signal_from_name, signal_name, TtyError, TtyResult, DEFAULT_CLOSE_SIGNAL};

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Do not allow clients to write to the TTY.
    #[serde(default)]
    pub readonly: bool,
    /// Refuse websocket connections from a different origin.
    #[serde(default)]
    pub check_origin: bool,
    /// Maximum attached clients; 0 means unlimited.
    #[serde(default)]
    pub max_clients: usize,
    /// Exit after the first client disconnects.
    #[serde(default)]
    pub once: bool,
    /// Client reconnect timeout in seconds.
    #[serde(default = "default_reconnect")]
    pub reconnect: u64,
    /// Signal sent to a command on stop, by name or number.
    #[serde(default = "default_signal")]
    pub signal: String,
    #[serde(default = "default_terminal_type")]
    pub terminal_type: String,
    /// Basic-auth credential, `username:password`.
    #[serde(default)]
    pub credential: Option<String>,
    /// Custom index.html path.
    #[serde(default)]
    pub index: Option<String>,
    /// Unix domain socket to listen on instead of a TCP port.
    #[serde(default)]
    pub socket_path: Option<String>,
    /// Per-session output replay capacity in bytes.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            readonly: false,
            check_origin: false,
            max_clients: 0,
            once: false,
            reconnect: default_reconnect(),
            signal: default_signal(),
            terminal_type: default_terminal_type(),
            credential: None,
            index: None,
            socket_path: None,
            log_capacity: default_log_capacity(),
        }
    }
}

fn default_reconnect() -> u64 {
    10
}
fn default_signal() -> String {
    "SIGHUP".to_string()
}
fn default_terminal_type() -> String {
    "xterm-256color".to_string()
}
fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

/// Resolved server policy: validated, paths expanded, write-once.
#[derive(Debug, Clone)]
pub struct ServerPolicy {
    pub readonly: bool,
    pub check_origin: bool,
    pub max_clients: usize,
    pub once: bool,
    pub reconnect_secs: u64,
    pub close_signal: Signal,
    pub close_signal_name: String,
    pub terminal_type: String,
    pub credential: Option<String>,
    pub index_path: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
    pub log_capacity: usize,
}

impl Default for ServerPolicy {
    fn default() -> Self {
        Self {
            readonly: false,
            check_origin: false,
            max_clients: 0,
            once: false,
            reconnect_secs: default_reconnect(),
            close_signal: DEFAULT_CLOSE_SIGNAL,
            close_signal_name: signal_name(DEFAULT_CLOSE_SIGNAL).to_string(),
            terminal_type: default_terminal_type(),
            credential: None,
            index_path: None,
            socket_path: None,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl ServerPolicy {
    /// Load policy from a TOML file; a missing file means all defaults.
    pub fn load(config_path: Option<&Path>) -> TtyResult<Self> {
        let section = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| TtyError::Config(format!("config parse error: {e}")))?
                    .server
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ServerSection::default()
            }
        } else {
            ServerSection::default()
        };

        Self::resolve(section)
    }

    /// Parse policy from a TOML string.
    pub fn from_toml_str(content: &str) -> TtyResult<Self> {
        let file = toml::from_str::<ConfigFile>(content)
            .map_err(|e| TtyError::Config(format!("config parse error: {e}")))?;
        Self::resolve(file.server)
    }

    /// Validate a parsed section and resolve it into policy.
    pub fn resolve(section: ServerSection) -> TtyResult<Self> {
        if section.reconnect == 0 {
            return Err(TtyError::Config("invalid reconnect timeout: 0".into()));
        }
        if section.log_capacity == 0 {
            return Err(TtyError::Config("invalid log capacity: 0".into()));
        }

        let close_signal = signal_from_name(&section.signal)?;

        if let Some(credential) = &section.credential {
            if !credential.contains(':') {
                return Err(TtyError::Config(
                    "invalid credential, format: username:password".into(),
                ));
            }
        }

        let index_path = match section.index.as_deref() {
            Some(index) => {
                let path = expand_tilde(Path::new(index));
                let meta = std::fs::metadata(&path).map_err(|e| {
                    TtyError::Config(format!("cannot stat index {}: {e}", path.display()))
                })?;
                if meta.is_dir() {
                    return Err(TtyError::Config(format!(
                        "invalid index path {}: is a directory",
                        path.display()
                    )));
                }
                Some(path)
            }
            None => None,
        };

        Ok(Self {
            readonly: section.readonly,
            check_origin: section.check_origin,
            max_clients: section.max_clients,
            once: section.once,
            reconnect_secs: section.reconnect,
            close_signal,
            close_signal_name: signal_name(close_signal).to_string(),
            terminal_type: section.terminal_type,
            credential: section.credential,
            index_path,
            socket_path: section.socket_path.map(|s| expand_tilde(Path::new(&s))),
            log_capacity: section.log_capacity,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s.as_ref())
}
