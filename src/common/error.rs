//! Error types for the groovyserver client
//!
//! Every variant ends the session with exit code 1. Messages are meant to be
//! read by a person at a terminal, with a hint where one helps.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the client
#[derive(Error, Debug)]
pub enum Error {
    // === Daemon/Connection Errors ===
    #[error("groovyserver failed to start: connection still refused after {attempts} attempts. Check the server log")]
    DaemonStartFailed { attempts: u32 },

    #[error("Failed to connect to groovyserver: {0}")]
    ConnectionFailed(#[source] io::Error),

    #[error("Failed to launch groovyserver: {0}")]
    DaemonLaunchFailed(String),

    #[error("groovyserver command not found. Searched: {0}")]
    ServerCommandNotFound(String),

    // === Protocol Errors ===
    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Connection closed while reading a {expected} byte frame body")]
    TruncatedFrame { expected: usize },

    #[error("groovyserver closed the connection without reporting an exit status")]
    ConnectionClosed,

    // === Session Errors ===
    #[error("Failed to read cookie file '{path}': {error}. Is groovyserver running?")]
    CookieRead { path: String, error: String },

    #[error("Interrupted")]
    Interrupted,

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a malformed frame error
    pub fn malformed_frame<S: Into<String>>(reason: S) -> Self {
        Self::MalformedFrame(reason.into())
    }

    /// Create a server-command-not-found error listing the searched locations
    pub fn server_command_not_found<S: AsRef<str>>(searched: &[S]) -> Self {
        Self::ServerCommandNotFound(
            searched
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// Whether this error came from the user interrupting the client
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
