//! Configuration file handling

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Environment variable overriding `server.host`
pub const HOST_ENV: &str = "GROOVYSERVER_HOST";

/// Environment variable overriding `server.port`
pub const PORT_ENV: &str = "GROOVYSERVER_PORT";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Where the groovyserver listens
    #[serde(default)]
    pub server: ServerConfig,

    /// Connect retry settings
    #[serde(default)]
    pub connect: ConnectConfig,

    /// How to start the server when it is not running
    #[serde(default)]
    pub launcher: LauncherConfig,
}

/// Server address
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    crate::protocol::DEFAULT_PORT
}

/// Connect retry settings
#[derive(Debug, Deserialize)]
pub struct ConnectConfig {
    /// Give up after this many refused connection attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, doubled on each further retry
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the retry delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}
fn default_initial_backoff() -> u64 {
    100
}
fn default_max_backoff() -> u64 {
    2000
}

/// Server launcher settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct LauncherConfig {
    /// Server start command. Defaults to `groovyserver` next to this binary,
    /// then `groovyserver` on PATH.
    pub command: Option<PathBuf>,

    /// Extra arguments passed to the start command
    #[serde(default)]
    pub args: Vec<String>,
}

/// Bounded exponential backoff used by the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay to wait before connect attempt number `attempt` (1-based).
    /// The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist. Environment
    /// overrides are applied on top.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read '{}': {}", path.display(), e))
                })?;
                Self::from_toml(&content)?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Apply `GROOVYSERVER_HOST` / `GROOVYSERVER_PORT` overrides
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOST_ENV).filter(|h| !h.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup(PORT_ENV).filter(|p| !p.is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid {}: {}", PORT_ENV, port)))?;
        }
        Ok(())
    }

    /// Retry policy for the connector
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.connect.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.connect.max_backoff_ms),
        }
    }
}
