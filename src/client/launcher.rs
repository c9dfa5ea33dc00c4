//! groovyserver launching
//!
//! When the server refuses connections, the client runs the `groovyserver`
//! start script and waits for it to return. The script is responsible for
//! starting the server in the background and for doing nothing when one is
//! already starting.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;

use crate::common::config::LauncherConfig;
use crate::common::{paths, Error, Result};

/// Name of the server start command
const SERVER_COMMAND: &str = "groovyserver";

/// Starts the daemon when the connector finds nothing listening
///
/// Implementations must be idempotent: the connector may call this again
/// while a previous launch is still coming up. An error stops connecting, so
/// it is reserved for launches that could not run at all.
#[async_trait]
pub trait DaemonLauncher: Send + Sync {
    async fn ensure_daemon_running(&self) -> Result<()>;
}

/// Launcher that runs the `groovyserver` start command
pub struct ProcessLauncher {
    config: LauncherConfig,
    work_dir: PathBuf,
}

impl ProcessLauncher {
    pub fn new(config: LauncherConfig, work_dir: PathBuf) -> Self {
        Self { config, work_dir }
    }

    /// Launcher using the default work directory
    pub fn from_config(config: &LauncherConfig) -> Result<Self> {
        let work_dir = paths::work_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
        Ok(Self::new(config.clone(), work_dir))
    }

    pub fn log_path(&self) -> PathBuf {
        self.work_dir.join("groovyserver.log")
    }

    /// Find the server start command
    ///
    /// Order: configured command, `groovyserver` next to this executable,
    /// `groovyserver` on PATH.
    pub fn resolve_command(&self) -> Result<PathBuf> {
        if let Some(command) = &self.config.command {
            return Ok(command.clone());
        }

        let mut searched = Vec::new();
        let file_name = format!("{}{}", SERVER_COMMAND, std::env::consts::EXE_SUFFIX);

        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        {
            let sibling = dir.join(&file_name);
            if sibling.is_file() {
                return Ok(sibling);
            }
            searched.push(sibling.display().to_string());
        }

        which::which(SERVER_COMMAND).map_err(|_| {
            searched.push("PATH".to_string());
            Error::server_command_not_found(&searched)
        })
    }
}

#[async_trait]
impl DaemonLauncher for ProcessLauncher {
    async fn ensure_daemon_running(&self) -> Result<()> {
        paths::ensure_private_dir(&self.work_dir)?;

        let command = self.resolve_command()?;
        let log_path = self.log_path();
        tracing::info!("Starting server...");
        tracing::debug!(command = %command.display(), log = %log_path.display(), "Launching groovyserver");

        // Server output goes to its log, never to the client's terminal
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                Error::DaemonLaunchFailed(format!(
                    "Failed to open log file '{}': {}",
                    log_path.display(),
                    e
                ))
            })?;
        let log_err = log.try_clone()?;

        let mut cmd = tokio::process::Command::new(&command);
        cmd.args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        // Keep Ctrl-C in the client's terminal away from the server
        #[cfg(unix)]
        cmd.process_group(0);

        let status = cmd.status().await.map_err(|e| {
            Error::DaemonLaunchFailed(format!("{}: {}", command.display(), e))
        })?;

        // Exit status is advisory. The connect retry decides whether the
        // server came up.
        if status.success() {
            tracing::debug!("groovyserver start command finished");
        } else {
            tracing::warn!(
                "{} exited with {}. See {}",
                command.display(),
                status,
                log_path.display()
            );
        }
        Ok(())
    }
}
