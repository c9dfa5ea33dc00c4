//! Client side: connect to groovyserver and relay one command
//!
//! Flow: load config, install the interrupt handler, connect (launching the
//! server if needed), read the cookie, run the session.

pub mod connector;
pub mod launcher;
pub mod session;
pub mod shutdown;

use std::ffi::OsString;
use std::path::Path;

use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::protocol::Handshake;

pub use launcher::{DaemonLauncher, ProcessLauncher};
pub use session::{LocalIo, Session, SessionState};
pub use shutdown::ShutdownHandle;

/// Run `args` on the server and return the exit status it reports
pub async fn run(args: Vec<OsString>) -> Result<i32> {
    let config = Config::load()?;
    let shutdown = ShutdownHandle::new();
    let interrupt = shutdown.close_on_interrupt();

    let result = run_with(&config, args, &shutdown).await;
    interrupt.abort();
    result
}

async fn run_with(config: &Config, args: Vec<OsString>, shutdown: &ShutdownHandle) -> Result<i32> {
    let cwd = std::env::current_dir()?;
    let launcher = ProcessLauncher::from_config(&config.launcher)?;

    let stream = connector::connect(
        &config.server.host,
        config.server.port,
        config.retry_policy(),
        &launcher,
        shutdown,
    )
    .await?;

    // The server writes the cookie when it starts, so read it only now
    let cookie_path = paths::cookie_path()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
    let cookie = read_cookie(&cookie_path)?;

    let handshake = Handshake::new(cwd, args, &cookie);
    Session::new(stream, shutdown.clone())
        .run(&handshake, LocalIo::stdio())
        .await
}

/// Read the authentication cookie file in full
pub fn read_cookie(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::CookieRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}
