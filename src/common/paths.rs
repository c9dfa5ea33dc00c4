//! Local state and configuration paths
//!
//! groovyserver keeps its state under `~/.groovy/groovyserver`:
//! - `key`: the authentication cookie written by the server on startup
//! - `groovyserver.log`: server output appended by the launcher
//!
//! `GROOVYSERV_WORK_DIR` overrides the state directory.

use std::io;
use std::path::{Path, PathBuf};

/// Name used for the client's own configuration directory
const APP_NAME: &str = "groovyclient";

/// Environment variable overriding the server work directory
pub const WORK_DIR_ENV: &str = "GROOVYSERV_WORK_DIR";

/// Get the groovy home directory (`~/.groovy`)
pub fn groovy_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".groovy"))
}

/// Get the groovyserver work directory
///
/// Uses `$GROOVYSERV_WORK_DIR` when set, otherwise `~/.groovy/groovyserver`.
pub fn work_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(WORK_DIR_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    groovy_home().map(|home| home.join("groovyserver"))
}

/// Get the path to the authentication cookie file
pub fn cookie_path() -> Option<PathBuf> {
    work_dir().map(|dir| dir.join("key"))
}

/// Ensure a state directory exists
///
/// On Unix, a newly created `dir` gets mode 0700 since it holds the cookie.
/// Only the leaf is restricted. Missing parents such as `~/.groovy` are
/// created with the process umask.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/groovyclient/`
/// - macOS: `~/Library/Application Support/groovyclient/`
/// - Windows: `%APPDATA%\groovyclient\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
