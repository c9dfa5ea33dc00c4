//! groovyclient - run commands through a local groovyserver
//!
//! The client forwards its arguments, working directory and cookie to the
//! server, relays stdin and the command's stdout/stderr, and exits with the
//! status the server reports.

pub mod client;
pub mod common;
pub mod protocol;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use protocol::{Channel, Handshake, HeaderBlock, HeaderName, InboundFrame};
