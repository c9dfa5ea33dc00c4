//! groovyserver wire protocol
//!
//! Line-oriented `Name: value` header blocks, optionally followed by a raw
//! body whose length is given by `Size`.

pub mod frame;
pub mod header;

pub use frame::{Channel, Handshake, InboundFrame};
pub use header::{HeaderBlock, HeaderName};

/// Port groovyserver listens on by default
pub const DEFAULT_PORT: u16 = 1961;

/// Maximum number of stdin bytes forwarded per frame
pub const STDIN_CHUNK_SIZE: usize = 512;
