//! Protocol frames
//!
//! Daemon to client:
//! ```text
//! Channel: o|e\n          Status: <int>\n
//! Size: <n>\n             \n
//! \n
//! <n bytes>
//! ```
//! Client to daemon: one handshake block, then `Size: <n>\n\n<n bytes>`
//! frames carrying stdin. `Size: 0` marks the end of stdin.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::{Error, Result};

use super::header::{self, HeaderBlock, HeaderName};

/// Upper bound on a single frame body (64 MiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Output stream a daemon data frame belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
    /// Unknown channel; its data is dropped
    Other(String),
}

impl Channel {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "o" => Channel::Stdout,
            "e" => Channel::Stderr,
            other => Channel::Other(other.to_string()),
        }
    }
}

/// A frame received from the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Output of the remote command
    Output { channel: Channel, data: Vec<u8> },
    /// The remote command finished with this exit status
    Status(i32),
}

/// What a header block announces, before any body is read
#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameHead {
    Status(i32),
    Data { channel: Channel, size: usize },
}

impl FrameHead {
    fn from_block(block: &HeaderBlock) -> Result<Self> {
        if let Some(status) = block.header(HeaderName::Status) {
            let code = status
                .trim()
                .parse()
                .map_err(|_| Error::malformed_frame(format!("invalid Status: {}", status)))?;
            return Ok(FrameHead::Status(code));
        }

        let size = block
            .header(HeaderName::Size)
            .ok_or_else(|| Error::malformed_frame("missing Size header"))?;
        let size: usize = size
            .trim()
            .parse()
            .map_err(|_| Error::malformed_frame(format!("invalid Size: {}", size)))?;
        if size > MAX_FRAME_SIZE {
            return Err(Error::malformed_frame(format!(
                "Size too large: {} bytes",
                size
            )));
        }

        let channel = block
            .header(HeaderName::Channel)
            .map(Channel::from_wire)
            .ok_or_else(|| Error::malformed_frame("missing Channel header"))?;

        Ok(FrameHead::Data { channel, size })
    }
}

/// Read the next frame from the daemon
///
/// Returns `Ok(None)` if the connection ends before a complete header block.
/// A connection that ends inside a body is an error.
pub async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<InboundFrame>> {
    let Some(block) = header::read_block(reader).await? else {
        return Ok(None);
    };

    match FrameHead::from_block(&block)? {
        FrameHead::Status(code) => Ok(Some(InboundFrame::Status(code))),
        FrameHead::Data { channel, size } => {
            let mut data = vec![0u8; size];
            reader.read_exact(&mut data).await.map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    Error::TruncatedFrame { expected: size }
                } else {
                    Error::Io(e)
                }
            })?;
            Ok(Some(InboundFrame::Output { channel, data }))
        }
    }
}

/// The opening block sent right after connecting
///
/// Paths and arguments keep their OS form until encoding, where anything that
/// is not valid UTF-8 is replaced lossily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub cwd: PathBuf,
    pub args: Vec<OsString>,
    pub cookie: String,
}

impl Handshake {
    pub fn new(cwd: PathBuf, args: Vec<OsString>, cookie: &str) -> Self {
        // The cookie file usually ends with a newline, which must not
        // terminate the block early.
        let cookie = cookie.trim_end_matches(['\r', '\n']).to_string();
        Self { cwd, args, cookie }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        header::write_header(&mut buf, HeaderName::Cwd, &self.cwd.to_string_lossy());
        for arg in &self.args {
            header::write_header(&mut buf, HeaderName::Arg, &arg.to_string_lossy());
        }
        header::write_header(&mut buf, HeaderName::Cookie, &self.cookie);
        header::end_block(&mut buf);
        buf
    }
}

/// Encode a stdin data frame; an empty slice encodes end-of-input
pub fn encode_input(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 16);
    header::write_header(&mut buf, HeaderName::Size, &data.len().to_string());
    header::end_block(&mut buf);
    buf.extend_from_slice(data);
    buf
}

/// Write pre-encoded bytes and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
