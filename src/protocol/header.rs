//! Header block codec
//!
//! Every frame of the groovyserver protocol starts with a header block:
//! ```text
//! Name: value\n
//! Name: value\n
//! \n
//! ```
//! Names are case-sensitive ASCII letter tokens. Values run to the end of
//! the line and are not escaped, so they can never contain a newline.

use std::collections::HashMap;
use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::common::{Error, Result};

/// Header names used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderName {
    /// Client working directory (handshake)
    Cwd,
    /// One command-line argument (handshake, repeated in order)
    Arg,
    /// Authentication cookie (handshake)
    Cookie,
    /// Body length of a data frame
    Size,
    /// Exit status of the remote command
    Status,
    /// Output stream of a daemon data frame (`o` or `e`)
    Channel,
}

impl HeaderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderName::Cwd => "Cwd",
            HeaderName::Arg => "Arg",
            HeaderName::Cookie => "Cookie",
            HeaderName::Size => "Size",
            HeaderName::Status => "Status",
            HeaderName::Channel => "Channel",
        }
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded header block
///
/// Later occurrences of a name overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    entries: HashMap<String, String>,
}

impl HeaderBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Look up one of the known protocol headers
    pub fn header(&self, name: HeaderName) -> Option<&str> {
        self.get(name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split one header line (without its newline) into name and value
pub fn parse_line(line: &str) -> Result<(&str, &str)> {
    match line.split_once(": ") {
        Some((name, value))
            if !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphabetic()) =>
        {
            Ok((name, value))
        }
        _ => Err(Error::MalformedHeader(line.to_string())),
    }
}

/// Read one header block from the stream
///
/// Returns `Ok(None)` when the stream ends before the terminating blank
/// line; callers treat that as the peer going away.
pub async fn read_block<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<HeaderBlock>> {
    let mut block = HeaderBlock::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        let bytes_read = reader.read_until(b'\n', &mut line).await?;

        // EOF, possibly in the middle of a line
        if bytes_read == 0 || line.last() != Some(&b'\n') {
            if !block.is_empty() || !line.is_empty() {
                tracing::debug!("Connection closed inside a header block");
            }
            return Ok(None);
        }

        line.pop();
        if line.is_empty() {
            return Ok(Some(block));
        }

        let (name, value) = parse_line(line_str(&line)?)?;
        block.insert(name, value);
    }
}

/// Append a `Name: value` line
pub fn write_header(buf: &mut Vec<u8>, name: HeaderName, value: &str) {
    push_line(buf, name.as_str(), value);
}

/// Append the blank line that terminates a block
pub fn end_block(buf: &mut Vec<u8>) {
    buf.push(b'\n');
}

fn push_line(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.push(b'\n');
}

fn line_str(line: &[u8]) -> Result<&str> {
    std::str::from_utf8(line)
        .map_err(|_| Error::MalformedHeader(String::from_utf8_lossy(line).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, BufReader};

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("Size: 12").unwrap(), ("Size", "12"));
        assert_eq!(parse_line("Arg: ").unwrap(), ("Arg", ""));
        assert_eq!(parse_line("Arg: a: b ").unwrap(), ("Arg", "a: b "));
    }

    #[test]
    fn test_parse_line_rejects_bad_names() {
        assert!(parse_line("no separator").is_err());
        assert!(parse_line(": value").is_err());
        assert!(parse_line("Content-Length: 3").is_err());
        assert!(parse_line("Size:3").is_err());
    }

    #[tokio::test]
    async fn test_read_block() {
        let data = b"Channel: o\nSize: 5\n\nhello";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        let block = read_block(&mut reader).await.unwrap().unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block.header(HeaderName::Channel), Some("o"));
        assert_eq!(block.header(HeaderName::Size), Some("5"));
    }

    #[tokio::test]
    async fn test_read_block_duplicate_overwrites() {
        let data = b"Size: 1\nSize: 2\n\n";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        let block = read_block(&mut reader).await.unwrap().unwrap();
        assert_eq!(block.get("Size"), Some("2"));
    }

    #[tokio::test]
    async fn test_read_block_eof() {
        let mut empty = BufReader::new(Cursor::new(Vec::new()));
        assert!(read_block(&mut empty).await.unwrap().is_none());

        let mut partial = BufReader::new(Cursor::new(b"Status: 0\n".to_vec()));
        assert!(read_block(&mut partial).await.unwrap().is_none());

        let mut mid_line = BufReader::new(Cursor::new(b"Stat".to_vec()));
        assert!(read_block(&mut mid_line).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_block_malformed_line() {
        let mut reader = BufReader::new(Cursor::new(b"garbage\n\n".to_vec()));
        let err = read_block(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(line) if line == "garbage"));
    }

    #[tokio::test]
    async fn test_read_block_leaves_body_unread() {
        let mut reader = BufReader::new(Cursor::new(b"Size: 3\n\nabc".to_vec()));

        let block = read_block(&mut reader).await.unwrap().unwrap();
        assert_eq!(block.get("Size"), Some("3"));

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"abc");
    }

    #[tokio::test]
    async fn test_read_block_is_idempotent() {
        let data = b"Channel: e\nSize: 3\n\n";
        let first = read_block(&mut BufReader::new(Cursor::new(data.to_vec())))
            .await
            .unwrap();
        let second = read_block(&mut BufReader::new(Cursor::new(data.to_vec())))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_write_then_read_block() {
        let mut buf = Vec::new();
        write_header(&mut buf, HeaderName::Cwd, "/home/user/project dir");
        write_header(&mut buf, HeaderName::Cookie, "s3cr3t: token");
        write_header(&mut buf, HeaderName::Arg, "");
        end_block(&mut buf);
        assert_eq!(
            buf,
            b"Cwd: /home/user/project dir\nCookie: s3cr3t: token\nArg: \n\n".to_vec()
        );

        let mut reader = BufReader::new(Cursor::new(buf));
        let block = read_block(&mut reader).await.unwrap().unwrap();
        assert_eq!(block.len(), 3);
        assert_eq!(block.header(HeaderName::Cwd), Some("/home/user/project dir"));
        assert_eq!(block.header(HeaderName::Cookie), Some("s3cr3t: token"));
        assert_eq!(block.header(HeaderName::Arg), Some(""));
        assert!(read_block(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_block() {
        let mut buf = Vec::new();
        end_block(&mut buf);
        assert_eq!(buf, b"\n".to_vec());

        let mut reader = BufReader::new(Cursor::new(buf));
        let block = read_block(&mut reader).await.unwrap().unwrap();
        assert!(block.is_empty());
    }
}
