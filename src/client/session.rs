//! Session multiplexer
//!
//! After the handshake, two reader tasks feed one ordered event queue:
//! one decodes frames from the socket, the other reads local stdin in
//! `STDIN_CHUNK_SIZE` chunks. The session loop owns the socket's write half
//! and the local output streams, and services events in queue order until
//! the server reports a `Status`.

use tokio::io::{
    AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stderr, Stdin,
    Stdout, WriteHalf,
};
use tokio::sync::mpsc;

use crate::common::{Error, Result};
use crate::protocol::frame::{self, Channel, Handshake, InboundFrame};
use crate::protocol::STDIN_CHUNK_SIZE;

use super::shutdown::ShutdownHandle;

/// Capacity of the event queue between the reader tasks and the session loop
const EVENT_QUEUE_DEPTH: usize = 32;

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, handshake not yet sent
    Handshake,
    /// Relaying frames in both directions
    Running,
    /// The server reported the command's exit status
    Terminated(i32),
}

/// Something one of the reader tasks observed
#[derive(Debug)]
enum Event {
    Frame(InboundFrame),
    Input(Vec<u8>),
    InputEof,
    /// The server closed the connection between frames
    Disconnected,
    Failed(Error),
}

/// Local streams the session relays to and from
pub struct LocalIo<I, O, E> {
    pub stdin: I,
    pub stdout: O,
    pub stderr: E,
}

impl LocalIo<Stdin, Stdout, Stderr> {
    /// The process's own standard streams
    pub fn stdio() -> Self {
        Self {
            stdin: tokio::io::stdin(),
            stdout: tokio::io::stdout(),
            stderr: tokio::io::stderr(),
        }
    }
}

/// One client session over an established connection
pub struct Session<S> {
    stream: S,
    shutdown: ShutdownHandle,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, shutdown: ShutdownHandle) -> Self {
        Self { stream, shutdown }
    }

    /// Run the session to completion and return the remote exit status
    ///
    /// The connection is shut down before this returns, whatever the outcome.
    pub async fn run<I, O, E>(self, handshake: &Handshake, io: LocalIo<I, O, E>) -> Result<i32>
    where
        I: AsyncRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let Session { stream, shutdown } = self;
        let LocalIo {
            stdin,
            stdout,
            stderr,
        } = io;

        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        let socket_task = tokio::spawn(read_socket(BufReader::new(reader), tx.clone()));
        let stdin_task = tokio::spawn(read_stdin(stdin, tx));

        let mut mux = Multiplexer {
            events: rx,
            writer,
            stdout,
            stderr,
            forwarding_input: true,
        };

        let result = tokio::select! {
            biased;
            _ = shutdown.closed() => Err(Error::Interrupted),
            result = mux.drive(handshake) => result,
        };

        stdin_task.abort();
        socket_task.abort();
        // Wait for the read half to be dropped so the socket really closes
        let _ = socket_task.await;
        if let Err(e) = mux.writer.shutdown().await {
            tracing::trace!("Error shutting down connection: {}", e);
        }

        match &result {
            Ok(status) => tracing::debug!(status, "Session finished"),
            Err(e) => tracing::debug!("Session failed: {}", e),
        }
        result
    }
}

/// Session loop state: the event queue plus everything it writes to
struct Multiplexer<S, O, E> {
    events: mpsc::Receiver<Event>,
    writer: WriteHalf<S>,
    stdout: O,
    stderr: E,
    /// Cleared when writing stdin to the server fails
    forwarding_input: bool,
}

impl<S, O, E> Multiplexer<S, O, E>
where
    S: AsyncWrite,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    async fn drive(&mut self, handshake: &Handshake) -> Result<i32> {
        let mut state = SessionState::Handshake;

        loop {
            state = match state {
                SessionState::Handshake => {
                    frame::write_frame(&mut self.writer, &handshake.encode()).await?;
                    tracing::debug!(args = handshake.args.len(), "Handshake sent");
                    SessionState::Running
                }
                SessionState::Running => {
                    let event = self.events.recv().await.ok_or(Error::ConnectionClosed)?;
                    self.handle(event).await?
                }
                SessionState::Terminated(status) => return Ok(status),
            };
        }
    }

    async fn handle(&mut self, event: Event) -> Result<SessionState> {
        match event {
            Event::Frame(InboundFrame::Status(status)) => {
                return Ok(SessionState::Terminated(status));
            }
            Event::Frame(InboundFrame::Output { channel, data }) => {
                self.write_output(channel, &data).await?;
            }
            Event::Input(data) => self.forward_input(&data).await,
            Event::InputEof => {
                tracing::trace!("stdin closed, sending end of input");
                self.forward_input(&[]).await;
            }
            Event::Disconnected => return Err(Error::ConnectionClosed),
            Event::Failed(e) => return Err(e),
        }
        Ok(SessionState::Running)
    }

    async fn write_output(&mut self, channel: Channel, data: &[u8]) -> Result<()> {
        tracing::trace!(?channel, len = data.len(), "Output frame");
        match channel {
            Channel::Stdout => {
                self.stdout.write_all(data).await?;
                self.stdout.flush().await?;
            }
            Channel::Stderr => {
                self.stderr.write_all(data).await?;
                self.stderr.flush().await?;
            }
            Channel::Other(name) => {
                tracing::trace!("Discarding {} bytes for unknown channel {:?}", data.len(), name);
            }
        }
        Ok(())
    }

    /// Send one stdin frame. A write failure only stops input forwarding:
    /// the server may already have sent its status, and if the connection
    /// is really gone the socket reader reports it.
    async fn forward_input(&mut self, data: &[u8]) {
        if !self.forwarding_input {
            return;
        }
        if let Err(e) = frame::write_frame(&mut self.writer, &frame::encode_input(data)).await {
            tracing::warn!("Failed to forward stdin, ignoring further input: {}", e);
            self.forwarding_input = false;
        }
    }
}

/// Decode frames from the server until a status, close or error
async fn read_socket<R: AsyncBufRead + Unpin>(mut reader: R, tx: mpsc::Sender<Event>) {
    loop {
        let (event, last) = match frame::read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                let last = matches!(frame, InboundFrame::Status(_));
                (Event::Frame(frame), last)
            }
            Ok(None) => (Event::Disconnected, true),
            Err(e) => (Event::Failed(e), true),
        };
        if tx.send(event).await.is_err() || last {
            return;
        }
    }
}

/// Read stdin in chunks until end of input, which is reported exactly once
async fn read_stdin<I: AsyncRead + Unpin>(mut stdin: I, tx: mpsc::Sender<Event>) {
    let mut buf = vec![0u8; STDIN_CHUNK_SIZE];
    loop {
        let (event, last) = match stdin.read(&mut buf).await {
            Ok(0) => (Event::InputEof, true),
            Ok(n) => (Event::Input(buf[..n].to_vec()), false),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => (Event::Failed(Error::Io(e)), true),
        };
        if tx.send(event).await.is_err() || last {
            return;
        }
    }
}
