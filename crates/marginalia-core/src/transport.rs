//! Host Channel Transport
//!
//! The single duplex connection to the host process. Messages are JSON
//! documents framed with a native-endian `u32` length prefix, the framing
//! browsers use for native messaging hosts. The transport has no knowledge
//! of correlation semantics and performs no buffering, retry, or
//! reconnection.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{RelayError, Result};
use crate::protocol::{Request, Response};

/// Largest inbound frame accepted, matching the browser's limit on
/// host-to-extension messages.
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Duplex byte channel to the host process.
///
/// Generic over the reader and writer halves so tests can run it over
/// in-memory pipes; the CLI hands it the host child's stdout and stdin.
/// [`HostChannel::split`] separates the halves so reading and writing can
/// proceed on independent tasks.
pub struct HostChannel<R, W> {
    reader: HostReader<R>,
    writer: HostWriter<W>,
}

impl<R, W> HostChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        HostChannel {
            reader: HostReader { reader },
            writer: HostWriter { writer },
        }
    }

    /// Separate the receive and send halves.
    pub fn split(self) -> (HostReader<R>, HostWriter<W>) {
        (self.reader, self.writer)
    }

    /// Write one framed request to the host. See [`HostWriter::send`].
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        self.writer.send(request).await
    }

    /// Read the next framed response from the host. See
    /// [`HostReader::recv`].
    pub async fn recv(&mut self) -> Result<Option<Response>> {
        self.reader.recv().await
    }
}

/// Receive half of the host channel.
pub struct HostReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> HostReader<R> {
    /// Read the next framed response from the host.
    ///
    /// Returns `Ok(None)` when the host closes the channel at a frame
    /// boundary. EOF in the middle of a frame is an IO error.
    ///
    /// Not cancellation-safe: dropping the returned future mid-frame
    /// loses the bytes already consumed and desyncs the stream. Callers
    /// must drive one `recv` to completion at a time on a dedicated task
    /// rather than racing it inside `select!`.
    pub async fn recv(&mut self) -> Result<Option<Response>> {
        let mut length_bytes = [0u8; 4];
        match self.reader.read_exact(&mut length_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let length = u32::from_ne_bytes(length_bytes) as usize;
        if length > MAX_MESSAGE_LEN {
            return Err(RelayError::OversizedMessage(length));
        }
        let mut frame = vec![0u8; length];
        self.reader.read_exact(&mut frame).await?;
        trace!(length, "received frame from host");
        let response = serde_json::from_slice(&frame)?;
        Ok(Some(response))
    }
}

/// Send half of the host channel.
pub struct HostWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> HostWriter<W> {
    /// Write one framed request to the host.
    ///
    /// Fails when the channel is disconnected; the caller decides what to
    /// do with the unsent exchange.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let bytes = serde_json::to_vec(request)?;
        let length = u32::try_from(bytes.len())
            .map_err(|_| RelayError::OversizedMessage(bytes.len()))?;
        self.writer.write_all(&length.to_ne_bytes()).await?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        trace!(length, "sent frame to host");
        Ok(())
    }
}
