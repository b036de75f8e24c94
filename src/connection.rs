//! Length-prefixed message framing over the local control socket.
//!
//! Every message on the wire is a 4-byte big-endian length header followed
//! by that many bytes of UTF-8 payload. A zero-length message is the
//! protocol terminator: the responder sends it immediately before closing
//! so the requester's receive loop ends cleanly instead of on a bare
//! stream closure.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

pub struct Connection {
    stream: UnixStream,
}

impl Connection {
    pub fn new(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Writes one framed message: length header, then the payload.
    pub async fn send_message(&mut self, message: &str) -> io::Result<()> {
        let payload = message.as_bytes();
        let length = payload.len() as u32;

        self.stream.write_all(&length.to_be_bytes()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }

    /// Reads one framed message.
    ///
    /// Returns `None` when the stream ends before a complete header or
    /// body is available; a zero-length message decodes to `Some("")`.
    pub async fn receive_message(&mut self) -> io::Result<Option<String>> {
        let mut header = [0u8; 4];
        if !self.read_full(&mut header).await? {
            return Ok(None);
        }

        let length = u32::from_be_bytes(header) as usize;
        let mut payload = vec![0u8; length];
        if !self.read_full(&mut payload).await? {
            return Ok(None);
        }

        let message = String::from_utf8(payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(message))
    }

    /// Requester-side close.
    pub async fn close(mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    /// Responder-side close: sends the zero-length terminator first.
    pub async fn finish(mut self) -> io::Result<()> {
        self.send_message("").await?;
        self.stream.shutdown().await
    }

    /// Reads until `buf` is full, retrying short reads. Returns `false`
    /// when the stream ends first.
    async fn read_full(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Ok(false);
            }
            filled += n;
        }
        Ok(true)
    }
}
