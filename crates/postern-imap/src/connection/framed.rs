//! Line framing with inline literals, under transport timeouts.
//!
//! A response is one CRLF-terminated line, extended by every `{n}` literal it
//! announces. Any failure while reading or writing poisons the stream: the
//! server may be mid-response, so nothing further can be trusted.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::time::Duration;

use postern_transport::Timeouts;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

const READ_BUFFER: usize = 16 * 1024;

/// Longest accepted line, literals excluded.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Largest accepted literal.
pub const MAX_LITERAL_SIZE: usize = 64 * 1024 * 1024;

/// Buffered IMAP stream.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    timeouts: Timeouts,
    poisoned: bool,
}

impl<S> std::fmt::Debug for FramedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedStream")
            .field("timeouts", &self.timeouts)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S, timeouts: Timeouts) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER, stream),
            timeouts,
            poisoned: false,
        }
    }

    /// Timeouts in effect.
    pub const fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// True once a read or write has failed.
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Marks the stream unusable.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    fn ensure_healthy(&self) -> Result<()> {
        if self.poisoned {
            Err(Error::ConnectionPoisoned)
        } else {
            Ok(())
        }
    }

    /// Reads one complete response under the read timeout.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        self.ensure_healthy()?;
        let budget = self.timeouts.read;
        match tokio::time::timeout(budget, read_framed(&mut self.reader)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                self.poisoned = true;
                Err(e)
            }
            Err(_) => {
                self.poisoned = true;
                Err(postern_transport::Error::Timeout {
                    operation: "IMAP read",
                    after: budget,
                }
                .into())
            }
        }
    }

    /// Waits up to `budget` for the server to send anything, then reads the
    /// response under the normal read timeout.
    ///
    /// Returns `Ok(None)` if the server stayed silent. Used by IDLE, where
    /// silence is expected and must not poison the stream.
    pub async fn wait_for_response(&mut self, budget: Duration) -> Result<Option<Vec<u8>>> {
        self.ensure_healthy()?;
        // fill_buf is cancel-safe, so timing it out loses nothing.
        match tokio::time::timeout(budget, self.reader.fill_buf()).await {
            Err(_) => return Ok(None),
            Ok(Err(e)) => {
                self.poisoned = true;
                return Err(e.into());
            }
            Ok(Ok(_)) => {}
        }
        self.read_response().await.map(Some)
    }

    /// Writes and flushes `data` under the write timeout.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_healthy()?;
        let budget = self.timeouts.write;
        let stream = self.reader.get_mut();
        let write = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        match tokio::time::timeout(budget, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.poisoned = true;
                Err(e.into())
            }
            Err(_) => {
                self.poisoned = true;
                Err(postern_transport::Error::Timeout {
                    operation: "IMAP write",
                    after: budget,
                }
                .into())
            }
        }
    }

    /// Unwraps the stream for a TLS upgrade.
    ///
    /// Bytes the server sent ahead of the handshake are dropped with the
    /// buffer.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

async fn read_framed<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut response = Vec::new();
    loop {
        let line_start = response.len();
        read_line(reader, &mut response).await?;

        let Some(size) = literal_size(&response[line_start..]) else {
            return Ok(response);
        };
        if size > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!(
                "literal of {size} bytes exceeds {MAX_LITERAL_SIZE}"
            )));
        }
        let start = response.len();
        response.resize(start + size, 0);
        reader.read_exact(&mut response[start..]).await?;
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, out: &mut Vec<u8>) -> Result<()> {
    let start = out.len();
    let limit = (MAX_LINE_LENGTH + 1) as u64;
    let read = (&mut *reader).take(limit).read_until(b'\n', out).await?;

    if read == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed").into());
    }
    if out.last() != Some(&b'\n') {
        if out.len() - start > MAX_LINE_LENGTH {
            return Err(Error::Protocol(format!(
                "line exceeds {MAX_LINE_LENGTH} bytes"
            )));
        }
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-line").into());
    }
    Ok(())
}

/// Size announced by a trailing `{n}` or `{n+}`.
fn literal_size(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\n")?;
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = &inner[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    #[test]
    fn test_literal_size() {
        assert_eq!(literal_size(b"* 1 FETCH (BODY[] {42}\r\n"), Some(42));
        assert_eq!(literal_size(b"A1 APPEND x {7+}\r\n"), Some(7));
        assert_eq!(literal_size(b"* OK {not}\r\n"), None);
        assert_eq!(literal_size(b"* OK done\r\n"), None);
        assert_eq!(literal_size(b"{}\r\n"), None);
    }

    #[tokio::test]
    async fn test_reads_literal_split_across_packets() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (UID 5 BODY[] {11}\r\nHello")
            .read(b" world)\r\n")
            .build();
        let mut framed = FramedStream::new(mock, Timeouts::default());
        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (UID 5 BODY[] {11}\r\nHello world)\r\n");
    }

    #[tokio::test]
    async fn test_oversized_literal_poisons() {
        let header = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock, Timeouts::default());

        assert!(matches!(framed.read_response().await, Err(Error::Protocol(_))));
        assert!(framed.is_poisoned());
        assert!(matches!(
            framed.read_response().await,
            Err(Error::ConnectionPoisoned)
        ));
    }

    #[tokio::test]
    async fn test_line_limit() {
        let long = vec![b'x'; MAX_LINE_LENGTH + 10];
        let mock = Builder::new().read(&long).build();
        let mut framed = FramedStream::new(mock, Timeouts::default());
        assert!(matches!(framed.read_response().await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_eof_is_transport_error() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock, Timeouts::default());
        let err = framed.read_response().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_poisons() {
        let (client, _server) = tokio::io::duplex(64);
        let timeouts = Timeouts {
            read: Duration::from_secs(5),
            ..Timeouts::default()
        };
        let mut framed = FramedStream::new(client, timeouts);

        let err = framed.read_response().await.unwrap_err();
        assert!(matches!(err, Error::Transport(ref t) if t.is_timeout()));
        assert!(framed.is_poisoned());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_wait_silence_does_not_poison() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut framed = FramedStream::new(client, Timeouts::default());

        let waited = framed.wait_for_response(Duration::from_secs(30)).await.unwrap();
        assert!(waited.is_none());
        assert!(!framed.is_poisoned());

        server.write_all(b"* 4 EXISTS\r\n").await.unwrap();
        let got = framed.wait_for_response(Duration::from_secs(30)).await.unwrap();
        assert_eq!(got.unwrap(), b"* 4 EXISTS\r\n");
    }

    #[tokio::test]
    async fn test_write_goes_out_verbatim() {
        let mock = Builder::new().write(b"A0001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock, Timeouts::default());
        framed.write_all(b"A0001 NOOP\r\n").await.unwrap();
    }
}
