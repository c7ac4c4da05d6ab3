//! Line I/O for POP3 under transport timeouts.
//!
//! Any failed or timed-out read or write poisons the stream.

#![allow(clippy::missing_errors_doc)]

use postern_transport::Timeouts;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::parser::unstuff;
use crate::{Error, Result};

/// Longest accepted line.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Buffered POP3 stream.
pub struct Pop3Stream<S> {
    reader: BufReader<S>,
    timeouts: Timeouts,
    poisoned: bool,
}

impl<S> std::fmt::Debug for Pop3Stream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pop3Stream")
            .field("timeouts", &self.timeouts)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl<S> Pop3Stream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S, timeouts: Timeouts) -> Self {
        Self {
            reader: BufReader::new(stream),
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

    /// Reads one line under the read timeout, CRLF stripped.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        if self.poisoned {
            return Err(Error::ConnectionPoisoned);
        }
        let budget = self.timeouts.read;
        match tokio::time::timeout(budget, read_raw_line(&mut self.reader)).await {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => {
                self.poisoned = true;
                Err(e)
            }
            Err(_) => {
                self.poisoned = true;
                Err(postern_transport::Error::Timeout {
                    operation: "POP3 read",
                    after: budget,
                }
                .into())
            }
        }
    }

    /// Reads one status line as text.
    ///
    /// Invalid UTF-8 in the server text is replaced, not rejected.
    pub async fn read_text_line(&mut self) -> Result<String> {
        let line = self.read_line().await?;
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Reads the body of a multi-line reply up to the lone `.`.
    ///
    /// Lines are unstuffed and rejoined with CRLF.
    pub async fn read_multiline(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            let line = self.read_line().await?;
            let Some(content) = unstuff(&line) else {
                return Ok(body);
            };
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
    }

    /// Reads a multi-line reply as text lines.
    pub async fn read_multiline_text(&mut self) -> Result<Vec<String>> {
        let body = self.read_multiline().await?;
        let text = String::from_utf8(body).map_err(|_| {
            self.poisoned = true;
            Error::Protocol("listing is not UTF-8".into())
        })?;
        Ok(text.lines().map(str::to_string).collect())
    }

    /// Writes `line` plus CRLF and flushes, under the write timeout.
    pub async fn write_line(&mut self, line: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(Error::ConnectionPoisoned);
        }
        let budget = self.timeouts.write;
        let stream = self.reader.get_mut();
        let write = async {
            stream.write_all(line).await?;
            if !line.ends_with(b"\r\n") {
                stream.write_all(b"\r\n").await?;
            }
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
                    operation: "POP3 write",
                    after: budget,
                }
                .into())
            }
        }
    }

    /// Unwraps the stream for a TLS upgrade.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

async fn read_raw_line<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => {
                line.extend_from_slice(&available[..i]);
                (i + 1, true)
            }
            None => {
                line.extend_from_slice(available);
                (available.len(), false)
            }
        };
        reader.consume(used);
        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::Protocol("line too long".into()));
        }
        if done {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(line);
        }
    }
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
    use super::*;

    #[tokio::test]
    async fn test_read_multiline_unstuffs() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Subject: hi\r\n\r\n..dot\r\nend\r\n.\r\n")
            .build();
        let mut stream = Pop3Stream::new(mock, Timeouts::default());
        let body = stream.read_multiline().await.unwrap();
        assert_eq!(body, b"Subject: hi\r\n\r\n.dot\r\nend\r\n");
    }

    #[tokio::test]
    async fn test_eof_poisons() {
        let mock = tokio_test::io::Builder::new().read(b"+OK partial").build();
        let mut stream = Pop3Stream::new(mock, Timeouts::default());
        assert!(stream.read_line().await.is_err());
        assert!(stream.is_poisoned());
        assert!(matches!(
            stream.write_line(b"NOOP").await,
            Err(Error::ConnectionPoisoned)
        ));
    }

    #[tokio::test]
    async fn test_non_utf8_status_text_is_kept() {
        let mock = tokio_test::io::Builder::new()
            .read(b"-ERR Kennwort ung\xfcltig\r\n+OK\r\n")
            .build();
        let mut stream = Pop3Stream::new(mock, Timeouts::default());
        let line = stream.read_text_line().await.unwrap();
        assert_eq!(line, "-ERR Kennwort ung\u{fffd}ltig");
        assert!(!stream.is_poisoned());
        assert_eq!(stream.read_text_line().await.unwrap(), "+OK");
    }

    #[tokio::test]
    async fn test_write_line_appends_crlf() {
        let mock = tokio_test::io::Builder::new().write(b"NOOP\r\n").build();
        let mut stream = Pop3Stream::new(mock, Timeouts::default());
        stream.write_line(b"NOOP").await.unwrap();
    }
}
