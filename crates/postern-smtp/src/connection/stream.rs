//! Low-level SMTP stream handling.
//!
//! Every read and write runs under the transport timeouts. A failure or an
//! expired budget poisons the stream.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use postern_transport::Timeouts;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::Reply;

/// Longest accepted reply line (RFC 5321 allows 512; servers exceed it).
const MAX_LINE_LENGTH: u64 = 8 * 1024;

/// Largest single write of DATA content.
const DATA_CHUNK: usize = 64 * 1024;

/// Buffered SMTP stream.
pub struct SmtpStream<S> {
    reader: BufReader<S>,
    timeouts: Timeouts,
    poisoned: bool,
}

impl<S> std::fmt::Debug for SmtpStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpStream")
            .field("timeouts", &self.timeouts)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl<S> SmtpStream<S>
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

    /// Reads a complete, possibly multi-line, reply.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            let last = is_last_reply_line(&line);
            lines.push(line);
            if last {
                break;
            }
        }
        parse_reply(&lines).inspect_err(|_| self.poisoned = true)
    }

    /// Reads a line from the stream, CRLF stripped.
    pub async fn read_line(&mut self) -> Result<String> {
        self.ensure_healthy()?;
        let budget = self.timeouts.read;
        let outcome = tokio::time::timeout(budget, read_raw_line(&mut self.reader)).await;
        let line = self.settle("SMTP read", budget, outcome)?;
        let text = String::from_utf8(line).map_err(|_| {
            self.poisoned = true;
            Error::Protocol("reply is not UTF-8".into())
        })?;
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Writes data to the stream and flushes it.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_healthy()?;
        let budget = self.timeouts.write;
        let stream = self.reader.get_mut();
        let write = async {
            stream.write_all(data).await?;
            stream.flush().await?;
            Ok(())
        };
        let outcome = tokio::time::timeout(budget, write).await;
        self.settle("SMTP write", budget, outcome)
    }

    /// Writes encoded DATA content, each chunk under its own write budget.
    pub async fn write_data(&mut self, encoded: &[u8]) -> Result<()> {
        for chunk in encoded.chunks(DATA_CHUNK) {
            self.write_all(chunk).await?;
        }
        Ok(())
    }

    /// Unwraps the stream for a TLS upgrade.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    const fn ensure_healthy(&self) -> Result<()> {
        if self.poisoned {
            Err(Error::ConnectionPoisoned)
        } else {
            Ok(())
        }
    }

    fn settle<T>(
        &mut self,
        operation: &'static str,
        budget: Duration,
        outcome: std::result::Result<Result<T>, tokio::time::error::Elapsed>,
    ) -> Result<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.poisoned = true;
                Err(e)
            }
            Err(_) => {
                self.poisoned = true;
                Err(postern_transport::Error::Timeout {
                    operation,
                    after: budget,
                }
                .into())
            }
        }
    }
}

async fn read_raw_line<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader
        .take(MAX_LINE_LENGTH + 2)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    if line.last() != Some(&b'\n') {
        return Err(Error::Protocol("reply line too long".into()));
    }
    Ok(line)
}
