//! IMAP IDLE (RFC 2177).
//!
//! The handle borrows the connection, so no other command can be sent until
//! [`IdleHandle::done`] has read the completion of `IDLE`.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::debug;

use super::framed::FramedStream;
use crate::command::DONE;
use crate::parser::{Condition, FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::{Flags, Status};
use crate::{Error, Result};

/// Mailbox change reported while idling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// New message count.
    Exists(u32),
    /// The message with this sequence number was expunged.
    Expunge(u32),
    /// Flags of a message changed.
    Fetch {
        /// Sequence number.
        seq: u32,
        /// New flags.
        flags: Flags,
    },
    /// Recent count changed.
    Recent(u32),
    /// Nothing happened within the wait budget.
    Timeout,
}

/// An active IDLE command.
pub struct IdleHandle<'a, S> {
    stream: &'a mut FramedStream<S>,
    tag: String,
    finished: bool,
}

impl<S> std::fmt::Debug for IdleHandle<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleHandle")
            .field("tag", &self.tag)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<'a, S> IdleHandle<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) const fn new(stream: &'a mut FramedStream<S>, tag: String) -> Self {
        Self {
            stream,
            tag,
            finished: false,
        }
    }

    /// Waits up to `duration` for a mailbox change.
    ///
    /// Status chatter such as `* OK Still here` is skipped. Keep `duration`
    /// under the 29 minutes RFC 2177 allows before re-issuing IDLE.
    pub async fn wait(&mut self, duration: Duration) -> Result<IdleEvent> {
        let deadline = Instant::now() + duration;
        loop {
            if self.finished {
                return Ok(IdleEvent::Timeout);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(raw) = self.stream.wait_for_response(remaining).await? else {
                return Ok(IdleEvent::Timeout);
            };
            if let Some(event) = self.event(&raw)? {
                return Ok(event);
            }
        }
    }

    fn event(&mut self, raw: &[u8]) -> Result<Option<IdleEvent>> {
        let response = match ResponseParser::parse(raw) {
            Ok(response) => response,
            Err(e) => {
                self.stream.poison();
                return Err(e);
            }
        };
        match response {
            Response::Untagged(data) => Ok(match data {
                UntaggedResponse::Exists(n) => Some(IdleEvent::Exists(n)),
                UntaggedResponse::Recent(n) => Some(IdleEvent::Recent(n)),
                UntaggedResponse::Expunge(seq) => Some(IdleEvent::Expunge(seq)),
                UntaggedResponse::Fetch { seq, items } => {
                    let flags = items.into_iter().find_map(|item| match item {
                        FetchItem::Flags(flags) => Some(flags),
                        _ => None,
                    });
                    flags.map(|flags| IdleEvent::Fetch { seq, flags })
                }
                UntaggedResponse::Condition(Condition {
                    status: Status::Bye,
                    text,
                    ..
                }) => {
                    self.stream.poison();
                    return Err(Error::Bye(text));
                }
                other => {
                    debug!(?other, "Ignoring untagged data during IDLE");
                    None
                }
            }),
            Response::Continuation(_) => {
                self.stream.poison();
                Err(Error::Protocol(
                    "unexpected continuation during IDLE".to_string(),
                ))
            }
            Response::Tagged { tag, condition } if tag.eq_ignore_ascii_case(&self.tag) => {
                // The server ended IDLE on its own.
                self.finished = true;
                match condition.status {
                    Status::Ok => Ok(Some(IdleEvent::Timeout)),
                    _ => Err(Error::Protocol(format!(
                        "IDLE ended by server: {}",
                        condition.text
                    ))),
                }
            }
            Response::Tagged { tag, .. } => {
                self.stream.poison();
                Err(Error::Protocol(format!("unexpected tag {tag} during IDLE")))
            }
        }
    }

    /// Sends `DONE` and reads the completion of `IDLE`.
    pub async fn done(self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.stream.write_all(DONE).await?;
        loop {
            let raw = self.stream.read_response().await?;
            match ResponseParser::parse(&raw) {
                Ok(Response::Tagged { tag, condition }) if tag.eq_ignore_ascii_case(&self.tag) => {
                    return match condition.status {
                        Status::Ok => Ok(()),
                        _ => Err(Error::Protocol(format!("IDLE failed: {}", condition.text))),
                    };
                }
                Ok(Response::Untagged(_)) => {}
                Ok(other) => {
                    self.stream.poison();
                    return Err(Error::Protocol(format!("unexpected {other:?} after DONE")));
                }
                Err(e) => {
                    self.stream.poison();
                    return Err(e);
                }
            }
        }
    }
}
