//! Type-state IMAP client.
//!
//! The IMAP connection states are:
//!
//! - `NotAuthenticated`: after the greeting
//! - `Authenticated`: after LOGIN/AUTHENTICATE, or a `PREAUTH` greeting
//! - `Selected`: after SELECT/EXAMINE
//!
//! Each state only exposes the commands valid in it, and every command takes
//! `&mut self` or `self`, so one command is in flight at a time and its
//! response is read to the tagged completion before the next one starts.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

pub use self::selected::FetchResponse;
pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::FramedStream;
use crate::command::{Command, TagGenerator};
use crate::parser::{Condition, Response, ResponseParser, UntaggedResponse};
use crate::types::{Capabilities, Capability, ResponseCode, Status};
use crate::{Error, Result};

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tags: TagGenerator,
    pub(crate) capabilities: Capabilities,
    pub(crate) state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// Everything the server sent for one command.
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub untagged: Vec<UntaggedResponse>,
    pub condition: Condition,
}

impl Reply {
    /// Turns a `NO`/`BAD`/`BYE` completion into an error.
    pub fn ok(self) -> Result<Self> {
        match self.condition.status {
            Status::Ok | Status::PreAuth => Ok(self),
            Status::No => Err(Error::No {
                text: self.condition.text,
                code: self.condition.code,
            }),
            Status::Bad => Err(Error::Bad(self.condition.text)),
            Status::Bye => Err(Error::Bye(self.condition.text)),
        }
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self.condition.status, Status::Ok)
    }

    /// Returns true if the reply already announced the capability list.
    pub fn carried_capabilities(&self) -> bool {
        matches!(self.condition.code, Some(ResponseCode::Capability(_)))
            || self
                .untagged
                .iter()
                .any(|u| matches!(u, UntaggedResponse::Capability(_)))
    }

    /// Response codes from the tagged line and from untagged `OK` lines.
    pub fn codes(&self) -> impl Iterator<Item = &ResponseCode> {
        self.untagged
            .iter()
            .filter_map(|u| match u {
                UntaggedResponse::Condition(c) => c.code.as_ref(),
                _ => None,
            })
            .chain(self.condition.code.as_ref())
    }
}

/// One step of a command exchange.
pub(crate) enum Step {
    /// `+` continuation with its text.
    Continue(String),
    /// Tagged completion.
    Done(Condition),
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Capabilities as last announced by the server.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Checks if the server announced `cap`.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.has(cap)
    }

    /// Returns true once a read or write has failed. A poisoned client
    /// rejects every command and must be dropped.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.stream.is_poisoned()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    /// Sends `NOOP`, giving the server a chance to report changes.
    pub async fn noop(&mut self) -> Result<()> {
        self.execute(Command::Noop).await.map(drop)
    }

    /// Sends `CAPABILITY` and stores the result.
    pub async fn capability(&mut self) -> Result<&Capabilities> {
        self.execute(Command::Capability).await?;
        Ok(&self.capabilities)
    }

    /// Sends `LOGOUT` and drops the connection.
    ///
    /// The server's `BYE` and a connection already closed by the server are
    /// both expected here and not reported.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.send(&Command::Logout).await?;
        match self.collect(&tag).await {
            Ok(_) | Err(Error::Bye(_) | Error::Transport(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn into_state<T>(self, state: T) -> Client<S, T> {
        Client {
            stream: self.stream,
            tags: self.tags,
            capabilities: self.capabilities,
            state,
        }
    }

    /// Writes `command` and returns its tag.
    pub(crate) async fn send(&mut self, command: &Command) -> Result<String> {
        let tag = self.tags.next_tag();
        debug!(tag = %tag, command = command.name(), "IMAP >>>");
        self.stream.write_all(&command.serialize(&tag)).await?;
        Ok(tag)
    }

    /// Writes a raw continuation line (SASL response or literal), CRLF added.
    pub(crate) async fn send_line(&mut self, line: &[u8]) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line);
        data.extend_from_slice(b"\r\n");
        self.stream.write_all(&data).await
    }

    /// Reads until a continuation or the completion of `tag`, pushing
    /// untagged data to `untagged`.
    pub(crate) async fn read_step(
        &mut self,
        tag: &str,
        untagged: &mut Vec<UntaggedResponse>,
    ) -> Result<Step> {
        let mut bye = None;
        loop {
            let raw = match self.stream.read_response().await {
                Ok(raw) => raw,
                // A server that said BYE and hung up is not a network fault.
                Err(Error::Transport(e)) if bye.is_some() => {
                    debug!(?e, "Connection closed after BYE");
                    return Err(Error::Bye(bye.unwrap_or_default()));
                }
                Err(e) => return Err(e),
            };
            let response = match ResponseParser::parse(&raw) {
                Ok(response) => response,
                Err(e) => {
                    self.stream.poison();
                    return Err(e);
                }
            };

            match response {
                Response::Untagged(data) => {
                    match &data {
                        UntaggedResponse::Capability(caps) => {
                            self.capabilities = Capabilities::new(caps.clone());
                        }
                        UntaggedResponse::Condition(Condition {
                            status: Status::Bye,
                            text,
                            ..
                        }) => bye = Some(text.clone()),
                        UntaggedResponse::Condition(Condition {
                            code: Some(ResponseCode::Alert),
                            text,
                            ..
                        }) => warn!(alert = %text, "IMAP server alert"),
                        _ => {}
                    }
                    untagged.push(data);
                }
                Response::Continuation(text) => return Ok(Step::Continue(text)),
                Response::Tagged {
                    tag: got,
                    condition,
                } => {
                    if !got.eq_ignore_ascii_case(tag) {
                        self.stream.poison();
                        return Err(Error::Protocol(format!(
                            "completion for unknown tag {got} while waiting for {tag}"
                        )));
                    }
                    if let Some(ResponseCode::Capability(caps)) = &condition.code {
                        self.capabilities = Capabilities::new(caps.clone());
                    }
                    debug!(tag = %tag, status = ?condition.status, "IMAP <<<");
                    return Ok(Step::Done(condition));
                }
            }
        }
    }

    /// Reads the complete reply to `tag`. A continuation request here means
    /// client and server disagree about the command, which poisons the
    /// connection.
    pub(crate) async fn collect(&mut self, tag: &str) -> Result<Reply> {
        let mut untagged = Vec::new();
        match self.read_step(tag, &mut untagged).await? {
            Step::Done(condition) => Ok(Reply {
                untagged,
                condition,
            }),
            Step::Continue(_) => {
                self.stream.poison();
                Err(Error::Protocol(
                    "unexpected continuation request".to_string(),
                ))
            }
        }
    }

    /// Sends `command`, reads its reply and fails on anything but `OK`.
    pub(crate) async fn execute(&mut self, command: Command) -> Result<Reply> {
        let tag = self.send(&command).await?;
        self.collect(&tag).await?.ok()
    }
}
