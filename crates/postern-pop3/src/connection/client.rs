//! Type-state POP3 client.

#![allow(clippy::missing_errors_doc)]

use std::marker::PhantomData;

use postern_sasl::{AuthType, Credentials, Mechanism, sasl};
use postern_transport::{MailStream, TlsContext, with_timeout};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::stream::Pop3Stream;
use crate::command::Command;
use crate::parser::{self, Reply};
use crate::types::{Capabilities, ListEntry, Stat, UidlEntry};
use crate::{Error, Result};

/// AUTHORIZATION state: greeted, not yet logged in.
#[derive(Debug)]
pub struct Authorization;

/// TRANSACTION state: logged in, the maildrop is locked.
#[derive(Debug)]
pub struct Transaction;

/// POP3 client with type-state.
pub struct Client<S, State> {
    stream: Pop3Stream<S>,
    capabilities: Capabilities,
    apop_timestamp: Option<String>,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("capabilities", &self.capabilities)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// What the last `CAPA` announced.
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// True once an I/O failure made the session unusable.
    pub const fn is_poisoned(&self) -> bool {
        self.stream.is_poisoned()
    }

    /// `NOOP`.
    pub async fn noop(&mut self) -> Result<()> {
        self.command(&Command::Noop).await.map(drop)
    }

    /// `QUIT`. In the TRANSACTION state this commits pending deletions.
    pub async fn quit(mut self) -> Result<()> {
        self.command(&Command::Quit).await.map(drop)
    }

    fn transition<T>(self) -> Client<S, T> {
        Client {
            stream: self.stream,
            capabilities: self.capabilities,
            apop_timestamp: self.apop_timestamp,
            _state: PhantomData,
        }
    }

    async fn send(&mut self, command: &Command) -> Result<()> {
        debug!(command = command.name(), "POP3 >>>");
        self.stream.write_line(&command.serialize()).await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let line = self.stream.read_text_line().await?;
        parser::parse_reply(&line).inspect_err(|_| self.stream.poison())
    }

    /// Sends a command and returns the text of its `+OK`.
    async fn command(&mut self, command: &Command) -> Result<String> {
        self.send(command).await?;
        match self.read_reply().await? {
            Reply::Ok(text) => Ok(text),
            Reply::Err(text) => Err(Error::Server(text)),
            Reply::Continue(_) => {
                self.stream.poison();
                Err(Error::Protocol(format!("unexpected continuation after {}", command.name())))
            }
        }
    }

    /// Sends a multi-line command and returns the listing.
    async fn listing(&mut self, command: &Command) -> Result<Vec<String>> {
        self.command(command).await?;
        self.stream.read_multiline_text().await
    }

    /// Sends a multi-line command and returns the raw body.
    async fn body(&mut self, command: &Command) -> Result<Vec<u8>> {
        self.command(command).await?;
        self.stream.read_multiline().await
    }
}

impl<S> Client<S, Authorization>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the greeting and the capability list.
    pub async fn connect(stream: S, timeouts: postern_transport::Timeouts) -> Result<Self> {
        let mut client = Self {
            stream: Pop3Stream::new(stream, timeouts),
            capabilities: Capabilities::default(),
            apop_timestamp: None,
            _state: PhantomData,
        };

        let greeting = match client.read_reply().await? {
            Reply::Ok(text) => text,
            Reply::Err(text) => return Err(Error::Server(text)),
            Reply::Continue(_) => {
                client.stream.poison();
                return Err(Error::Protocol("greeting is a continuation".into()));
            }
        };
        client.apop_timestamp = parser::apop_timestamp(&greeting).map(str::to_string);
        debug!(greeting, "POP3 greeting");

        client.capa().await?;
        Ok(client)
    }

    /// Re-reads the capability list.
    ///
    /// A server without `CAPA` (RFC 1939 only) answers `-ERR`; that leaves
    /// the capabilities empty.
    pub async fn capa(&mut self) -> Result<&Capabilities> {
        self.capabilities = match self.listing(&Command::Capa).await {
            Ok(lines) => Capabilities::parse(lines.iter().map(String::as_str)),
            Err(Error::Server(text)) => {
                debug!(text, "CAPA not supported");
                Capabilities::default()
            }
            Err(e) => return Err(e),
        };
        Ok(&self.capabilities)
    }

    /// Logs in with the configured method.
    ///
    /// | Method | Used when advertised | Otherwise |
    /// |---|---|---|
    /// | `PLAIN` | `AUTH PLAIN` | `USER`/`PASS` |
    /// | `CRAM_MD5` | `AUTH CRAM-MD5` | `APOP` |
    /// | `EXTERNAL` | `AUTH EXTERNAL` | [`Error::MissingCapability`] |
    ///
    /// `XOAUTH2` and `NONE` cannot log in to POP3.
    pub async fn authenticate(mut self, credentials: &Credentials<'_>) -> Result<Client<S, Transaction>> {
        match credentials.auth_type {
            AuthType::Plain => {
                let password = credentials.password_or_empty();
                if self.capabilities.has_sasl(Mechanism::Plain) {
                    self.auth_plain(credentials.username, password).await?;
                } else {
                    self.user_pass(credentials.username, password).await?;
                }
            }
            AuthType::CramMd5 => {
                let password = credentials.password_or_empty();
                if self.capabilities.has_sasl(Mechanism::CramMd5) {
                    self.auth_cram_md5(credentials.username, password).await?;
                } else {
                    self.apop(credentials.username, password).await?;
                }
            }
            AuthType::External => self.auth_external(credentials.username).await?,
            AuthType::XOAuth2 | AuthType::None => {
                return Err(Error::InvalidSettings(format!(
                    "{} authentication is not available for POP3",
                    credentials.auth_type
                )));
            }
        }
        debug!("POP3 login complete");
        Ok(self.transition())
    }

    async fn user_pass(&mut self, username: &str, password: &str) -> Result<()> {
        self.command(&Command::User(username.to_string()))
            .await
            .map_err(into_auth_failure)?;
        self.command(&Command::Pass(password.to_string()))
            .await
            .map_err(into_auth_failure)?;
        Ok(())
    }

    async fn apop(&mut self, username: &str, password: &str) -> Result<()> {
        let Some(timestamp) = self.apop_timestamp.as_deref() else {
            return Err(Error::MissingCapability("APOP".into()));
        };
        let digest = sasl::apop_digest(timestamp, password);
        self.command(&Command::Apop {
            username: username.to_string(),
            digest,
        })
        .await
        .map_err(into_auth_failure)?;
        Ok(())
    }

    async fn auth_plain(&mut self, username: &str, password: &str) -> Result<()> {
        self.begin_sasl(Mechanism::Plain).await?;
        self.finish_sasl(&sasl::plain(username, password)).await
    }

    async fn auth_cram_md5(&mut self, username: &str, password: &str) -> Result<()> {
        let challenge = self.begin_sasl(Mechanism::CramMd5).await?;
        let response = sasl::cram_md5(username, password, &challenge)?;
        self.finish_sasl(&response).await
    }

    async fn auth_external(&mut self, username: &str) -> Result<()> {
        if !self.capabilities.has_sasl(Mechanism::External) {
            return Err(Error::MissingCapability("SASL EXTERNAL".into()));
        }
        self.command(&Command::Auth {
            mechanism: Mechanism::External,
            initial_response: Some(sasl::external(username)),
        })
        .await
        .map_err(into_auth_failure)?;
        Ok(())
    }

    /// Sends `AUTH <mechanism>` and returns the server's challenge.
    async fn begin_sasl(&mut self, mechanism: Mechanism) -> Result<String> {
        self.send(&Command::Auth {
            mechanism,
            initial_response: None,
        })
        .await?;
        match self.read_reply().await? {
            Reply::Continue(challenge) => Ok(challenge),
            Reply::Err(text) => Err(Error::Auth(text)),
            Reply::Ok(_) => {
                self.stream.poison();
                Err(Error::Protocol(format!("{mechanism} completed without a response")))
            }
        }
    }

    async fn finish_sasl(&mut self, response: &str) -> Result<()> {
        debug!("POP3 >>> <SASL response>");
        self.stream.write_line(response.as_bytes()).await?;
        match self.read_reply().await? {
            Reply::Ok(_) => Ok(()),
            Reply::Err(text) => Err(Error::Auth(text)),
            Reply::Continue(_) => {
                self.stream.poison();
                Err(Error::Protocol("unexpected second SASL challenge".into()))
            }
        }
    }
}

impl Client<MailStream, Authorization> {
    /// Upgrades the session with `STLS` and re-reads the capability list.
    pub async fn starttls(mut self, host: &str, tls: &TlsContext) -> Result<Self> {
        if !self.capabilities.stls {
            return Err(Error::MissingCapability("STLS".into()));
        }
        self.command(&Command::Stls).await?;

        let timeouts = *self.stream.timeouts();
        let plain = self.stream.into_inner();
        let secured = with_timeout("TLS handshake", timeouts.connect, plain.upgrade_to_tls(host, tls)).await?;
        debug!(host, "STLS negotiated");

        let mut client = Self {
            stream: Pop3Stream::new(secured, timeouts),
            capabilities: Capabilities::default(),
            apop_timestamp: self.apop_timestamp,
            _state: PhantomData,
        };
        client.capa().await?;
        Ok(client)
    }
}

impl<S> Client<S, Transaction>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `STAT`: message count and maildrop size.
    pub async fn stat(&mut self) -> Result<Stat> {
        let text = self.command(&Command::Stat).await?;
        parser::parse_stat(&text)
    }

    /// `LIST`: size of every message.
    pub async fn list(&mut self) -> Result<Vec<ListEntry>> {
        let lines = self.listing(&Command::List(None)).await?;
        lines.iter().map(String::as_str).map(parser::parse_list_line).collect()
    }

    /// `LIST <n>`: size of one message.
    pub async fn list_one(&mut self, message: u32) -> Result<ListEntry> {
        let text = self.command(&Command::List(Some(message))).await?;
        parser::parse_list_line(&text)
    }

    /// `UIDL`: unique id of every message.
    pub async fn uidl(&mut self) -> Result<Vec<UidlEntry>> {
        self.require_uidl()?;
        let lines = self.listing(&Command::Uidl(None)).await?;
        lines.iter().map(String::as_str).map(parser::parse_uidl_line).collect()
    }

    /// `UIDL <n>`: unique id of one message.
    pub async fn uidl_one(&mut self, message: u32) -> Result<UidlEntry> {
        self.require_uidl()?;
        let text = self.command(&Command::Uidl(Some(message))).await?;
        parser::parse_uidl_line(&text)
    }

    /// `RETR <n>`: the whole message, unstuffed.
    pub async fn retr(&mut self, message: u32) -> Result<Vec<u8>> {
        self.body(&Command::Retr(message)).await
    }

    /// `TOP <n> <lines>`: the header plus `lines` body lines.
    pub async fn top(&mut self, message: u32, lines: u32) -> Result<Vec<u8>> {
        if self.capabilities.capa && !self.capabilities.top {
            return Err(Error::MissingCapability("TOP".into()));
        }
        self.body(&Command::Top { message, lines }).await
    }

    /// `DELE <n>`: marks a message for deletion at `QUIT`.
    pub async fn dele(&mut self, message: u32) -> Result<()> {
        self.command(&Command::Dele(message)).await.map(drop)
    }

    /// `RSET`: unmarks every deleted message.
    pub async fn rset(&mut self) -> Result<()> {
        self.command(&Command::Rset).await.map(drop)
    }

    // Servers that answer CAPA but leave out UIDL cannot give stable ids.
    fn require_uidl(&self) -> Result<()> {
        if self.capabilities.capa && !self.capabilities.uidl {
            return Err(Error::MissingCapability("UIDL".into()));
        }
        Ok(())
    }
}

fn into_auth_failure(error: Error) -> Error {
    match error {
        Error::Server(text) => Error::Auth(text),
        other => other,
    }
}
