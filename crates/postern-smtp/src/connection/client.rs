//! Type-state SMTP client.

#![allow(clippy::missing_errors_doc)]

use std::collections::HashSet;
use std::marker::PhantomData;

use postern_sasl::{AuthType, Credentials, Mechanism, TokenProvider, sasl};
use postern_transport::{MailStream, Timeouts, TlsContext, with_timeout};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::{ServerInfo, SmtpStream};
use crate::command::{Command, encode_data};
use crate::error::{Error, Result};
use crate::types::{Address, Extension, Reply, ReplyCode};

/// Type-state marker: greeted and EHLO done, not authenticated.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker: authenticated, or authentication not needed.
#[derive(Debug)]
pub struct Ready;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
pub struct Client<S, State> {
    stream: SmtpStream<S>,
    server_info: ServerInfo,
    ehlo_domain: String,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server_info", &self.server_info)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S, State> SmtpConnection for Client<S, State> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

impl<S> Client<S, Connected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the greeting and introduces the client with EHLO.
    ///
    /// Falls back to HELO, with no extensions, when EHLO is rejected.
    pub async fn connect(stream: S, timeouts: Timeouts, ehlo_domain: &str) -> Result<Self> {
        let mut stream = SmtpStream::new(stream, timeouts);
        let greeting = stream.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::from_reply(&greeting));
        }

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(hostname, "SMTP greeting");

        let mut client = Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            ehlo_domain: ehlo_domain.to_string(),
            _state: PhantomData,
        };
        client.hello().await?;
        Ok(client)
    }

    async fn hello(&mut self) -> Result<()> {
        let ehlo = Command::Ehlo {
            hostname: self.ehlo_domain.clone(),
        };
        let reply = self.send_command(&ehlo).await?;
        if reply.is_success() {
            self.server_info.extensions = reply
                .message
                .iter()
                .skip(1)
                .map(String::as_str)
                .map(Extension::parse)
                .collect();
            return Ok(());
        }

        debug!(code = %reply.code, "EHLO rejected, trying HELO");
        let helo = Command::Helo {
            hostname: self.ehlo_domain.clone(),
        };
        let reply = self.send_command(&helo).await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        self.server_info.extensions.clear();
        Ok(())
    }

    /// Authenticates with the configured method.
    ///
    /// | Method | Mechanism, in order of preference |
    /// |---|---|
    /// | `PLAIN` | `AUTH PLAIN`, `AUTH LOGIN` |
    /// | `CRAM_MD5` | `AUTH CRAM-MD5` |
    /// | `XOAUTH2` | `AUTH OAUTHBEARER`, `AUTH XOAUTH2` |
    /// | `EXTERNAL` | `AUTH EXTERNAL` |
    /// | `NONE` | nothing is sent |
    pub async fn authenticate(mut self, credentials: &Credentials<'_>) -> Result<Client<S, Ready>> {
        match credentials.auth_type {
            AuthType::Plain => {
                let password = credentials.password_or_empty();
                if self.server_info.has_auth(Mechanism::Plain) {
                    self.auth_plain(credentials.username, password).await?;
                } else if self.server_info.has_auth(Mechanism::Login) {
                    self.auth_login(credentials.username, password).await?;
                } else {
                    return Err(Error::MissingCapability("AUTH PLAIN".into()));
                }
            }
            AuthType::CramMd5 => {
                if !self.server_info.has_auth(Mechanism::CramMd5) {
                    return Err(Error::MissingCapability("AUTH CRAM-MD5".into()));
                }
                self.auth_cram_md5(credentials.username, credentials.password_or_empty())
                    .await?;
            }
            AuthType::External => {
                if !self.server_info.has_auth(Mechanism::External) {
                    return Err(Error::MissingCapability("AUTH EXTERNAL".into()));
                }
                self.auth_external(credentials.username).await?;
            }
            AuthType::XOAuth2 => self.auth_oauth(credentials).await?,
            AuthType::None => debug!("Sending without authentication"),
        }
        Ok(self.transition())
    }

    async fn auth_plain(&mut self, username: &str, password: &str) -> Result<()> {
        let cmd = Command::Auth {
            mechanism: Mechanism::Plain,
            initial_response: Some(sasl::plain(username, password)),
        };
        let reply = self.send_command(&cmd).await?;
        self.finish_auth(reply).await
    }

    async fn auth_login(&mut self, username: &str, password: &str) -> Result<()> {
        let cmd = Command::Auth {
            mechanism: Mechanism::Login,
            initial_response: None,
        };
        let reply = self.send_command(&cmd).await?;
        expect_challenge(&reply)?;
        let reply = self.send_sasl_line(&sasl::login_username(username)).await?;
        expect_challenge(&reply)?;
        let reply = self.send_sasl_line(&sasl::login_password(password)).await?;
        self.finish_auth(reply).await
    }

    async fn auth_cram_md5(&mut self, username: &str, password: &str) -> Result<()> {
        let cmd = Command::Auth {
            mechanism: Mechanism::CramMd5,
            initial_response: None,
        };
        let reply = self.send_command(&cmd).await?;
        expect_challenge(&reply)?;
        let response = sasl::cram_md5(username, password, &reply.message_text())?;
        let reply = self.send_sasl_line(&response).await?;
        self.finish_auth(reply).await
    }

    async fn auth_external(&mut self, username: &str) -> Result<()> {
        let cmd = Command::Auth {
            mechanism: Mechanism::External,
            initial_response: Some(sasl::external(username)),
        };
        let reply = self.send_command(&cmd).await?;
        self.finish_auth(reply).await
    }

    async fn auth_oauth(&mut self, credentials: &Credentials<'_>) -> Result<()> {
        let tokens = credentials.tokens.ok_or_else(|| Error::Auth {
            code: 0,
            message: "no OAuth token provider configured".into(),
        })?;
        let mechanism = if self.server_info.has_auth(Mechanism::OAuthBearer) {
            Mechanism::OAuthBearer
        } else if self.server_info.has_auth(Mechanism::XOAuth2) {
            Mechanism::XOAuth2
        } else {
            return Err(Error::MissingCapability("AUTH OAUTHBEARER".into()));
        };

        let (reply, challenge) = self.attempt_oauth(mechanism, credentials.username, tokens).await?;
        if reply.code == ReplyCode::AUTH_SUCCEEDED {
            return Ok(());
        }
        tokens.invalidate();

        let retry = reply.code == ReplyCode::AUTH_FAILED && challenge.as_deref().is_none_or(sasl::should_retry_oauth);
        if !retry {
            debug!(code = %reply.code, "Permanent OAuth failure");
            return Err(auth_failure(&reply));
        }

        warn!("OAuth token rejected, retrying with a fresh token");
        let (reply, _) = self.attempt_oauth(mechanism, credentials.username, tokens).await?;
        if reply.code == ReplyCode::AUTH_SUCCEEDED {
            return Ok(());
        }
        tokens.invalidate();
        Err(auth_failure(&reply))
    }

    /// One OAuth attempt. A 334 carries the server's JSON error; it is
    /// answered with an empty line to get the final reply.
    async fn attempt_oauth(
        &mut self,
        mechanism: Mechanism,
        username: &str,
        tokens: &dyn TokenProvider,
    ) -> Result<(Reply, Option<String>)> {
        let token = tokens.access_token().await?;
        let initial = match mechanism {
            Mechanism::XOAuth2 => sasl::xoauth2(username, &token),
            _ => sasl::oauthbearer(username, &token),
        };
        let cmd = Command::Auth {
            mechanism,
            initial_response: Some(initial),
        };
        let reply = self.send_command(&cmd).await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Ok((reply, None));
        }
        let challenge = reply.message_text();
        let reply = self.send_sasl_line("").await?;
        Ok((reply, Some(challenge)))
    }

    async fn finish_auth(&mut self, reply: Reply) -> Result<()> {
        if reply.is_success() {
            debug!("SMTP authentication complete");
            return Ok(());
        }
        if reply.code == ReplyCode::AUTH_CONTINUE {
            // A challenge we have nothing to answer with: cancel the exchange.
            let cancelled = self.send_sasl_line("*").await?;
            return Err(auth_failure(&cancelled));
        }
        Err(auth_failure(&reply))
    }

    async fn send_sasl_line(&mut self, line: &str) -> Result<Reply> {
        debug!("SMTP >>> <SASL response>");
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        self.stream.write_all(&data).await?;
        self.stream.read_reply().await
    }
}

impl Client<MailStream, Connected> {
    /// Upgrades the connection with STARTTLS and repeats EHLO.
    pub async fn starttls(mut self, host: &str, tls: &TlsContext) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::MissingCapability("STARTTLS".into()));
        }
        let reply = self.send_command(&Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::from_reply(&reply));
        }

        let timeouts = *self.stream.timeouts();
        let plain = self.stream.into_inner();
        let secured = with_timeout("TLS handshake", timeouts.connect, plain.upgrade_to_tls(host, tls)).await?;
        debug!(host, "STARTTLS negotiated");

        let mut client = Self {
            stream: SmtpStream::new(secured, timeouts),
            server_info: ServerInfo {
                hostname: self.server_info.hostname,
                extensions: HashSet::new(),
            },
            ehlo_domain: self.ehlo_domain,
            _state: PhantomData,
        };
        client.hello().await?;
        Ok(client)
    }
}

impl<S> Client<S, Ready>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts a mail transaction.
    ///
    /// `size` is the encoded message size. It is checked against the
    /// advertised SIZE before anything is sent, and passed as `SIZE=` when
    /// the server supports it. `BODY=8BITMIME` is added when advertised.
    pub async fn mail_from(mut self, from: &Address, size: Option<usize>) -> Result<Client<S, MailTransaction>> {
        if let (Some(size), Some(max)) = (size, self.server_info.max_message_size())
            && size > max
        {
            return Err(Error::MessageTooLarge { size, max });
        }
        let cmd = Command::MailFrom {
            from: from.clone(),
            eight_bit: self.server_info.supports(&Extension::EightBitMime),
            size: size.filter(|_| self.server_info.supports_size()),
        };
        let reply = self.send_command(&cmd).await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(self.transition())
    }

    /// Sends one message to every recipient, from MAIL FROM to the final
    /// reply after DATA.
    pub async fn send_mail(self, from: &Address, recipients: &[Address], message: &[u8]) -> Result<Self> {
        let Some((first, rest)) = recipients.split_first() else {
            return Err(Error::InvalidAddress("no recipients".into()));
        };
        let encoded = encode_data(message);
        let mut client = self.mail_from(from, Some(encoded.len())).await?.rcpt_to(first).await?;
        for to in rest {
            client = client.rcpt_to(to).await?;
        }
        client.data().await?.send_encoded(&encoded).await
    }
}

impl<S> Client<S, MailTransaction>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Adds a recipient to the transaction.
    pub async fn rcpt_to(mut self, to: &Address) -> Result<Client<S, RecipientAdded>> {
        self.recipient(to).await?;
        Ok(self.transition())
    }

    /// Aborts the transaction.
    pub async fn reset(mut self) -> Result<Client<S, Ready>> {
        self.rset().await?;
        Ok(self.transition())
    }
}

impl<S> Client<S, RecipientAdded>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Adds another recipient to the transaction.
    pub async fn rcpt_to(mut self, to: &Address) -> Result<Self> {
        self.recipient(to).await?;
        Ok(self)
    }

    /// Begins sending message data.
    pub async fn data(mut self) -> Result<Client<S, Data>> {
        let reply = self.send_command(&Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Error::from_reply(&reply));
        }
        Ok(self.transition())
    }

    /// Aborts the transaction.
    pub async fn reset(mut self) -> Result<Client<S, Ready>> {
        self.rset().await?;
        Ok(self.transition())
    }
}

impl<S> Client<S, Data>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends the message content and completes the transaction.
    ///
    /// Line endings are normalized to CRLF, leading dots are doubled and
    /// the terminating `.` line is added.
    pub async fn send_message(self, message: &[u8]) -> Result<Client<S, Ready>> {
        self.send_encoded(&encode_data(message)).await
    }

    async fn send_encoded(mut self, encoded: &[u8]) -> Result<Client<S, Ready>> {
        debug!(bytes = encoded.len(), "SMTP >>> <message data>");
        self.stream.write_data(encoded).await?;
        let reply = self.stream.read_reply().await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(self.transition())
    }
}

// Common implementation for all states
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// True once an I/O failure made the session unusable.
    pub const fn is_poisoned(&self) -> bool {
        self.stream.is_poisoned()
    }

    /// Sends NOOP.
    pub async fn noop(&mut self) -> Result<()> {
        let reply = self.send_command(&Command::Noop).await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(())
    }

    /// Sends QUIT and closes the connection (available in any state).
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(&Command::Quit).await?;
        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(Error::from_reply(&reply));
        }
        Ok(())
    }

    async fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        debug!(command = cmd.name(), "SMTP >>>");
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = self.stream.read_reply().await?;
        if reply.code == ReplyCode::SERVICE_UNAVAILABLE {
            // 421: the server is closing the channel.
            self.stream.poison();
        }
        Ok(reply)
    }

    async fn recipient(&mut self, to: &Address) -> Result<()> {
        let reply = self.send_command(&Command::RcptTo { to: to.clone() }).await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(())
    }

    async fn rset(&mut self) -> Result<()> {
        let reply = self.send_command(&Command::Rset).await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(())
    }

    fn transition<T>(self) -> Client<S, T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            ehlo_domain: self.ehlo_domain,
            _state: PhantomData,
        }
    }
}

fn expect_challenge(reply: &Reply) -> Result<()> {
    if reply.code == ReplyCode::AUTH_CONTINUE {
        Ok(())
    } else {
        Err(auth_failure(reply))
    }
}

/// 535 and 5.7.x mean bad credentials; anything else is an ordinary
/// negative reply.
fn auth_failure(reply: &Reply) -> Error {
    let credential_class = reply.enhanced.is_some_and(|e| e.class == 5 && e.subject == 7);
    if reply.code == ReplyCode::AUTH_FAILED || credential_class {
        Error::auth(reply)
    } else {
        Error::from_reply(reply)
    }
}
