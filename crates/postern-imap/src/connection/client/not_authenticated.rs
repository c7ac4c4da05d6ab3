//! Greeting, STARTTLS and authentication.

use postern_sasl::{AuthType, Credentials, Mechanism, TokenProvider, sasl};
use postern_transport::{MailStream, Timeouts, TlsContext, with_timeout};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::states::{Authenticated, NotAuthenticated};
use super::{Client, Reply, Step};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::parser::{Condition, Response, ResponseParser, UntaggedResponse};
use crate::types::{Capabilities, Capability, ResponseCode, Status};
use crate::{Error, Result};

/// Outcome of one AUTHENTICATE exchange.
struct SaslOutcome {
    reply: Reply,
    /// Last challenge the server sent before failing, if any.
    challenge: Option<String>,
}

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the server greeting from a freshly connected stream.
    ///
    /// Requests the capability list if the greeting did not carry one.
    pub async fn connect(stream: S, timeouts: Timeouts) -> Result<Self> {
        let mut framed = FramedStream::new(stream, timeouts);
        let greeting = framed.read_response().await?;

        let Response::Untagged(UntaggedResponse::Condition(Condition { status, code, text })) =
            ResponseParser::parse(&greeting)?
        else {
            return Err(Error::Protocol("greeting is not an untagged status".to_string()));
        };

        let preauth = match status {
            Status::Ok => false,
            Status::PreAuth => true,
            Status::Bye => return Err(Error::Bye(text)),
            Status::No | Status::Bad => {
                return Err(Error::Protocol(format!("unexpected greeting: {text}")));
            }
        };
        let capabilities = match code {
            Some(ResponseCode::Capability(caps)) => Capabilities::new(caps),
            _ => Capabilities::default(),
        };

        let mut client = Self {
            stream: framed,
            tags: TagGenerator::default(),
            capabilities,
            state: NotAuthenticated { preauth },
        };
        if client.capabilities.is_empty() {
            client.capability().await?;
        }
        debug!(preauth, "IMAP greeting received");
        Ok(client)
    }

    /// Authenticates with `LOGIN`.
    ///
    /// Fails with [`Error::MissingCapability`] if the server announced
    /// `LOGINDISABLED`.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        if self.has_capability(&Capability::LoginDisabled) {
            return Err(Error::MissingCapability("LOGIN (LOGINDISABLED)".to_string()));
        }
        let reply = self.login_reply(username, password).await?;
        self.finish_authentication(&reply).await
    }

    /// Authenticates with the configured method, choosing the mechanism
    /// from the announced capabilities.
    ///
    /// - `PLAIN`: `AUTHENTICATE PLAIN` when announced, falling back to
    ///   `LOGIN` on an authentication failure; plain `LOGIN` otherwise
    /// - `CRAM_MD5`: `AUTHENTICATE CRAM-MD5`, required
    /// - `EXTERNAL`: `AUTHENTICATE EXTERNAL`, required
    /// - `XOAUTH2`: `OAUTHBEARER`, else `XOAUTH2`, both with SASL-IR. A
    ///   rejected token is invalidated and retried once if the server's
    ///   challenge says a fresh token may help
    ///
    /// A `PREAUTH` greeting skips all of this.
    pub async fn authenticate(
        mut self,
        credentials: &Credentials<'_>,
    ) -> Result<Client<S, Authenticated>> {
        if self.state.preauth {
            debug!("Server pre-authenticated the connection");
            return Ok(self.into_state(Authenticated));
        }

        let reply = match credentials.auth_type {
            AuthType::Plain => self.auth_plain(credentials).await?,
            AuthType::CramMd5 => self.auth_cram_md5(credentials).await?,
            AuthType::External => self.auth_external(credentials.username).await?,
            AuthType::XOAuth2 => self.auth_oauth(credentials).await?,
            AuthType::None => {
                return Err(Error::Auth(
                    "server requires authentication but none is configured".to_string(),
                ));
            }
        };
        info!(mechanism = %credentials.auth_type, "IMAP authenticated");
        self.finish_authentication(&reply).await
    }

    async fn finish_authentication(mut self, reply: &Reply) -> Result<Client<S, Authenticated>> {
        // Capabilities often change after login.
        if !reply.carried_capabilities() {
            self.capability().await?;
        }
        Ok(self.into_state(Authenticated))
    }

    async fn login_reply(&mut self, username: &str, password: &str) -> Result<Reply> {
        let tag = self
            .send(&Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;
        let reply = self.collect(&tag).await?;
        if reply.is_ok() {
            Ok(reply)
        } else {
            Err(self.auth_failure(reply.condition))
        }
    }

    async fn auth_plain(&mut self, credentials: &Credentials<'_>) -> Result<Reply> {
        let password = credentials.password_or_empty();

        if !self.capabilities.has_auth(Mechanism::Plain) {
            if self.has_capability(&Capability::LoginDisabled) {
                return Err(Error::MissingCapability("AUTH=PLAIN".to_string()));
            }
            return self.login_reply(credentials.username, password).await;
        }

        let initial = sasl::plain(credentials.username, password);
        let outcome = self.sasl_exchange(Mechanism::Plain, &initial).await?;
        if outcome.reply.is_ok() {
            return Ok(outcome.reply);
        }
        let original = self.auth_failure(outcome.reply.condition);

        if !matches!(original, Error::Auth(_))
            || self.is_poisoned()
            || self.has_capability(&Capability::LoginDisabled)
        {
            return Err(original);
        }
        debug!("AUTHENTICATE PLAIN rejected, trying LOGIN");
        match self.login_reply(credentials.username, password).await {
            Ok(reply) => Ok(reply),
            Err(e @ Error::Auth(_)) => Err(e),
            Err(e) => {
                debug!(?e, "LOGIN fallback failed");
                Err(original)
            }
        }
    }

    async fn auth_cram_md5(&mut self, credentials: &Credentials<'_>) -> Result<Reply> {
        if !self.capabilities.has_auth(Mechanism::CramMd5) {
            return Err(Error::MissingCapability("AUTH=CRAM-MD5".to_string()));
        }
        let tag = self
            .send(&Command::Authenticate {
                mechanism: Mechanism::CramMd5,
                initial_response: None,
            })
            .await?;

        let mut untagged = Vec::new();
        let challenge = match self.read_step(&tag, &mut untagged).await? {
            Step::Continue(challenge) => challenge,
            Step::Done(condition) => return Err(self.auth_failure(condition)),
        };
        let response = sasl::cram_md5(
            credentials.username,
            credentials.password_or_empty(),
            &challenge,
        )?;
        self.send_line(response.as_bytes()).await?;

        let reply = self.collect(&tag).await?;
        if reply.is_ok() {
            Ok(reply)
        } else {
            Err(self.auth_failure(reply.condition))
        }
    }

    async fn auth_external(&mut self, username: &str) -> Result<Reply> {
        if !self.capabilities.has_auth(Mechanism::External) {
            return Err(Error::MissingCapability("AUTH=EXTERNAL".to_string()));
        }
        let outcome = self
            .sasl_exchange(Mechanism::External, &sasl::external(username))
            .await?;
        if outcome.reply.is_ok() {
            Ok(outcome.reply)
        } else {
            Err(self.auth_failure(outcome.reply.condition))
        }
    }

    async fn auth_oauth(&mut self, credentials: &Credentials<'_>) -> Result<Reply> {
        let tokens = credentials
            .tokens
            .ok_or_else(|| Error::Auth("no OAuth token provider configured".to_string()))?;

        if !self.has_capability(&Capability::SaslIr) {
            return Err(Error::MissingCapability("SASL-IR".to_string()));
        }
        let mechanism = if self.capabilities.has_auth(Mechanism::OAuthBearer) {
            Mechanism::OAuthBearer
        } else if self.capabilities.has_auth(Mechanism::XOAuth2) {
            Mechanism::XOAuth2
        } else {
            return Err(Error::MissingCapability("AUTH=OAUTHBEARER".to_string()));
        };

        let first = self
            .attempt_oauth(mechanism, credentials.username, tokens)
            .await?;
        if first.reply.is_ok() {
            return Ok(first.reply);
        }
        tokens.invalidate();

        let retry = first
            .challenge
            .as_deref()
            .is_none_or(sasl::should_retry_oauth);
        if !retry || self.is_poisoned() {
            debug!("Permanent OAuth failure");
            return Err(Error::Auth(first.reply.condition.text));
        }

        warn!("OAuth token rejected, retrying with a fresh token");
        let second = self
            .attempt_oauth(mechanism, credentials.username, tokens)
            .await?;
        if second.reply.is_ok() {
            return Ok(second.reply);
        }
        tokens.invalidate();
        Err(Error::Auth(second.reply.condition.text))
    }

    async fn attempt_oauth(
        &mut self,
        mechanism: Mechanism,
        username: &str,
        tokens: &dyn TokenProvider,
    ) -> Result<SaslOutcome> {
        let token = tokens.access_token().await?;
        let initial = match mechanism {
            Mechanism::XOAuth2 => sasl::xoauth2(username, &token),
            _ => sasl::oauthbearer(username, &token),
        };
        self.sasl_exchange(mechanism, &initial).await
    }

    /// Runs a client-first SASL exchange.
    ///
    /// The initial response goes inline when the server announced SASL-IR,
    /// otherwise after the first continuation. Any further challenge is
    /// recorded and answered with an empty line, which makes a failing
    /// server send its final status.
    async fn sasl_exchange(&mut self, mechanism: Mechanism, initial: &str) -> Result<SaslOutcome> {
        let inline = self.has_capability(&Capability::SaslIr);
        let tag = self
            .send(&Command::Authenticate {
                mechanism,
                initial_response: inline.then(|| initial.to_string()),
            })
            .await?;

        let mut untagged = Vec::new();
        let mut challenge = None;
        let mut initial_sent = inline;
        loop {
            match self.read_step(&tag, &mut untagged).await? {
                Step::Continue(text) if !initial_sent => {
                    initial_sent = true;
                    if !text.is_empty() {
                        debug!("Ignoring server data before the initial response");
                    }
                    self.send_line(initial.as_bytes()).await?;
                }
                Step::Continue(text) => {
                    challenge = Some(text);
                    self.send_line(b"").await?;
                }
                Step::Done(condition) => {
                    return Ok(SaslOutcome {
                        reply: Reply {
                            untagged,
                            condition,
                        },
                        challenge,
                    });
                }
            }
        }
    }

    /// Classifies a failed authentication.
    ///
    /// A `NO`/`BAD` without a response code, or with `AUTHENTICATIONFAILED`,
    /// is a rejected credential. Anything else is a server-side problem and
    /// the connection is not trusted further.
    fn auth_failure(&mut self, condition: Condition) -> Error {
        match condition.code {
            None | Some(ResponseCode::AuthenticationFailed) => {
                if condition.status == Status::Bye {
                    self.stream.poison();
                }
                Error::Auth(condition.text)
            }
            Some(code) => {
                self.stream.poison();
                Error::No {
                    text: condition.text,
                    code: Some(code),
                }
            }
        }
    }
}

impl Client<MailStream, NotAuthenticated> {
    /// Upgrades the connection with `STARTTLS` and re-reads the
    /// capabilities, since the pre-TLS list cannot be trusted.
    pub async fn starttls(mut self, host: &str, tls: &TlsContext) -> Result<Self> {
        if !self.has_capability(&Capability::StartTls) {
            return Err(Error::MissingCapability("STARTTLS".to_string()));
        }
        self.execute(Command::StartTls).await?;

        let timeouts = *self.stream.timeouts();
        let plain = self.stream.into_inner();
        let secured = with_timeout("TLS handshake", timeouts.connect, plain.upgrade_to_tls(host, tls)).await?;
        debug!(host, "STARTTLS negotiated");

        let mut client = Self {
            stream: FramedStream::new(secured, timeouts),
            tags: self.tags,
            capabilities: Capabilities::default(),
            state: self.state,
        };
        client.capability().await?;
        Ok(client)
    }
}
