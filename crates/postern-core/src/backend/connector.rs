//! Opening authenticated protocol sessions.

use std::fmt;
use std::sync::Arc;

use postern_sasl::{AuthType, Credentials, TokenProvider};
use postern_transport::{MailStream, Timeouts, TlsContext, connect};
use tracing::debug;

use crate::settings::ServerSettings;
use crate::{Error, Result};

/// An authenticated IMAP connection.
pub type ImapSession = postern_imap::Client<MailStream, postern_imap::Authenticated>;

/// A POP3 connection in the TRANSACTION state.
pub type Pop3Session = postern_pop3::Client<MailStream, postern_pop3::Transaction>;

/// An authenticated SMTP connection ready for a mail transaction.
pub type SmtpSession = postern_smtp::Client<MailStream, postern_smtp::Ready>;

/// Name announced in EHLO. An address literal avoids leaking the host name.
const EHLO_DOMAIN: &str = "[127.0.0.1]";

/// Everything needed to open sessions to one server.
///
/// Each call opens a new connection: TCP (and TLS for implicit TLS), the
/// greeting, STARTTLS when required, then authentication.
#[derive(Clone)]
pub struct Connector {
    settings: ServerSettings,
    tls: TlsContext,
    timeouts: Timeouts,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("settings", &self.settings)
            .field("timeouts", &self.timeouts)
            .field("has_tokens", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// Creates a connector.
    #[must_use]
    pub fn new(
        settings: ServerSettings,
        tls: TlsContext,
        timeouts: Timeouts,
        tokens: Option<Arc<dyn TokenProvider>>,
    ) -> Self {
        Self {
            settings,
            tls,
            timeouts,
            tokens,
        }
    }

    /// Server settings in use.
    #[must_use]
    pub const fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Network time budgets in use.
    #[must_use]
    pub const fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Opens an authenticated IMAP session.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting, upgrading or authenticating fails.
    pub async fn imap(&self) -> Result<ImapSession> {
        let credentials = self.credentials()?;
        let mut client = postern_imap::Client::connect(self.stream().await?, self.timeouts).await?;
        if self.settings.connection_security.requires_upgrade() {
            client = client.starttls(&self.settings.host, &self.tls).await?;
        }
        Ok(client.authenticate(&credentials).await?)
    }

    /// Opens a POP3 session.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting, upgrading or authenticating fails.
    pub async fn pop3(&self) -> Result<Pop3Session> {
        let credentials = self.credentials()?;
        let mut client = postern_pop3::Client::connect(self.stream().await?, self.timeouts).await?;
        if self.settings.connection_security.requires_upgrade() {
            client = client.starttls(&self.settings.host, &self.tls).await?;
        }
        Ok(client.authenticate(&credentials).await?)
    }

    /// Opens an SMTP session.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting, upgrading or authenticating fails.
    pub async fn smtp(&self) -> Result<SmtpSession> {
        let credentials = self.credentials()?;
        let mut client =
            postern_smtp::Client::connect(self.stream().await?, self.timeouts, EHLO_DOMAIN).await?;
        if self.settings.connection_security.requires_upgrade() {
            client = client.starttls(&self.settings.host, &self.tls).await?;
        }
        Ok(client.authenticate(&credentials).await?)
    }

    async fn stream(&self) -> Result<MailStream> {
        let endpoint = self.settings.endpoint();
        debug!(%endpoint, protocol = %self.settings.protocol, "Connecting");
        Ok(connect(&endpoint, self.settings.connection_security, &self.tls, &self.timeouts).await?)
    }

    fn credentials(&self) -> Result<Credentials<'_>> {
        let settings = &self.settings;
        match settings.auth_type {
            AuthType::XOAuth2 => {
                let tokens = self.tokens.as_deref().ok_or_else(|| {
                    Error::InvalidSettings(format!("no OAuth2 token source for {}", settings.username))
                })?;
                Ok(Credentials::oauth(&settings.username, tokens))
            }
            auth_type => Ok(Credentials {
                auth_type,
                username: &settings.username,
                password: settings.password.as_deref(),
                tokens: None,
            }),
        }
    }
}
