//! Settings data structures.

use std::collections::BTreeMap;
use std::fmt;

use postern_sasl::AuthType;
use postern_transport::{ConnectionSecurity, Endpoint, Timeouts};
use serde::{Deserialize, Serialize};

use super::validation::{ValidationError, validate_account, validate_server};
use crate::retry::RetryPolicy;
use crate::sync::SyncConfig;
use crate::{Error, Result};

/// Extra key holding the IMAP folder path prefix.
pub const EXTRA_PATH_PREFIX: &str = "pathPrefix";

/// Extra key enabling IMAP NAMESPACE detection.
pub const EXTRA_AUTO_DETECT_NAMESPACE: &str = "autoDetectNamespace";

/// Mail protocol spoken by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// IMAP4rev1.
    Imap,
    /// POP3.
    Pop3,
    /// SMTP submission.
    Smtp,
    /// `WebDAV` (Exchange). Not supported by any backend.
    WebDav,
    /// JMAP. Not supported by any backend.
    Jmap,
}

impl Protocol {
    /// Well-known port for this protocol and security mode.
    #[must_use]
    pub const fn default_port(self, security: ConnectionSecurity) -> u16 {
        let implicit = security.is_implicit_tls();
        match self {
            Self::Imap if implicit => 993,
            Self::Imap => 143,
            Self::Pop3 if implicit => 995,
            Self::Pop3 => 110,
            Self::Smtp if implicit => 465,
            Self::Smtp => match security {
                ConnectionSecurity::StartTls => 587,
                _ => 25,
            },
            Self::WebDav if implicit => 443,
            Self::WebDav => 80,
            Self::Jmap => 443,
        }
    }

    /// Returns true for protocols a mailbox is read from.
    #[must_use]
    pub const fn is_incoming(self) -> bool {
        !matches!(self, Self::Smtp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Imap => "IMAP",
            Self::Pop3 => "POP3",
            Self::Smtp => "SMTP",
            Self::WebDav => "WebDAV",
            Self::Jmap => "JMAP",
        })
    }
}

/// Everything needed to reach and log in to one server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// Protocol spoken by the server.
    #[serde(rename = "type")]
    pub protocol: Protocol,
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Transport security.
    pub connection_security: ConnectionSecurity,
    /// Authentication method.
    #[serde(rename = "authenticationType")]
    pub auth_type: AuthType,
    /// Login name.
    pub username: String,
    /// Password, when the auth type uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Alias of the TLS client certificate to present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_alias: Option<String>,
    /// Protocol-specific options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connection_security", &self.connection_security)
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("client_certificate_alias", &self.client_certificate_alias)
            .field("extra", &self.extra)
            .finish()
    }
}

impl ServerSettings {
    /// Creates validated settings.
    ///
    /// # Errors
    ///
    /// Returns every rule the settings break.
    pub fn new(
        protocol: Protocol,
        host: impl Into<String>,
        port: u16,
        connection_security: ConnectionSecurity,
        auth_type: AuthType,
        username: impl Into<String>,
        password: Option<String>,
    ) -> std::result::Result<Self, Vec<ValidationError>> {
        let settings = Self {
            protocol,
            host: host.into(),
            port,
            connection_security,
            auth_type,
            username: username.into(),
            password,
            client_certificate_alias: None,
            extra: BTreeMap::new(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Sets the client certificate alias.
    #[must_use]
    pub fn with_client_certificate_alias(mut self, alias: impl Into<String>) -> Self {
        self.client_certificate_alias = Some(alias.into());
        self
    }

    /// Sets a protocol-specific option.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns every rule the settings break.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        validate_server(self)
    }

    /// Host and port to connect to.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.host, self.port)
    }

    /// IMAP folder path prefix, empty when unset.
    #[must_use]
    pub fn path_prefix(&self) -> &str {
        self.extra.get(EXTRA_PATH_PREFIX).map_or("", String::as_str)
    }

    /// Whether the IMAP path prefix should come from the NAMESPACE response.
    #[must_use]
    pub fn auto_detect_namespace(&self) -> bool {
        self.extra
            .get(EXTRA_AUTO_DETECT_NAMESPACE)
            .is_none_or(|v| v == "true")
    }
}

/// Converts [`ServerSettings`] to and from their JSON form.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerSettingsMapper;

impl ServerSettingsMapper {
    /// Serializes settings to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(settings: &ServerSettings) -> Result<String> {
        Ok(serde_json::to_string(settings)?)
    }

    /// Parses and validates settings from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the settings are invalid.
    pub fn from_json(json: &str) -> Result<ServerSettings> {
        let settings: ServerSettings = serde_json::from_str(json)?;
        settings.validate().map_err(invalid)?;
        Ok(settings)
    }
}

/// `OAuth2` refresh parameters for an account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Token endpoint.
    pub token_url: String,
    /// Registered client id.
    pub client_id: String,
    /// Client secret, for confidential clients.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Long-lived refresh token.
    pub refresh_token: String,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// One mail account as the runner configures it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Stable account identifier.
    pub id: String,
    /// Account email address.
    pub email: String,
    /// Server mail is read from.
    pub incoming: ServerSettings,
    /// Server mail is sent through.
    #[serde(default)]
    pub outgoing: Option<ServerSettings>,
    /// Folder sync behavior.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Maximum simultaneous connections to the incoming server.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Network time budgets.
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Backoff for transient failures.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Token refresh parameters for XOAUTH2 accounts.
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
}

const fn default_pool_size() -> usize {
    2
}

impl AccountConfig {
    /// Checks the account and both servers.
    ///
    /// # Errors
    ///
    /// Returns an [`Error::InvalidSettings`] listing every broken rule.
    pub fn validate(&self) -> Result<()> {
        validate_account(self).map_err(invalid)
    }
}

fn invalid(errors: Vec<ValidationError>) -> Error {
    let messages: Vec<&str> = errors.iter().map(ValidationError::message).collect();
    Error::InvalidSettings(messages.join("; "))
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

    fn imap() -> ServerSettings {
        ServerSettings::new(
            Protocol::Imap,
            "imap.example.com",
            993,
            ConnectionSecurity::Tls,
            AuthType::Plain,
            "user@example.com",
            Some("hunter2".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip_is_field_for_field() {
        let settings = imap()
            .with_client_certificate_alias("work-cert")
            .with_extra(EXTRA_PATH_PREFIX, "INBOX.");
        let json = ServerSettingsMapper::to_json(&settings).unwrap();
        let back = ServerSettingsMapper::from_json(&json).unwrap();
        assert_eq!(back, settings);
        assert_eq!(back.path_prefix(), "INBOX.");
    }

    #[test]
    fn test_json_field_names() {
        let json = ServerSettingsMapper::to_json(&imap()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "imap");
        assert_eq!(value["connectionSecurity"], "TLS");
        assert_eq!(value["authenticationType"], "PLAIN");
        assert!(value.get("clientCertificateAlias").is_none());
    }

    #[test]
    fn test_from_json_validates() {
        let json = r#"{"type":"pop3","host":"pop.example.com","port":0,
            "connectionSecurity":"NONE","authenticationType":"XOAUTH2","username":"u"}"#;
        let err = ServerSettingsMapper::from_json(json).unwrap_err();
        assert!(matches!(err, Error::InvalidSettings(_)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", imap());
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Protocol::Imap.default_port(ConnectionSecurity::Tls), 993);
        assert_eq!(Protocol::Pop3.default_port(ConnectionSecurity::StartTls), 110);
        assert_eq!(Protocol::Smtp.default_port(ConnectionSecurity::StartTls), 587);
        assert_eq!(Protocol::Smtp.default_port(ConnectionSecurity::Tls), 465);
    }

    #[test]
    fn test_account_defaults() {
        let json = r#"{
            "id": "work",
            "email": "user@example.com",
            "incoming": {"type":"imap","host":"imap.example.com","port":993,
                "connectionSecurity":"TLS","authenticationType":"PLAIN",
                "username":"user","password":"pw"}
        }"#;
        let account: AccountConfig = serde_json::from_str(json).unwrap();
        assert_eq!(account.pool_size, 2);
        assert!(account.outgoing.is_none());
        assert_eq!(account.timeouts, Timeouts::default());
        assert_eq!(account.retry, RetryPolicy::default());
        assert!(account.validate().is_ok());
    }
}
