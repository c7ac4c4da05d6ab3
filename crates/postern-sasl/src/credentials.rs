//! Configured authentication method and the secrets that go with it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::TokenProvider;

/// Authentication method chosen by the user at account setup.
///
/// Each protocol engine resolves this against the mechanisms the server
/// advertises. An engine may fall back to an equally strong legacy command
/// (PLAIN to `LOGIN` or `USER`/`PASS`, CRAM-MD5 to POP3 `APOP`) but never to a
/// weaker one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AuthType {
    /// Cleartext password (PLAIN or LOGIN).
    #[default]
    #[serde(rename = "PLAIN")]
    Plain,
    /// Challenge-response password.
    #[serde(rename = "CRAM_MD5")]
    CramMd5,
    /// TLS client certificate.
    #[serde(rename = "EXTERNAL")]
    External,
    /// `OAuth2` bearer token (OAUTHBEARER or XOAUTH2).
    #[serde(rename = "XOAUTH2")]
    XOAuth2,
    /// No authentication.
    #[serde(rename = "NONE")]
    None,
}

impl AuthType {
    /// Returns true if this method needs a password.
    #[must_use]
    pub const fn requires_password(self) -> bool {
        matches!(self, Self::Plain | Self::CramMd5)
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "PLAIN",
            Self::CramMd5 => "CRAM_MD5",
            Self::External => "EXTERNAL",
            Self::XOAuth2 => "XOAUTH2",
            Self::None => "NONE",
        })
    }
}

/// Borrowed view of everything an engine needs to authenticate.
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    /// Configured method.
    pub auth_type: AuthType,
    /// Login name.
    pub username: &'a str,
    /// Password, for password-based methods.
    pub password: Option<&'a str>,
    /// Token source, for [`AuthType::XOAuth2`].
    pub tokens: Option<&'a dyn TokenProvider>,
}

impl<'a> Credentials<'a> {
    /// Credentials for a password-based method.
    #[must_use]
    pub const fn password(auth_type: AuthType, username: &'a str, password: &'a str) -> Self {
        Self {
            auth_type,
            username,
            password: Some(password),
            tokens: None,
        }
    }

    /// Credentials for `OAuth2`.
    #[must_use]
    pub const fn oauth(username: &'a str, tokens: &'a dyn TokenProvider) -> Self {
        Self {
            auth_type: AuthType::XOAuth2,
            username,
            password: None,
            tokens: Some(tokens),
        }
    }

    /// Returns the password or an empty string.
    #[must_use]
    pub fn password_or_empty(&self) -> &'a str {
        self.password.unwrap_or_default()
    }
}

impl fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("has_tokens", &self.tokens.is_some())
            .finish()
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

    #[test]
    fn test_auth_type_wire_names() {
        assert_eq!(serde_json::to_string(&AuthType::CramMd5).unwrap(), "\"CRAM_MD5\"");
        assert_eq!(serde_json::to_string(&AuthType::XOAuth2).unwrap(), "\"XOAUTH2\"");
        let parsed: AuthType = serde_json::from_str("\"EXTERNAL\"").unwrap();
        assert_eq!(parsed, AuthType::External);
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials::password(AuthType::Plain, "alice", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
