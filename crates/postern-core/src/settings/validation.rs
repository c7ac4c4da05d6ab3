//! Settings validation.

use postern_sasl::AuthType;

use super::model::{AccountConfig, Protocol, ServerSettings};

/// Validation error for server or account settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Host is empty.
    EmptyHost,
    /// Port is zero.
    InvalidPort,
    /// Username is empty.
    EmptyUsername,
    /// Auth type needs a password and none was given.
    MissingPassword,
    /// POP3 has no `OAuth2` mechanism.
    OAuthOverPop3,
    /// Incoming server is not IMAP or POP3.
    WrongIncomingProtocol,
    /// Outgoing server is not SMTP.
    WrongOutgoingProtocol,
    /// Account id is empty.
    EmptyAccountId,
    /// Email address is empty.
    EmptyEmail,
    /// Email address format is invalid.
    InvalidEmail,
    /// Connection pool size is zero.
    ZeroPoolSize,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyHost => "Server host is required",
            Self::InvalidPort => "Port must be 1-65535",
            Self::EmptyUsername => "Username is required",
            Self::MissingPassword => "Password is required for this authentication type",
            Self::OAuthOverPop3 => "POP3 does not support XOAUTH2",
            Self::WrongIncomingProtocol => "Incoming server must be IMAP or POP3",
            Self::WrongOutgoingProtocol => "Outgoing server must be SMTP",
            Self::EmptyAccountId => "Account id is required",
            Self::EmptyEmail => "Email address is required",
            Self::InvalidEmail => "Invalid email address format",
            Self::ZeroPoolSize => "Pool size must be at least 1",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyHost => "host",
            Self::InvalidPort => "port",
            Self::EmptyUsername => "username",
            Self::MissingPassword => "password",
            Self::OAuthOverPop3 => "authenticationType",
            Self::WrongIncomingProtocol => "incoming",
            Self::WrongOutgoingProtocol => "outgoing",
            Self::EmptyAccountId => "id",
            Self::EmptyEmail | Self::InvalidEmail => "email",
            Self::ZeroPoolSize => "pool_size",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field(), self.message())
    }
}

/// Validate one server's settings.
///
/// # Errors
///
/// Returns a list of validation errors if the settings are invalid.
pub fn validate_server(settings: &ServerSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_server(settings, &mut errors);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate an account and both of its servers.
///
/// # Errors
///
/// Returns a list of validation errors if the account is invalid.
pub fn validate_account(account: &AccountConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if account.id.trim().is_empty() {
        errors.push(ValidationError::EmptyAccountId);
    }
    if account.email.trim().is_empty() {
        errors.push(ValidationError::EmptyEmail);
    } else if !is_valid_email(&account.email) {
        errors.push(ValidationError::InvalidEmail);
    }
    if account.pool_size == 0 {
        errors.push(ValidationError::ZeroPoolSize);
    }

    if !matches!(account.incoming.protocol, Protocol::Imap | Protocol::Pop3) {
        errors.push(ValidationError::WrongIncomingProtocol);
    }
    check_server(&account.incoming, &mut errors);

    if let Some(outgoing) = &account.outgoing {
        if outgoing.protocol != Protocol::Smtp {
            errors.push(ValidationError::WrongOutgoingProtocol);
        }
        check_server(outgoing, &mut errors);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_server(settings: &ServerSettings, errors: &mut Vec<ValidationError>) {
    if settings.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if settings.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if settings.auth_type != AuthType::None && settings.username.trim().is_empty() {
        errors.push(ValidationError::EmptyUsername);
    }
    if settings.auth_type.requires_password() && settings.password.as_deref().is_none_or(str::is_empty) {
        errors.push(ValidationError::MissingPassword);
    }
    if settings.protocol == Protocol::Pop3 && settings.auth_type == AuthType::XOAuth2 {
        errors.push(ValidationError::OAuthOverPop3);
    }
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.trim().split_once('@') else {
        return false;
    };

    // Exactly one @, non-empty local part
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    // Dotted domain without empty labels
    domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
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
    use std::collections::BTreeMap;

    use postern_transport::ConnectionSecurity;

    use super::*;

    fn raw(protocol: Protocol, auth_type: AuthType, password: Option<&str>) -> ServerSettings {
        ServerSettings {
            protocol,
            host: "mail.example.com".to_string(),
            port: 993,
            connection_security: ConnectionSecurity::Tls,
            auth_type,
            username: "user".to_string(),
            password: password.map(str::to_string),
            client_certificate_alias: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name@sub.example.com"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@example..com"));
    }

    #[test]
    fn test_port_and_host() {
        let mut settings = raw(Protocol::Imap, AuthType::Plain, Some("pw"));
        settings.port = 0;
        settings.host = " ".to_string();
        let errors = validate_server(&settings).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidPort));
        assert!(errors.contains(&ValidationError::EmptyHost));
    }

    #[test]
    fn test_password_auth_needs_password() {
        let errors = validate_server(&raw(Protocol::Smtp, AuthType::CramMd5, None)).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingPassword]);
        assert!(validate_server(&raw(Protocol::Smtp, AuthType::External, None)).is_ok());
    }

    #[test]
    fn test_pop3_rejects_oauth() {
        let errors = validate_server(&raw(Protocol::Pop3, AuthType::XOAuth2, None)).unwrap_err();
        assert_eq!(errors, vec![ValidationError::OAuthOverPop3]);
        assert!(validate_server(&raw(Protocol::Imap, AuthType::XOAuth2, None)).is_ok());
    }

    #[test]
    fn test_account_protocol_roles() {
        let account = AccountConfig {
            id: "a".to_string(),
            email: "user@example.com".to_string(),
            incoming: raw(Protocol::Smtp, AuthType::Plain, Some("pw")),
            outgoing: Some(raw(Protocol::Imap, AuthType::Plain, Some("pw"))),
            sync: crate::sync::SyncConfig::default(),
            pool_size: 0,
            timeouts: postern_transport::Timeouts::default(),
            retry: crate::retry::RetryPolicy::default(),
            oauth: None,
        };
        let errors = validate_account(&account).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroPoolSize,
                ValidationError::WrongIncomingProtocol,
                ValidationError::WrongOutgoingProtocol,
            ]
        );
    }
}
