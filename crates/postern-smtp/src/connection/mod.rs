//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{
    Client, Connected, Data, MailTransaction, Ready, RecipientAdded, SmtpConnection,
};
pub use stream::SmtpStream;

use crate::types::Extension;
use postern_sasl::Mechanism;
use std::collections::HashSet;

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if SIZE was advertised, with or without a limit.
    #[must_use]
    pub fn supports_size(&self) -> bool {
        self.extensions.iter().any(|ext| matches!(ext, Extension::Size(_)))
    }

    /// Returns the maximum message size, if a non-zero one was advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(Some(size)) if *size > 0 => Some(*size),
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<Mechanism> {
        self.extensions
            .iter()
            .filter_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Checks if `mechanism` appeared on an AUTH line.
    #[must_use]
    pub fn has_auth(&self, mechanism: Mechanism) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Auth(m) if m.contains(&mechanism)))
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

    fn info(lines: &[&str]) -> ServerInfo {
        ServerInfo {
            hostname: "smtp.example.com".into(),
            extensions: lines.iter().map(|l| Extension::parse(l)).collect(),
        }
    }

    #[test]
    fn test_size_zero_means_unlimited() {
        let server = info(&["SIZE 0"]);
        assert!(server.supports_size());
        assert_eq!(server.max_message_size(), None);
        assert_eq!(info(&["SIZE 1000"]).max_message_size(), Some(1000));
        assert!(!info(&["8BITMIME"]).supports_size());
    }

    #[test]
    fn test_auth_lines_are_merged() {
        let server = info(&["AUTH PLAIN", "AUTH=LOGIN"]);
        assert!(server.has_auth(Mechanism::Plain));
        assert!(server.has_auth(Mechanism::Login));
        assert!(!server.has_auth(Mechanism::XOAuth2));
        assert_eq!(server.auth_mechanisms().len(), 2);
    }
}
