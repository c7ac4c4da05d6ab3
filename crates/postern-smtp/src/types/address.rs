//! Envelope addresses.

use crate::error::{Error, Result};

/// Address for the SMTP envelope (`MAIL FROM`/`RCPT TO`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates and wraps an address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] unless the address has exactly one
    /// `@` with non-empty parts, and no whitespace, control characters or
    /// angle brackets that would break the command line.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the address needs `SMTPUTF8`.
    #[must_use]
    pub fn is_ascii(&self) -> bool {
        self.0.is_ascii()
    }

    fn validate(addr: &str) -> Result<()> {
        if addr
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err(Error::InvalidAddress(format!("illegal character in {addr:?}")));
        }
        match addr.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                Ok(())
            }
            _ => Err(Error::InvalidAddress(format!("not an address: {addr:?}"))),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
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
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert!(addr.is_ascii());
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "userexample.com", "@example.com", "user@", "a@b@c"] {
            assert!(Address::new(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_rejects_command_injection() {
        assert!(Address::new("a@b.com>\r\nRCPT TO:<evil@x.com").is_err());
        assert!(Address::new("a b@example.com").is_err());
    }

    #[test]
    fn test_utf8_address() {
        let addr = Address::new("δοκιμή@παράδειγμα.δοκιμή").unwrap();
        assert!(!addr.is_ascii());
    }
}
