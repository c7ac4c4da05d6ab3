//! Connection security modes.

use serde::{Deserialize, Serialize};

/// How a connection is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionSecurity {
    /// Plaintext for the whole session. **Not recommended.**
    None,
    /// Plaintext greeting, upgraded in-band before authentication.
    #[serde(rename = "STARTTLS", alias = "STARTTLS_REQUIRED")]
    StartTls,
    /// TLS from the first byte. **Recommended.**
    #[default]
    #[serde(alias = "SSL_TLS_REQUIRED")]
    Tls,
}

impl ConnectionSecurity {
    /// Returns true if the TLS handshake happens before the greeting.
    #[must_use]
    pub const fn is_implicit_tls(self) -> bool {
        matches!(self, Self::Tls)
    }

    /// Returns true if the session must be upgraded with STARTTLS/STLS.
    #[must_use]
    pub const fn requires_upgrade(self) -> bool {
        matches!(self, Self::StartTls)
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
    fn test_upgrade_flags() {
        assert!(ConnectionSecurity::StartTls.requires_upgrade());
        assert!(!ConnectionSecurity::Tls.requires_upgrade());
        assert!(ConnectionSecurity::Tls.is_implicit_tls());
        assert!(!ConnectionSecurity::None.is_implicit_tls());
    }
}
