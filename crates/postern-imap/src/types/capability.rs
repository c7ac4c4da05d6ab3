//! Server capabilities and tagged status.

use std::fmt;

use postern_sasl::Mechanism;

/// Status word of a tagged or untagged condition response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `OK`
    Ok,
    /// `NO`: the command failed.
    No,
    /// `BAD`: the command was not understood.
    Bad,
    /// `PREAUTH` greeting.
    PreAuth,
    /// `BYE`: the server is closing the connection.
    Bye,
}

/// A single capability atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1`
    Imap4Rev1,
    /// `IDLE` (RFC 2177)
    Idle,
    /// `UIDPLUS` (RFC 4315)
    UidPlus,
    /// `MOVE` (RFC 6851)
    Move,
    /// `STARTTLS`
    StartTls,
    /// `LOGINDISABLED`
    LoginDisabled,
    /// `SASL-IR` (RFC 4959)
    SaslIr,
    /// `AUTH=<mechanism>`, upper-cased.
    Auth(String),
    /// `SPECIAL-USE` (RFC 6154)
    SpecialUse,
    /// `CONDSTORE` (RFC 7162)
    CondStore,
    /// `NAMESPACE` (RFC 2342)
    Namespace,
    /// Anything else.
    Other(String),
}

impl Capability {
    /// Parses a capability atom, case-insensitively.
    #[must_use]
    pub fn parse(atom: &str) -> Self {
        let upper = atom.to_ascii_uppercase();
        if let Some(mechanism) = upper.strip_prefix("AUTH=") {
            return Self::Auth(mechanism.to_string());
        }
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IDLE" => Self::Idle,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "SASL-IR" => Self::SaslIr,
            "SPECIAL-USE" => Self::SpecialUse,
            "CONDSTORE" => Self::CondStore,
            "NAMESPACE" => Self::Namespace,
            _ => Self::Other(atom.to_string()),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Imap4Rev1 => "IMAP4rev1",
            Self::Idle => "IDLE",
            Self::UidPlus => "UIDPLUS",
            Self::Move => "MOVE",
            Self::StartTls => "STARTTLS",
            Self::LoginDisabled => "LOGINDISABLED",
            Self::SaslIr => "SASL-IR",
            Self::SpecialUse => "SPECIAL-USE",
            Self::CondStore => "CONDSTORE",
            Self::Namespace => "NAMESPACE",
            Self::Auth(mechanism) => return write!(f, "AUTH={mechanism}"),
            Self::Other(other) => other,
        };
        f.write_str(name)
    }
}

/// The capability list a server last announced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    /// Wraps a parsed list.
    #[must_use]
    pub const fn new(list: Vec<Capability>) -> Self {
        Self(list)
    }

    /// Returns true if `cap` was announced.
    #[must_use]
    pub fn has(&self, cap: &Capability) -> bool {
        self.0.contains(cap)
    }

    /// Returns true if `AUTH=<mechanism>` was announced.
    #[must_use]
    pub fn has_auth(&self, mechanism: Mechanism) -> bool {
        self.0
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m == mechanism.name()))
    }

    /// Returns true if nothing has been announced yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the announced capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }
}

impl From<Vec<Capability>> for Capabilities {
    fn from(list: Vec<Capability>) -> Self {
        Self(list)
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
    fn test_parse_known_and_unknown() {
        assert_eq!(Capability::parse("idle"), Capability::Idle);
        assert_eq!(Capability::parse("Sasl-IR"), Capability::SaslIr);
        assert_eq!(
            Capability::parse("auth=xoauth2"),
            Capability::Auth("XOAUTH2".to_string())
        );
        assert_eq!(
            Capability::parse("X-GM-EXT-1"),
            Capability::Other("X-GM-EXT-1".to_string())
        );
    }

    #[test]
    fn test_has_auth() {
        let caps = Capabilities::new(vec![
            Capability::Imap4Rev1,
            Capability::parse("AUTH=PLAIN"),
            Capability::parse("AUTH=OAUTHBEARER"),
        ]);
        assert!(caps.has_auth(Mechanism::Plain));
        assert!(caps.has_auth(Mechanism::OAuthBearer));
        assert!(!caps.has_auth(Mechanism::XOAuth2));
    }

    #[test]
    fn test_display() {
        assert_eq!(Capability::Auth("PLAIN".into()).to_string(), "AUTH=PLAIN");
        assert_eq!(Capability::UidPlus.to_string(), "UIDPLUS");
    }
}
