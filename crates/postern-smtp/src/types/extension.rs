//! SMTP extension types.

use postern_sasl::Mechanism;

/// SMTP extensions discovered from EHLO response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS (RFC 3207)
    StartTls,
    /// AUTH (RFC 4954), with the mechanisms this client knows
    Auth(Vec<Mechanism>),
    /// SIZE (RFC 1870); `None` or `0` means no fixed limit
    Size(Option<usize>),
    /// 8BITMIME (RFC 6152)
    EightBitMime,
    /// PIPELINING (RFC 2920)
    Pipelining,
    /// ENHANCEDSTATUSCODES (RFC 2034)
    EnhancedStatusCodes,
    /// SMTPUTF8 (RFC 6531)
    SmtpUtf8,
    /// Anything else, kept verbatim
    Unknown(String),
}

impl Extension {
    /// Parses one line of an EHLO response, after the first.
    ///
    /// Both `AUTH PLAIN LOGIN` and the pre-standard `AUTH=PLAIN LOGIN` are
    /// accepted.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_ascii_whitespace();
        let Some(first) = words.next() else {
            return Self::Unknown(line.to_string());
        };
        let (keyword, inline) = first.split_once('=').unwrap_or((first, ""));

        match keyword.to_ascii_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => {
                let mechanisms = std::iter::once(inline)
                    .chain(words)
                    .filter_map(|m| m.parse().ok())
                    .collect();
                Self::Auth(mechanisms)
            }
            "SIZE" => Self::Size(words.next().and_then(|s| s.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "ENHANCEDSTATUSCODES" => Self::EnhancedStatusCodes,
            "SMTPUTF8" => Self::SmtpUtf8,
            _ => Self::Unknown(line.to_string()),
        }
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
    fn parse_starttls_any_case() {
        assert_eq!(Extension::parse("STARTTLS"), Extension::StartTls);
        assert_eq!(Extension::parse("starttls"), Extension::StartTls);
    }

    #[test]
    fn parse_auth_skips_unknown_mechanisms() {
        assert_eq!(
            Extension::parse("AUTH PLAIN GSSAPI LOGIN"),
            Extension::Auth(vec![Mechanism::Plain, Mechanism::Login])
        );
    }

    #[test]
    fn parse_legacy_auth_equals() {
        assert_eq!(
            Extension::parse("AUTH=LOGIN PLAIN"),
            Extension::Auth(vec![Mechanism::Login, Mechanism::Plain])
        );
    }

    #[test]
    fn parse_oauth_mechanisms() {
        let Extension::Auth(mechs) = Extension::parse("AUTH XOAUTH2 OAUTHBEARER") else {
            panic!("expected AUTH");
        };
        assert!(mechs.contains(&Mechanism::XOAuth2));
        assert!(mechs.contains(&Mechanism::OAuthBearer));
    }

    #[test]
    fn parse_size() {
        assert_eq!(Extension::parse("SIZE 52428800"), Extension::Size(Some(52_428_800)));
        assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
    }

    #[test]
    fn parse_flags() {
        assert_eq!(Extension::parse("8BITMIME"), Extension::EightBitMime);
        assert_eq!(Extension::parse("PIPELINING"), Extension::Pipelining);
        assert_eq!(Extension::parse("ENHANCEDSTATUSCODES"), Extension::EnhancedStatusCodes);
        assert_eq!(Extension::parse("SMTPUTF8"), Extension::SmtpUtf8);
    }

    #[test]
    fn parse_unknown_and_empty() {
        assert_eq!(Extension::parse("X-CUSTOM"), Extension::Unknown("X-CUSTOM".into()));
        assert!(matches!(Extension::parse(""), Extension::Unknown(_)));
    }
}
