//! POP3 data types.

use postern_sasl::Mechanism;

/// What `CAPA` announced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The server answered `CAPA` at all.
    pub capa: bool,
    /// `STLS`
    pub stls: bool,
    /// `UIDL`
    pub uidl: bool,
    /// `TOP`
    pub top: bool,
    /// Mechanisms from the `SASL` line.
    pub sasl: Vec<Mechanism>,
}

impl Capabilities {
    /// Parses the lines of a `CAPA` listing.
    ///
    /// Unknown capabilities and mechanisms are ignored.
    #[must_use]
    pub fn parse<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut caps = Self {
            capa: true,
            ..Self::default()
        };
        for line in lines {
            let mut words = line.split_ascii_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            match keyword.to_ascii_uppercase().as_str() {
                "STLS" => caps.stls = true,
                "UIDL" => caps.uidl = true,
                "TOP" => caps.top = true,
                "SASL" => caps.sasl.extend(words.filter_map(|w| w.parse::<Mechanism>().ok())),
                _ => {}
            }
        }
        caps
    }

    /// Returns true if `mechanism` was announced on the `SASL` line.
    #[must_use]
    pub fn has_sasl(&self, mechanism: Mechanism) -> bool {
        self.sasl.contains(&mechanism)
    }
}

/// Reply to `STAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Number of messages.
    pub count: u32,
    /// Total size in octets.
    pub size: u64,
}

/// One line of a `LIST` listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    /// Message number, valid for this session only.
    pub number: u32,
    /// Size in octets.
    pub size: u64,
}

/// One line of a `UIDL` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidlEntry {
    /// Message number, valid for this session only.
    pub number: u32,
    /// Persistent unique id.
    pub uid: String,
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
    fn test_parse_capa_listing() {
        let caps = Capabilities::parse(["TOP", "uidl", "SASL PLAIN CRAM-MD5 GSSAPI", "STLS", "USER"]);
        assert!(caps.capa);
        assert!(caps.top);
        assert!(caps.uidl);
        assert!(caps.stls);
        assert!(caps.has_sasl(Mechanism::Plain));
        assert!(caps.has_sasl(Mechanism::CramMd5));
        assert!(!caps.has_sasl(Mechanism::External));
    }

    #[test]
    fn test_default_means_no_capa() {
        let caps = Capabilities::default();
        assert!(!caps.capa);
        assert!(caps.sasl.is_empty());
    }
}
