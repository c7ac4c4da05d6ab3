//! Message-level types shared by the sync engine, storage and backends.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message flag as local storage keeps it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// Read.
    Seen,
    /// Replied to.
    Answered,
    /// Starred.
    Flagged,
    /// Marked for deletion.
    Deleted,
    /// Draft.
    Draft,
    /// Forwarded (`$Forwarded`).
    Forwarded,
    /// Any other keyword.
    Keyword(String),
}

/// A message's complete flag set.
pub type FlagSet = BTreeSet<Flag>;

impl Flag {
    /// Maps an IMAP flag. `\Recent` is session state and maps to nothing.
    #[must_use]
    pub fn from_imap(flag: &postern_imap::Flag) -> Option<Self> {
        use postern_imap::Flag as Imap;

        match flag {
            Imap::Seen => Some(Self::Seen),
            Imap::Answered => Some(Self::Answered),
            Imap::Flagged => Some(Self::Flagged),
            Imap::Deleted => Some(Self::Deleted),
            Imap::Draft => Some(Self::Draft),
            Imap::Recent => None,
            Imap::Keyword(k) if k.eq_ignore_ascii_case("$Forwarded") => Some(Self::Forwarded),
            Imap::Keyword(k) => Some(Self::Keyword(k.clone())),
        }
    }

    /// IMAP form of the flag.
    #[must_use]
    pub fn to_imap(&self) -> postern_imap::Flag {
        use postern_imap::Flag as Imap;

        match self {
            Self::Seen => Imap::Seen,
            Self::Answered => Imap::Answered,
            Self::Flagged => Imap::Flagged,
            Self::Deleted => Imap::Deleted,
            Self::Draft => Imap::Draft,
            Self::Forwarded => Imap::Keyword("$Forwarded".to_string()),
            Self::Keyword(k) => Imap::Keyword(k.clone()),
        }
    }
}

/// Converts IMAP flags into a local flag set.
#[must_use]
pub fn flags_from_imap(flags: &postern_imap::Flags) -> FlagSet {
    flags.iter().filter_map(Flag::from_imap).collect()
}

/// Converts local flags into IMAP flags.
#[must_use]
pub fn flags_to_imap<'a>(flags: impl IntoIterator<Item = &'a Flag>) -> postern_imap::Flags {
    flags.into_iter().map(Flag::to_imap).collect()
}

/// How much of a message was downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadState {
    /// Known from the listing only; no content stored. The next sync
    /// downloads it.
    Envelope,
    /// Headers only; the message was over the download limit.
    Partial,
    /// The whole message.
    Full,
}

/// A message handed to [`crate::storage::BackendFolder::save_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// UID (IMAP) or UIDL (POP3).
    pub server_id: String,
    /// Internal date, when the server reports one.
    pub date: Option<DateTime<Utc>>,
    /// Full size on the server, in bytes.
    pub size: u32,
    /// Flags at download time.
    pub flags: FlagSet,
    /// Raw RFC 5322 data, or just the header block for a partial download.
    pub data: Vec<u8>,
    /// Whether `data` is complete.
    pub download: DownloadState,
}

/// An email message to send.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Envelope sender.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// CC addresses.
    pub cc: Vec<String>,
    /// BCC addresses. Never appear in `content`.
    pub bcc: Vec<String>,
    /// Complete RFC 5322 message.
    pub content: Vec<u8>,
}

impl OutgoingMessage {
    /// Creates a new outgoing message.
    #[must_use]
    pub fn new(from: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            from: from.into(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            content: content.into(),
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Returns all recipients (to, cc, bcc).
    pub fn all_recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(String::as_str)
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
    fn test_flags_from_imap_drop_recent() {
        let imap: postern_imap::Flags = ["\\Seen", "\\Recent", "$Forwarded", "$Label1"]
            .into_iter()
            .map(postern_imap::Flag::parse)
            .collect();
        let local = flags_from_imap(&imap);
        assert_eq!(
            local,
            FlagSet::from([Flag::Seen, Flag::Forwarded, Flag::Keyword("$Label1".into())])
        );
    }

    #[test]
    fn test_flags_to_imap() {
        let imap = flags_to_imap(&FlagSet::from([Flag::Flagged, Flag::Forwarded]));
        assert!(imap.contains(&postern_imap::Flag::Flagged));
        assert!(imap.contains(&postern_imap::Flag::Keyword("$Forwarded".into())));
    }

    #[test]
    fn test_all_recipients() {
        let message = OutgoingMessage::new("me@example.com", b"Subject: x\r\n\r\nbody".to_vec())
            .to("a@example.com")
            .cc("b@example.com")
            .bcc("c@example.com");
        assert_eq!(
            message.all_recipients().collect::<Vec<_>>(),
            ["a@example.com", "b@example.com", "c@example.com"]
        );
    }
}
