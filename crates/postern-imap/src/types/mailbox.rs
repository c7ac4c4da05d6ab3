//! Mailbox listing and status.

use super::{Flags, Uid, UidValidity};

/// Attribute attached to a LIST entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// `\Noselect`
    NoSelect,
    /// `\NonExistent`
    NonExistent,
    /// `\HasChildren`
    HasChildren,
    /// `\HasNoChildren`
    HasNoChildren,
    /// `\Marked`
    Marked,
    /// `\Unmarked`
    Unmarked,
    /// `\All` (SPECIAL-USE)
    All,
    /// `\Archive` (SPECIAL-USE)
    Archive,
    /// `\Drafts` (SPECIAL-USE)
    Drafts,
    /// `\Flagged` (SPECIAL-USE)
    Flagged,
    /// `\Junk` (SPECIAL-USE)
    Junk,
    /// `\Sent` (SPECIAL-USE)
    Sent,
    /// `\Trash` (SPECIAL-USE)
    Trash,
    /// Any other attribute, as received.
    Other(String),
}

impl MailboxAttribute {
    /// Parses an attribute atom, case-insensitively.
    #[must_use]
    pub fn parse(atom: &str) -> Self {
        match atom.to_ascii_lowercase().as_str() {
            "\\noselect" => Self::NoSelect,
            "\\nonexistent" => Self::NonExistent,
            "\\haschildren" => Self::HasChildren,
            "\\hasnochildren" => Self::HasNoChildren,
            "\\marked" => Self::Marked,
            "\\unmarked" => Self::Unmarked,
            "\\all" => Self::All,
            "\\archive" => Self::Archive,
            "\\drafts" => Self::Drafts,
            "\\flagged" => Self::Flagged,
            // Some older servers still send \Spam.
            "\\junk" | "\\spam" => Self::Junk,
            "\\sent" => Self::Sent,
            "\\trash" => Self::Trash,
            _ => Self::Other(atom.to_string()),
        }
    }

    /// Wire form of the attribute.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSelect => "\\Noselect",
            Self::NonExistent => "\\NonExistent",
            Self::HasChildren => "\\HasChildren",
            Self::HasNoChildren => "\\HasNoChildren",
            Self::Marked => "\\Marked",
            Self::Unmarked => "\\Unmarked",
            Self::All => "\\All",
            Self::Archive => "\\Archive",
            Self::Drafts => "\\Drafts",
            Self::Flagged => "\\Flagged",
            Self::Junk => "\\Junk",
            Self::Sent => "\\Sent",
            Self::Trash => "\\Trash",
            Self::Other(other) => other,
        }
    }

    /// Returns true for RFC 6154 special-use attributes.
    #[must_use]
    pub const fn is_special_use(&self) -> bool {
        matches!(
            self,
            Self::All
                | Self::Archive
                | Self::Drafts
                | Self::Flagged
                | Self::Junk
                | Self::Sent
                | Self::Trash
        )
    }
}

/// One untagged `LIST` or `LSUB` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter, if the server has one.
    pub delimiter: Option<char>,
    /// Mailbox name as sent by the server.
    pub name: String,
}

impl ListEntry {
    /// Returns true if the mailbox can be selected.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| matches!(a, MailboxAttribute::NoSelect | MailboxAttribute::NonExistent))
    }

    /// Returns true if this is the inbox.
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.name.eq_ignore_ascii_case("INBOX")
    }

    /// First special-use attribute, if any.
    #[must_use]
    pub fn special_use(&self) -> Option<&MailboxAttribute> {
        self.attributes.iter().find(|a| a.is_special_use())
    }
}

/// What SELECT or EXAMINE reported about a mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Message count.
    pub exists: u32,
    /// Recent count.
    pub recent: u32,
    /// UIDVALIDITY, when reported.
    pub uid_validity: Option<UidValidity>,
    /// Predicted next UID, when reported.
    pub uid_next: Option<Uid>,
    /// Flags defined in the mailbox.
    pub flags: Flags,
    /// Flags the client may store permanently.
    pub permanent_flags: Flags,
    /// Opened with EXAMINE or reported `READ-ONLY`.
    pub read_only: bool,
}

/// Item requested with `STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// `MESSAGES`
    Messages,
    /// `UIDNEXT`
    UidNext,
    /// `UIDVALIDITY`
    UidValidity,
    /// `UNSEEN`
    Unseen,
}

impl StatusAttribute {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// Parsed untagged `STATUS` data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusData {
    /// Mailbox name.
    pub mailbox: String,
    /// `MESSAGES`
    pub messages: Option<u32>,
    /// `UIDNEXT`
    pub uid_next: Option<Uid>,
    /// `UIDVALIDITY`
    pub uid_validity: Option<UidValidity>,
    /// `UNSEEN`
    pub unseen: Option<u32>,
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
    fn test_special_use_attributes() {
        assert_eq!(MailboxAttribute::parse("\\SENT"), MailboxAttribute::Sent);
        assert_eq!(MailboxAttribute::parse("\\Spam"), MailboxAttribute::Junk);
        assert!(MailboxAttribute::Archive.is_special_use());
        assert!(!MailboxAttribute::HasChildren.is_special_use());
    }

    #[test]
    fn test_list_entry_helpers() {
        let entry = ListEntry {
            attributes: vec![MailboxAttribute::HasNoChildren, MailboxAttribute::Trash],
            delimiter: Some('/'),
            name: "Deleted Items".to_string(),
        };
        assert!(entry.is_selectable());
        assert!(!entry.is_inbox());
        assert_eq!(entry.special_use(), Some(&MailboxAttribute::Trash));

        let parent = ListEntry {
            attributes: vec![MailboxAttribute::NoSelect],
            delimiter: Some('/'),
            name: "[Gmail]".to_string(),
        };
        assert!(!parent.is_selectable());
    }
}
