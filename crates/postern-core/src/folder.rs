//! Remote folder model.

use std::fmt;

use postern_imap::{ListEntry, MailboxAttribute};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FolderType {
    /// Inbox folder.
    Inbox,
    /// Sent mail folder.
    Sent,
    /// Drafts folder.
    Drafts,
    /// Trash folder.
    Trash,
    /// Spam/junk folder.
    Spam,
    /// Archive folder.
    Archive,
    /// Local outbox. Never advertised by a server.
    Outbox,
    /// Regular folder.
    #[default]
    Regular,
}

/// The folder type has no RFC 6154 special-use attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("folder type {0:?} has no IMAP special-use attribute")]
pub struct NoImapAttribute(pub FolderType);

impl FolderType {
    /// IMAP special-use attribute announcing this folder type.
    ///
    /// # Errors
    ///
    /// [`FolderType::Inbox`], [`FolderType::Outbox`] and
    /// [`FolderType::Regular`] have no attribute.
    pub const fn imap_attribute(self) -> Result<&'static str, NoImapAttribute> {
        match self {
            Self::Drafts => Ok("\\Drafts"),
            Self::Sent => Ok("\\Sent"),
            Self::Trash => Ok("\\Trash"),
            Self::Spam => Ok("\\Junk"),
            Self::Archive => Ok("\\Archive"),
            Self::Inbox | Self::Outbox | Self::Regular => Err(NoImapAttribute(self)),
        }
    }

    /// Folder type announced by a special-use attribute.
    ///
    /// `\All` and `\Flagged` are virtual folders and map to nothing.
    #[must_use]
    pub const fn from_attribute(attribute: &MailboxAttribute) -> Option<Self> {
        match attribute {
            MailboxAttribute::Drafts => Some(Self::Drafts),
            MailboxAttribute::Sent => Some(Self::Sent),
            MailboxAttribute::Trash => Some(Self::Trash),
            MailboxAttribute::Junk => Some(Self::Spam),
            MailboxAttribute::Archive => Some(Self::Archive),
            _ => None,
        }
    }
}

impl fmt::Display for FolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inbox => "INBOX",
            Self::Sent => "SENT",
            Self::Drafts => "DRAFTS",
            Self::Trash => "TRASH",
            Self::Spam => "SPAM",
            Self::Archive => "ARCHIVE",
            Self::Outbox => "OUTBOX",
            Self::Regular => "REGULAR",
        })
    }
}

/// A folder as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFolder {
    /// Name the server knows the folder by.
    pub server_id: String,
    /// Name shown to the user.
    pub display_name: String,
    /// Folder role.
    #[serde(rename = "type")]
    pub folder_type: FolderType,
}

impl RemoteFolder {
    /// The single folder a POP3 account has.
    #[must_use]
    pub fn pop3_inbox() -> Self {
        Self {
            server_id: "INBOX".to_string(),
            display_name: "Inbox".to_string(),
            folder_type: FolderType::Inbox,
        }
    }

    /// Builds a folder from a LIST entry, or `None` if it cannot be selected.
    ///
    /// `INBOX` is always typed [`FolderType::Inbox`]. `prefix` is stripped
    /// from the display name.
    #[must_use]
    pub fn from_list_entry(entry: &ListEntry, prefix: &str) -> Option<Self> {
        if !entry.is_selectable() {
            return None;
        }
        let folder_type = if entry.is_inbox() {
            FolderType::Inbox
        } else {
            entry
                .special_use()
                .and_then(FolderType::from_attribute)
                .unwrap_or_default()
        };
        let display_name = entry
            .name
            .strip_prefix(prefix)
            .filter(|rest| !rest.is_empty())
            .unwrap_or(&entry.name)
            .to_string();
        Some(Self {
            server_id: entry.name.clone(),
            display_name,
            folder_type,
        })
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

    fn entry(name: &str, attributes: &[&str]) -> ListEntry {
        ListEntry {
            attributes: attributes.iter().map(|a| MailboxAttribute::parse(a)).collect(),
            delimiter: Some('/'),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_imap_attribute_mapping() {
        assert_eq!(FolderType::Drafts.imap_attribute(), Ok("\\Drafts"));
        assert_eq!(FolderType::Sent.imap_attribute(), Ok("\\Sent"));
        assert_eq!(FolderType::Trash.imap_attribute(), Ok("\\Trash"));
        assert_eq!(FolderType::Spam.imap_attribute(), Ok("\\Junk"));
        assert_eq!(FolderType::Archive.imap_attribute(), Ok("\\Archive"));
    }

    #[test]
    fn test_types_without_attribute() {
        for folder_type in [FolderType::Inbox, FolderType::Outbox, FolderType::Regular] {
            assert_eq!(folder_type.imap_attribute(), Err(NoImapAttribute(folder_type)));
        }
    }

    #[test]
    fn test_attribute_round_trip() {
        for folder_type in [
            FolderType::Drafts,
            FolderType::Sent,
            FolderType::Trash,
            FolderType::Spam,
            FolderType::Archive,
        ] {
            let attribute = MailboxAttribute::parse(folder_type.imap_attribute().unwrap());
            assert_eq!(FolderType::from_attribute(&attribute), Some(folder_type));
        }
        assert_eq!(FolderType::from_attribute(&MailboxAttribute::All), None);
    }

    #[test]
    fn test_from_list_entry() {
        let inbox = RemoteFolder::from_list_entry(&entry("inbox", &["\\HasNoChildren"]), "").unwrap();
        assert_eq!(inbox.folder_type, FolderType::Inbox);

        let junk = RemoteFolder::from_list_entry(&entry("[Gmail]/Spam", &["\\Junk"]), "[Gmail]/").unwrap();
        assert_eq!(junk.folder_type, FolderType::Spam);
        assert_eq!(junk.server_id, "[Gmail]/Spam");
        assert_eq!(junk.display_name, "Spam");

        let plain = RemoteFolder::from_list_entry(&entry("Receipts", &[]), "").unwrap();
        assert_eq!(plain.folder_type, FolderType::Regular);

        assert!(RemoteFolder::from_list_entry(&entry("[Gmail]", &["\\Noselect"]), "").is_none());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&RemoteFolder::pop3_inbox()).unwrap();
        assert_eq!(json, r#"{"serverId":"INBOX","displayName":"Inbox","type":"INBOX"}"#);
    }
}
