//! Type-state markers for the IMAP connection states.
//!
//! `Selected` carries the mailbox snapshot SELECT returned and keeps it
//! current as EXISTS and RECENT updates arrive.

use crate::types::{MailboxStatus, Uid, UidValidity};

/// Connected, not yet logged in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated {
    pub(crate) preauth: bool,
}

impl NotAuthenticated {
    /// Returns true if the greeting was `PREAUTH`.
    #[must_use]
    pub const fn is_preauthenticated(&self) -> bool {
        self.preauth
    }
}

/// Logged in, no mailbox selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// A mailbox is selected.
#[derive(Debug, Clone)]
pub struct Selected {
    pub(crate) mailbox: String,
    pub(crate) status: MailboxStatus,
}

impl Selected {
    /// Creates the state for `mailbox`.
    #[must_use]
    pub fn new(mailbox: impl Into<String>, status: MailboxStatus) -> Self {
        Self {
            mailbox: mailbox.into(),
            status,
        }
    }

    /// Selected mailbox name.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Snapshot from SELECT/EXAMINE with later EXISTS/RECENT applied.
    #[must_use]
    pub const fn status(&self) -> &MailboxStatus {
        &self.status
    }

    /// Current message count.
    #[must_use]
    pub const fn exists(&self) -> u32 {
        self.status.exists
    }

    /// UIDVALIDITY, when the server reported one.
    #[must_use]
    pub const fn uid_validity(&self) -> Option<UidValidity> {
        self.status.uid_validity
    }

    /// Predicted next UID, when the server reported one.
    #[must_use]
    pub const fn uid_next(&self) -> Option<Uid> {
        self.status.uid_next
    }

    /// Returns true if opened with EXAMINE or reported `READ-ONLY`.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.status.read_only
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

    fn _assert_send<T: Send>() {}
    fn _assert_sync<T: Sync>() {}

    #[test]
    fn test_state_markers_are_send_sync() {
        _assert_send::<NotAuthenticated>();
        _assert_sync::<NotAuthenticated>();
        _assert_send::<Authenticated>();
        _assert_send::<Selected>();
        _assert_sync::<Selected>();
    }

    #[test]
    fn test_selected_accessors() {
        let status = MailboxStatus {
            exists: 100,
            recent: 5,
            uid_validity: UidValidity::new(12345),
            uid_next: Uid::new(200),
            read_only: true,
            ..Default::default()
        };
        let selected = Selected::new("Archive", status);

        assert_eq!(selected.mailbox(), "Archive");
        assert_eq!(selected.exists(), 100);
        assert_eq!(selected.uid_validity().map(UidValidity::get), Some(12345));
        assert_eq!(selected.uid_next().map(Uid::get), Some(200));
        assert!(selected.is_read_only());
    }
}
