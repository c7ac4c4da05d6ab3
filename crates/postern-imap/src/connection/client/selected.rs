//! Message-level commands on the selected mailbox.

use chrono::{DateTime, FixedOffset};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::states::{Authenticated, Selected};
use super::{Client, Reply, Step};
use crate::command::{Command, FetchAttribute, SearchKey, StoreAction};
use crate::connection::idle::IdleHandle;
use crate::parser::{FetchItem, UntaggedResponse};
use crate::types::{Capability, CopyUid, Flag, Flags, ResponseCode, SequenceSet, Uid};
use crate::{Error, Result};

/// One `FETCH` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Sequence number at the time of the response.
    pub seq: u32,
    /// Returned items.
    pub items: Vec<FetchItem>,
}

impl FetchResponse {
    /// The `UID` item.
    #[must_use]
    pub fn uid(&self) -> Option<Uid> {
        self.items.iter().find_map(|i| match i {
            FetchItem::Uid(uid) => Some(*uid),
            _ => None,
        })
    }

    /// The `FLAGS` item.
    #[must_use]
    pub fn flags(&self) -> Option<&Flags> {
        self.items.iter().find_map(|i| match i {
            FetchItem::Flags(flags) => Some(flags),
            _ => None,
        })
    }

    /// The `INTERNALDATE` item.
    #[must_use]
    pub fn internal_date(&self) -> Option<DateTime<FixedOffset>> {
        self.items.iter().find_map(|i| match i {
            FetchItem::InternalDate(date) => Some(*date),
            _ => None,
        })
    }

    /// The `RFC822.SIZE` item.
    #[must_use]
    pub fn size(&self) -> Option<u32> {
        self.items.iter().find_map(|i| match i {
            FetchItem::Size(size) => Some(*size),
            _ => None,
        })
    }

    /// The first body section returned, whatever its section spec.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.items.iter().find_map(|i| match i {
            FetchItem::Body { data, .. } => data.as_deref(),
            _ => None,
        })
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.state.mailbox()
    }

    /// Searches by UID.
    pub async fn uid_search(&mut self, keys: Vec<SearchKey>) -> Result<Vec<Uid>> {
        let reply = self.run(Command::UidSearch(keys)).await?;
        Ok(reply
            .untagged
            .iter()
            .filter_map(|u| match u {
                UntaggedResponse::Search(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .filter_map(|&id| Uid::new(id))
            .collect())
    }

    /// Fetches `attributes` for the UIDs in `set`.
    ///
    /// Unsolicited FETCH responses without a UID (flag updates for other
    /// messages) are dropped.
    pub async fn uid_fetch(
        &mut self,
        set: &SequenceSet,
        attributes: Vec<FetchAttribute>,
    ) -> Result<Vec<FetchResponse>> {
        let reply = self
            .run(Command::UidFetch {
                set: set.clone(),
                attributes,
            })
            .await?;
        Ok(reply
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::Fetch { seq, items } => Some(FetchResponse { seq, items }),
                _ => None,
            })
            .filter(|response| response.uid().is_some())
            .collect())
    }

    /// Changes flags on the UIDs in `set`, silently.
    pub async fn uid_store(&mut self, set: &SequenceSet, action: StoreAction, flags: &Flags) -> Result<()> {
        self.run(Command::UidStore {
            set: set.clone(),
            action,
            flags: flags.clone(),
        })
        .await
        .map(drop)
    }

    /// Copies the UIDs in `set` to `mailbox`.
    ///
    /// Returns the UID mapping when the server supports UIDPLUS.
    pub async fn uid_copy(&mut self, set: &SequenceSet, mailbox: &str) -> Result<Option<CopyUid>> {
        let reply = self
            .run(Command::UidCopy {
                set: set.clone(),
                mailbox: mailbox.to_string(),
            })
            .await?;
        Ok(self.copy_uid(&reply))
    }

    /// Moves the UIDs in `set` to `mailbox`.
    ///
    /// Uses `UID MOVE` when available. Otherwise copies, flags the
    /// originals `\Deleted` and expunges them, with `UID EXPUNGE` when
    /// UIDPLUS allows so other deleted messages stay untouched.
    pub async fn uid_move(&mut self, set: &SequenceSet, mailbox: &str) -> Result<Option<CopyUid>> {
        if self.has_capability(&Capability::Move) {
            let reply = self
                .run(Command::UidMove {
                    set: set.clone(),
                    mailbox: mailbox.to_string(),
                })
                .await?;
            return Ok(self.copy_uid(&reply));
        }

        debug!(mailbox, "No MOVE support, copying and expunging");
        let mapping = self.uid_copy(set, mailbox).await?;
        let deleted: Flags = [Flag::Deleted].into_iter().collect();
        self.uid_store(set, StoreAction::Add, &deleted).await?;
        if self.has_capability(&Capability::UidPlus) {
            self.uid_expunge(set).await?;
        } else {
            self.expunge().await?;
        }
        Ok(mapping)
    }

    /// Expunges only the UIDs in `set` (UIDPLUS).
    pub async fn uid_expunge(&mut self, set: &SequenceSet) -> Result<()> {
        if !self.has_capability(&Capability::UidPlus) {
            return Err(Error::MissingCapability("UIDPLUS".to_string()));
        }
        self.run(Command::UidExpunge(set.clone())).await.map(drop)
    }

    /// Expunges every `\Deleted` message.
    pub async fn expunge(&mut self) -> Result<()> {
        self.run(Command::Expunge).await.map(drop)
    }

    /// Closes the mailbox, expunging `\Deleted` messages if it was opened
    /// read-write.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        self.execute(Command::Close).await?;
        Ok(self.into_state(Authenticated))
    }

    /// Returns to the authenticated state without telling the server.
    ///
    /// Every authenticated-state command stays valid while a mailbox is
    /// selected, and the next SELECT replaces the selection. Nothing is
    /// expunged.
    #[must_use]
    pub fn deselect(self) -> Client<S, Authenticated> {
        self.into_state(Authenticated)
    }

    /// Enters IDLE (RFC 2177).
    pub async fn idle(&mut self) -> Result<IdleHandle<'_, S>> {
        if !self.has_capability(&Capability::Idle) {
            return Err(Error::MissingCapability("IDLE".to_string()));
        }
        let tag = self.send(&Command::Idle).await?;
        let mut untagged = Vec::new();
        let step = self.read_step(&tag, &mut untagged).await?;
        self.track(&untagged);
        match step {
            Step::Continue(_) => Ok(IdleHandle::new(&mut self.stream, tag)),
            Step::Done(condition) => Reply {
                untagged,
                condition,
            }
            .ok()
            .and(Err(Error::Protocol("server completed IDLE immediately".to_string()))),
        }
    }

    /// Runs a command and applies mailbox updates it carried.
    async fn run(&mut self, command: Command) -> Result<Reply> {
        let tag = self.send(&command).await?;
        let reply = self.collect(&tag).await?;
        self.track(&reply.untagged);
        reply.ok()
    }

    fn track(&mut self, untagged: &[UntaggedResponse]) {
        let status = &mut self.state.status;
        for data in untagged {
            match data {
                UntaggedResponse::Exists(n) => status.exists = *n,
                UntaggedResponse::Recent(n) => status.recent = *n,
                UntaggedResponse::Expunge(_) => status.exists = status.exists.saturating_sub(1),
                _ => {}
            }
        }
    }

    fn copy_uid(&self, reply: &Reply) -> Option<CopyUid> {
        if !self.has_capability(&Capability::UidPlus) {
            return None;
        }
        reply.codes().find_map(|code| match code {
            ResponseCode::CopyUid(copy) => Some(copy.clone()),
            _ => None,
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

    #[test]
    fn test_fetch_response_accessors() {
        let response = FetchResponse {
            seq: 4,
            items: vec![
                FetchItem::Uid(Uid::new(42).unwrap()),
                FetchItem::Size(1024),
                FetchItem::Flags([Flag::Seen].into_iter().collect()),
                FetchItem::Body {
                    section: "HEADER".to_string(),
                    origin: None,
                    data: Some(b"Subject: hi\r\n\r\n".to_vec()),
                },
            ],
        };

        assert_eq!(response.uid().unwrap().get(), 42);
        assert_eq!(response.size(), Some(1024));
        assert!(response.flags().unwrap().contains(&Flag::Seen));
        assert_eq!(response.body(), Some(&b"Subject: hi\r\n\r\n"[..]));
        assert!(response.internal_date().is_none());
    }
}
