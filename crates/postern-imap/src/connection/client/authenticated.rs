//! Mailbox-level commands.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::states::{Authenticated, Selected};
use super::{Client, Reply, Step};
use crate::command::Command;
use crate::parser::UntaggedResponse;
use crate::types::{
    Capability, Flags, ListEntry, MailboxStatus, ResponseCode, StatusAttribute, StatusData, Uid,
};
use crate::{Error, Result};

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Lists mailboxes matching `pattern` under `reference`.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let reply = self
            .execute(Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(reply
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::List(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }

    /// Opens `mailbox` read-write.
    pub async fn select(self, mailbox: &str) -> Result<Client<S, Selected>> {
        self.open(mailbox, false).await
    }

    /// Opens `mailbox` read-only.
    pub async fn examine(self, mailbox: &str) -> Result<Client<S, Selected>> {
        self.open(mailbox, true).await
    }

    async fn open(mut self, mailbox: &str, read_only: bool) -> Result<Client<S, Selected>> {
        let command = if read_only {
            Command::Examine(mailbox.to_string())
        } else {
            Command::Select(mailbox.to_string())
        };
        let reply = self.execute(command).await?;
        let status = mailbox_status(&reply, read_only);
        debug!(
            mailbox,
            exists = status.exists,
            uid_validity = ?status.uid_validity.map(crate::types::UidValidity::get),
            "Mailbox opened"
        );
        Ok(self.into_state(Selected::new(mailbox, status)))
    }

    /// Asks for counters of a mailbox without selecting it.
    pub async fn status(
        &mut self,
        mailbox: &str,
        attributes: &[StatusAttribute],
    ) -> Result<StatusData> {
        let reply = self
            .execute(Command::Status {
                mailbox: mailbox.to_string(),
                attributes: attributes.to_vec(),
            })
            .await?;
        reply
            .untagged
            .into_iter()
            .find_map(|u| match u {
                UntaggedResponse::Status(data) => Some(data),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol(format!("no STATUS data for {mailbox}")))
    }

    /// Creates a mailbox.
    pub async fn create(&mut self, mailbox: &str) -> Result<()> {
        self.execute(Command::Create(mailbox.to_string())).await.map(drop)
    }

    /// Appends `message` to `mailbox`.
    ///
    /// Returns the new UID when the server supports UIDPLUS and reported
    /// `APPENDUID`.
    pub async fn append(&mut self, mailbox: &str, flags: &Flags, message: &[u8]) -> Result<Option<Uid>> {
        let tag = self
            .send(&Command::Append {
                mailbox: mailbox.to_string(),
                flags: flags.clone(),
                size: message.len(),
            })
            .await?;

        let mut untagged = Vec::new();
        match self.read_step(&tag, &mut untagged).await? {
            Step::Continue(_) => {}
            Step::Done(condition) => {
                // Rejected before the literal, e.g. TRYCREATE.
                return Reply {
                    untagged,
                    condition,
                }
                .ok()
                .map(|_| None);
            }
        }
        self.send_line(message).await?;

        let reply = self.collect(&tag).await?.ok()?;
        if !self.has_capability(&Capability::UidPlus) {
            return Ok(None);
        }
        Ok(reply.codes().find_map(|code| match code {
            ResponseCode::AppendUid { uid, .. } => Some(*uid),
            _ => None,
        }))
    }
}

/// Builds the mailbox snapshot from a SELECT/EXAMINE reply.
fn mailbox_status(reply: &Reply, examine: bool) -> MailboxStatus {
    let mut status = MailboxStatus {
        read_only: examine,
        ..MailboxStatus::default()
    };
    for data in &reply.untagged {
        match data {
            UntaggedResponse::Exists(n) => status.exists = *n,
            UntaggedResponse::Recent(n) => status.recent = *n,
            UntaggedResponse::Flags(flags) => status.flags = flags.clone(),
            _ => {}
        }
    }
    for code in reply.codes() {
        match code {
            ResponseCode::UidValidity(v) => status.uid_validity = Some(*v),
            ResponseCode::UidNext(uid) => status.uid_next = Some(*uid),
            ResponseCode::PermanentFlags(flags) => status.permanent_flags = flags.clone(),
            ResponseCode::ReadOnly => status.read_only = true,
            _ => {}
        }
    }
    status
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
    use crate::parser::{Response, ResponseParser};

    fn reply(lines: &[&str]) -> Reply {
        let mut untagged = Vec::new();
        let mut condition = None;
        for line in lines {
            match ResponseParser::parse(line.as_bytes()).unwrap() {
                Response::Untagged(u) => untagged.push(u),
                Response::Tagged { condition: c, .. } => condition = Some(c),
                Response::Continuation(_) => unreachable!(),
            }
        }
        Reply {
            untagged,
            condition: condition.unwrap(),
        }
    }

    #[test]
    fn test_mailbox_status_from_select() {
        let reply = reply(&[
            "* FLAGS (\\Answered \\Seen)\r\n",
            "* 172 EXISTS\r\n",
            "* 1 RECENT\r\n",
            "* OK [UIDVALIDITY 3857529045] UIDs valid\r\n",
            "* OK [UIDNEXT 4392] Predicted next UID\r\n",
            "* OK [PERMANENTFLAGS (\\Seen \\*)] Limited\r\n",
            "A0002 OK [READ-WRITE] SELECT completed\r\n",
        ]);
        let status = mailbox_status(&reply, false);

        assert_eq!(status.exists, 172);
        assert_eq!(status.recent, 1);
        assert_eq!(status.uid_validity.unwrap().get(), 3857529045);
        assert_eq!(status.uid_next.unwrap().get(), 4392);
        assert_eq!(status.flags.len(), 2);
        assert!(!status.read_only);
    }

    #[test]
    fn test_mailbox_status_read_only_code() {
        let reply = reply(&["* 0 EXISTS\r\n", "A0002 OK [READ-ONLY] done\r\n"]);
        assert!(mailbox_status(&reply, false).read_only);
        assert!(mailbox_status(&reply, true).read_only);
    }
}
