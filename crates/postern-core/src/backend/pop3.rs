//! POP3 backend.
//!
//! POP3 has a single folder, no flags and no server-side folders to move
//! between. Every operation opens its own connection and ends it with
//! `QUIT`, which is also what commits `DELE`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use postern_pop3::{Client, Transaction};
use postern_transport::MailStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connector::{Connector, Pop3Session};
use super::{Backend, apply_folder_list, smtp};
use crate::folder::RemoteFolder;
use crate::message::{DownloadState, FlagSet, OutgoingMessage, StoredMessage};
use crate::pool::FolderLocks;
use crate::storage::BackendStorage;
use crate::sync::{FolderStatus, RemoteMailbox, RemoteMessage, SyncConfig, SyncEngine, SyncListener, SyncResult};
use crate::{Error, Result};

const INBOX: &str = "INBOX";

/// [`Backend`] for POP3 accounts.
pub struct Pop3Backend {
    incoming: Connector,
    outgoing: Option<Connector>,
    storage: Arc<dyn BackendStorage>,
    locks: FolderLocks,
}

impl fmt::Debug for Pop3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pop3Backend")
            .field("incoming", &self.incoming)
            .field("outgoing", &self.outgoing)
            .finish_non_exhaustive()
    }
}

impl Pop3Backend {
    /// Creates a backend.
    #[must_use]
    pub fn new(incoming: Connector, outgoing: Option<Connector>, storage: Arc<dyn BackendStorage>) -> Self {
        Self {
            incoming,
            outgoing,
            storage,
            locks: FolderLocks::new(),
        }
    }
}

#[async_trait]
impl Backend for Pop3Backend {
    async fn refresh_folder_list(&self) -> Result<Vec<RemoteFolder>> {
        let folders = vec![RemoteFolder::pop3_inbox()];
        apply_folder_list(self.storage.as_ref(), &folders)?;
        Ok(folders)
    }

    async fn sync(
        &self,
        folder: &str,
        config: &SyncConfig,
        listener: &dyn SyncListener,
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        require_inbox(folder)?;
        let _guard = self.locks.lock(folder).await;
        let mut mailbox = Pop3Mailbox::new(&self.incoming);
        let result = SyncEngine::new(self.storage.as_ref(), config, listener, cancel)
            .sync(&mut mailbox, folder)
            .await;
        mailbox.quit().await;
        result
    }

    async fn download_message(&self, folder: &str, server_id: &str) -> Result<()> {
        require_inbox(folder)?;
        let mut session = self.incoming.pop3().await?;
        let number = message_number(&mut session, server_id).await?;
        let data = session.retr(number).await?;
        quit(session).await;

        let size = u32::try_from(data.len()).unwrap_or(u32::MAX);
        self.storage.folder(folder)?.save_message(StoredMessage {
            server_id: server_id.to_string(),
            date: None,
            size,
            flags: FlagSet::new(),
            data,
            download: DownloadState::Full,
        })?;
        Ok(())
    }

    async fn delete_messages(&self, folder: &str, server_ids: &[String]) -> Result<()> {
        require_inbox(folder)?;
        if server_ids.is_empty() {
            return Ok(());
        }
        let session = self.incoming.pop3().await?;
        delete_by_uid(session, server_ids).await?;
        debug!(count = server_ids.len(), "Messages deleted");
        Ok(())
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<()> {
        smtp::send(self.outgoing.as_ref(), message).await
    }

    async fn check_incoming_server_settings(&self) -> Result<()> {
        let session = self.incoming.pop3().await?;
        session.quit().await?;
        Ok(())
    }

    async fn check_outgoing_server_settings(&self) -> Result<()> {
        smtp::check(self.outgoing.as_ref()).await
    }
}

/// Opens logged-in POP3 sessions.
#[async_trait]
trait Pop3Connect: Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self) -> Result<Client<Self::Stream, Transaction>>;
}

#[async_trait]
impl Pop3Connect for Connector {
    type Stream = MailStream;

    async fn connect(&self) -> Result<Pop3Session> {
        self.pop3().await
    }
}

/// [`RemoteMailbox`] over one POP3 connection, opened on first use.
struct Pop3Mailbox<'a, C: Pop3Connect> {
    connector: &'a C,
    session: Option<Client<C::Stream, Transaction>>,
}

impl<'a, C: Pop3Connect> Pop3Mailbox<'a, C> {
    const fn new(connector: &'a C) -> Self {
        Self {
            connector,
            session: None,
        }
    }

    async fn session(&mut self) -> Result<&mut Client<C::Stream, Transaction>> {
        let session = match self.session.take() {
            Some(session) => session,
            None => self.connector.connect().await?,
        };
        Ok(self.session.insert(session))
    }

    async fn quit(self) {
        if let Some(session) = self.session {
            quit(session).await;
        }
    }
}

#[async_trait]
impl<C: Pop3Connect> RemoteMailbox for Pop3Mailbox<'_, C> {
    fn supports_flags(&self) -> bool {
        false
    }

    fn supports_expunge(&self) -> bool {
        false
    }

    async fn expunge(&mut self, _folder: &str) -> Result<()> {
        Err(Error::Unsupported("POP3 has no expunge".into()))
    }

    async fn open(&mut self, folder: &str) -> Result<FolderStatus> {
        require_inbox(folder)?;
        let stat = self.session().await?.stat().await?;
        Ok(FolderStatus {
            message_count: stat.count,
            uid_validity: None,
        })
    }

    async fn headers(&mut self, start: u32, end: u32) -> Result<Vec<RemoteMessage>> {
        let session = self.session().await?;
        let sizes: HashMap<u32, u64> = session
            .list()
            .await?
            .into_iter()
            .map(|entry| (entry.number, entry.size))
            .collect();
        let mut messages: Vec<RemoteMessage> = session
            .uidl()
            .await?
            .into_iter()
            .filter(|entry| (start..=end).contains(&entry.number))
            .map(|entry| RemoteMessage {
                number: entry.number,
                size: sizes
                    .get(&entry.number)
                    .map_or(0, |&size| u32::try_from(size).unwrap_or(u32::MAX)),
                server_id: entry.uid,
                uid: None,
                flags: FlagSet::new(),
                date: None,
            })
            .collect();
        messages.sort_by_key(|m| m.number);
        Ok(messages)
    }

    async fn download(&mut self, message: &RemoteMessage, headers_only: bool) -> Result<Vec<u8>> {
        let session = self.session().await?;
        let data = if headers_only {
            session.top(message.number, 0).await?
        } else {
            session.retr(message.number).await?
        };
        Ok(data)
    }
}

fn require_inbox(folder: &str) -> Result<()> {
    if folder.eq_ignore_ascii_case(INBOX) {
        Ok(())
    } else {
        Err(Error::Unsupported(format!("POP3 has no folder {folder}")))
    }
}

async fn message_number<S>(session: &mut Client<S, Transaction>, server_id: &str) -> Result<u32>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session
        .uidl()
        .await?
        .into_iter()
        .find(|entry| entry.uid == server_id)
        .map(|entry| entry.number)
        .ok_or_else(|| Error::Remote(format!("message {server_id} is no longer on the server")))
}

/// Marks the messages with these UIDLs and commits with `QUIT`. Ids the
/// server no longer lists are skipped.
async fn delete_by_uid<S>(mut session: Client<S, Transaction>, server_ids: &[String]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let numbers: HashMap<String, u32> = session
        .uidl()
        .await?
        .into_iter()
        .map(|entry| (entry.uid, entry.number))
        .collect();
    for id in server_ids {
        match numbers.get(id) {
            Some(&number) => session.dele(number).await?,
            None => debug!(id, "Message already gone from server"),
        }
    }
    session.quit().await?;
    Ok(())
}

async fn quit<S>(session: Client<S, Transaction>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = session.quit().await {
        debug!(?e, "POP3 QUIT failed");
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
    use std::sync::Mutex;

    use postern_sasl::{AuthType, Credentials};
    use postern_transport::Timeouts;
    use tokio_test::io::{Builder, Mock};

    use super::*;
    use crate::storage::{BackendFolder, EXTRA_UID_VALIDITY, MemoryStorage, MoreMessages};
    use crate::sync::NoopListener;

    /// Server side up to a logged-in TRANSACTION state.
    fn script() -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"+OK POP3 ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nUIDL\r\nTOP\r\nUSER\r\n.\r\n")
            .write(b"USER u\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS p\r\n")
            .read(b"+OK\r\n");
        builder
    }

    async fn login(mock: Mock) -> Client<Mock, Transaction> {
        Client::connect(mock, Timeouts::default())
            .await
            .unwrap()
            .authenticate(&Credentials::password(AuthType::Plain, "u", "p"))
            .await
            .unwrap()
    }

    struct ScriptedConnector(Mutex<Option<Client<Mock, Transaction>>>);

    #[async_trait]
    impl Pop3Connect for ScriptedConnector {
        type Stream = Mock;

        async fn connect(&self) -> Result<Client<Mock, Transaction>> {
            self.0
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| Error::Remote("already connected".into()))
        }
    }

    #[tokio::test]
    async fn test_sync_lists_and_downloads_by_size() {
        let mock = script()
            .write(b"STAT\r\n")
            .read(b"+OK 2 5020\r\n")
            .write(b"LIST\r\n")
            .read(b"+OK\r\n1 20\r\n2 5000\r\n.\r\n")
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 aaa\r\n2 bbb\r\n.\r\n")
            .write(b"TOP 2 0\r\n")
            .read(b"+OK\r\nSubject: b\r\n\r\n.\r\n")
            .write(b"RETR 1\r\n")
            .read(b"+OK\r\nSubject: a\r\n\r\nhi\r\n.\r\n")
            .write(b"QUIT\r\n")
            .read(b"+OK bye\r\n")
            .build();
        let connector = ScriptedConnector(Mutex::new(Some(login(mock).await)));
        let storage = MemoryStorage::with_folders([INBOX]);
        let config = SyncConfig {
            max_download_size: Some(100),
            ..SyncConfig::default()
        };
        let cancel = CancellationToken::new();

        let mut mailbox = Pop3Mailbox::new(&connector);
        let result = SyncEngine::new(&storage, &config, &NoopListener, &cancel)
            .sync(&mut mailbox, INBOX)
            .await
            .unwrap();
        mailbox.quit().await;

        assert_eq!(result.added, vec!["bbb".to_string(), "aaa".to_string()]);
        let folder = storage.memory_folder(INBOX).unwrap();
        let large = folder.message("bbb").unwrap();
        assert_eq!(large.download, DownloadState::Partial);
        assert_eq!(large.size, 5_000);
        assert_eq!(large.data, b"Subject: b\r\n\r\n");
        let small = folder.message("aaa").unwrap();
        assert_eq!(small.download, DownloadState::Full);
        assert_eq!(small.data, b"Subject: a\r\n\r\nhi\r\n");
        assert_eq!(folder.more_messages().unwrap(), MoreMessages::False);
        assert_eq!(folder.extra_number(EXTRA_UID_VALIDITY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_other_folders_are_rejected_before_connecting() {
        let connector = ScriptedConnector(Mutex::new(None));
        let mut mailbox = Pop3Mailbox::new(&connector);
        let err = mailbox.open("Sent").await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_delete_by_uid_skips_unknown_ids_and_commits() {
        let mock = script()
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 aaa\r\n2 bbb\r\n.\r\n")
            .write(b"DELE 2\r\n")
            .read(b"+OK message 2 deleted\r\n")
            .write(b"QUIT\r\n")
            .read(b"+OK bye\r\n")
            .build();

        delete_by_uid(login(mock).await, &["bbb".to_string(), "gone".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_message_number_reports_missing_message() {
        let mock = script()
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 aaa\r\n.\r\n")
            .build();
        let err = message_number(&mut login(mock).await, "bbb").await.unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
    }
}
