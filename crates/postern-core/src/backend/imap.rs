//! IMAP backend.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postern_imap::{
    Authenticated, Capability, Client, FetchAttribute, FetchResponse, IdleHandle, SearchKey, Selected,
    SequenceSet, StoreAction, Uid, UidValidity,
};
use postern_transport::MailStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::connector::{Connector, ImapSession};
use super::{Backend, IdleEvent, apply_folder_list, smtp};
use crate::fetcher::list_imap_folders;
use crate::folder::RemoteFolder;
use crate::message::{DownloadState, Flag, FlagSet, OutgoingMessage, StoredMessage, flags_from_imap, flags_to_imap};
use crate::pool::{ConnectionPool, FolderLocks, Lease, Reusable};
use crate::storage::BackendStorage;
use crate::sync::{ExpungePolicy, FolderStatus, RemoteMailbox, RemoteMessage, SyncConfig, SyncEngine, SyncListener, SyncResult};
use crate::{Error, Result};

type SelectedSession = Client<MailStream, Selected>;

impl Reusable for ImapSession {
    fn is_reusable(&self) -> bool {
        !self.is_poisoned()
    }
}

/// [`Backend`] for IMAP accounts.
///
/// Operations borrow a connection from a bounded per-account pool, select
/// the folder they work on and return the connection afterwards. IDLE uses
/// its own connection so it never holds a pool slot.
pub struct ImapBackend {
    incoming: Connector,
    outgoing: Option<Connector>,
    storage: Arc<dyn BackendStorage>,
    pool: ConnectionPool<ImapSession>,
    locks: FolderLocks,
    expunge_policy: ExpungePolicy,
}

impl fmt::Debug for ImapBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapBackend")
            .field("incoming", &self.incoming)
            .field("outgoing", &self.outgoing)
            .field("pool_size", &self.pool.size())
            .field("expunge_policy", &self.expunge_policy)
            .finish_non_exhaustive()
    }
}

impl ImapBackend {
    /// Creates a backend with at most `pool_size` simultaneous connections.
    #[must_use]
    pub fn new(
        incoming: Connector,
        outgoing: Option<Connector>,
        storage: Arc<dyn BackendStorage>,
        pool_size: usize,
        expunge_policy: ExpungePolicy,
    ) -> Self {
        Self {
            incoming,
            outgoing,
            storage,
            pool: ConnectionPool::new(pool_size),
            locks: FolderLocks::new(),
            expunge_policy,
        }
    }

    async fn lease(&self) -> Result<Lease<'_, ImapSession>> {
        self.pool.acquire(|| self.incoming.imap()).await
    }

    async fn transfer(
        &self,
        source: &str,
        destination: &str,
        server_ids: &[String],
        keep_source: bool,
    ) -> Result<HashMap<String, String>> {
        let Some(set) = uid_set(server_ids)? else {
            return Ok(HashMap::new());
        };
        let mut lease = self.lease().await?;
        let mut selected = checkout(&mut lease)?.select(source).await?;
        let outcome = if keep_source {
            selected.uid_copy(&set, destination).await
        } else {
            selected.uid_move(&set, destination).await
        };
        lease.restore(selected.deselect());

        let mapping = outcome?.map(|copy| copy.mapping()).unwrap_or_default();
        debug!(source, destination, count = server_ids.len(), keep_source, "Messages transferred");
        Ok(mapping
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect())
    }
}

#[async_trait]
impl Backend for ImapBackend {
    fn supports_flags(&self) -> bool {
        true
    }

    fn supports_expunge(&self) -> bool {
        true
    }

    fn supports_move(&self) -> bool {
        true
    }

    fn supports_upload(&self) -> bool {
        true
    }

    fn is_push_capable(&self) -> bool {
        true
    }

    fn max_parallel_syncs(&self) -> usize {
        self.pool.size()
    }

    async fn refresh_folder_list(&self) -> Result<Vec<RemoteFolder>> {
        let folders = {
            let mut lease = self.lease().await?;
            let session = lease.connection().ok_or(Error::PoolClosed)?;
            list_imap_folders(session, self.incoming.settings().path_prefix()).await?
        };
        apply_folder_list(self.storage.as_ref(), &folders)?;
        info!(count = folders.len(), "Folder list refreshed");
        Ok(folders)
    }

    async fn sync(
        &self,
        folder: &str,
        config: &SyncConfig,
        listener: &dyn SyncListener,
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        let _guard = self.locks.lock(folder).await;
        let mut mailbox = ImapMailbox::new(PooledSession::new(self));
        SyncEngine::new(self.storage.as_ref(), config, listener, cancel)
            .sync(&mut mailbox, folder)
            .await
    }

    async fn download_message(&self, folder: &str, server_id: &str) -> Result<()> {
        let uid = parse_uid(server_id)?;
        let set = SequenceSet::uid(uid);
        let mut lease = self.lease().await?;
        let mut selected = checkout(&mut lease)?.examine(folder).await?;
        let outcome = selected
            .uid_fetch(
                &set,
                vec![
                    FetchAttribute::Uid,
                    FetchAttribute::Flags,
                    FetchAttribute::InternalDate,
                    FetchAttribute::Size,
                    FetchAttribute::BodyPeek(String::new()),
                ],
            )
            .await;
        lease.restore(selected.deselect());

        let response = outcome?
            .into_iter()
            .find(|r| r.uid() == Some(uid))
            .ok_or_else(|| Error::Remote(format!("message {server_id} not found in {folder}")))?;
        let data = response
            .body()
            .ok_or_else(|| Error::Remote(format!("no body returned for UID {uid}")))?
            .to_vec();
        let size = response
            .size()
            .unwrap_or_else(|| u32::try_from(data.len()).unwrap_or(u32::MAX));

        self.storage.folder(folder)?.save_message(StoredMessage {
            server_id: server_id.to_string(),
            date: response.internal_date().map(|d| d.with_timezone(&Utc)),
            size,
            flags: response.flags().map(flags_from_imap).unwrap_or_default(),
            data,
            download: DownloadState::Full,
        })?;
        Ok(())
    }

    async fn set_flags(&self, folder: &str, server_ids: &[String], flag: Flag, value: bool) -> Result<()> {
        let Some(set) = uid_set(server_ids)? else {
            return Ok(());
        };
        let flags = flags_to_imap([&flag]);
        let action = if value { StoreAction::Add } else { StoreAction::Remove };

        let mut lease = self.lease().await?;
        let mut selected = checkout(&mut lease)?.select(folder).await?;
        let outcome = selected.uid_store(&set, action, &flags).await;
        lease.restore(selected.deselect());
        outcome?;

        debug!(folder, ?flag, value, count = server_ids.len(), "Flags stored");
        Ok(())
    }

    async fn move_messages(
        &self,
        source: &str,
        destination: &str,
        server_ids: &[String],
    ) -> Result<HashMap<String, String>> {
        self.transfer(source, destination, server_ids, false).await
    }

    async fn copy_messages(
        &self,
        source: &str,
        destination: &str,
        server_ids: &[String],
    ) -> Result<HashMap<String, String>> {
        self.transfer(source, destination, server_ids, true).await
    }

    async fn delete_messages(&self, folder: &str, server_ids: &[String]) -> Result<()> {
        let Some(set) = uid_set(server_ids)? else {
            return Ok(());
        };
        let expunge = self.expunge_policy == ExpungePolicy::Immediately;

        let mut lease = self.lease().await?;
        let mut selected = checkout(&mut lease)?.select(folder).await?;
        let outcome = mark_deleted(&mut selected, &set, expunge).await;
        lease.restore(selected.deselect());
        outcome?;

        debug!(folder, count = server_ids.len(), expunge, "Messages deleted");
        Ok(())
    }

    async fn expunge(&self, folder: &str) -> Result<()> {
        let mut lease = self.lease().await?;
        let mut selected = checkout(&mut lease)?.select(folder).await?;
        let outcome = selected.expunge().await;
        lease.restore(selected.deselect());
        Ok(outcome?)
    }

    async fn upload_message(&self, folder: &str, flags: &FlagSet, message: &[u8]) -> Result<Option<String>> {
        let mut lease = self.lease().await?;
        let session = lease.connection().ok_or(Error::PoolClosed)?;
        let uid = session.append(folder, &flags_to_imap(flags), message).await?;
        debug!(folder, size = message.len(), ?uid, "Message uploaded");
        Ok(uid.map(|uid| uid.to_string()))
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<()> {
        smtp::send(self.outgoing.as_ref(), message).await
    }

    async fn check_incoming_server_settings(&self) -> Result<()> {
        let session = self.incoming.imap().await?;
        session.logout().await?;
        Ok(())
    }

    async fn check_outgoing_server_settings(&self) -> Result<()> {
        smtp::check(self.outgoing.as_ref()).await
    }

    async fn idle(&self, folder: &str) -> Result<IdleEvent> {
        let session = self.incoming.imap().await?;
        let mut selected = session.examine(folder).await?;
        let budget = self.incoming.timeouts().idle;

        let event = {
            let mut handle = selected.idle().await?;
            let event = wait_for_change(&mut handle, budget).await;
            if event.is_ok() {
                handle.done().await?;
            }
            event?
        };
        debug!(folder, ?event, "IDLE returned");

        if let Err(e) = selected.logout().await {
            debug!(?e, "Logout after IDLE failed");
        }
        Ok(event)
    }
}

/// Where the sync mailbox gets its authenticated session from.
#[async_trait]
trait SessionSource: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn checkout(&mut self) -> Result<Client<Self::Stream, Authenticated>>;

    fn checkin(&mut self, session: Client<Self::Stream, Authenticated>);
}

/// A pool slot, leased on first use so connect and login failures surface
/// through the sync engine like any other failure.
struct PooledSession<'a> {
    backend: &'a ImapBackend,
    lease: Option<Lease<'a, ImapSession>>,
}

impl<'a> PooledSession<'a> {
    const fn new(backend: &'a ImapBackend) -> Self {
        Self { backend, lease: None }
    }
}

#[async_trait]
impl SessionSource for PooledSession<'_> {
    type Stream = MailStream;

    async fn checkout(&mut self) -> Result<ImapSession> {
        if self.lease.is_none() {
            self.lease = Some(self.backend.lease().await?);
        }
        self.lease.as_mut().and_then(Lease::take).ok_or(Error::PoolClosed)
    }

    fn checkin(&mut self, session: ImapSession) {
        if let Some(lease) = self.lease.as_mut() {
            lease.restore(session);
        }
    }
}

/// [`RemoteMailbox`] over one IMAP session.
struct ImapMailbox<S: SessionSource> {
    source: S,
    selected: Option<Client<S::Stream, Selected>>,
}

impl<S: SessionSource> ImapMailbox<S> {
    const fn new(source: S) -> Self {
        Self { source, selected: None }
    }

    async fn session(&mut self) -> Result<Client<S::Stream, Authenticated>> {
        match self.selected.take() {
            Some(selected) => Ok(selected.deselect()),
            None => self.source.checkout().await,
        }
    }

    fn selected(&mut self) -> Result<&mut Client<S::Stream, Selected>> {
        self.selected
            .as_mut()
            .ok_or_else(|| Error::Remote("no folder is open".into()))
    }
}

impl<S: SessionSource> Drop for ImapMailbox<S> {
    fn drop(&mut self) {
        if let Some(selected) = self.selected.take() {
            self.source.checkin(selected.deselect());
        }
    }
}

#[async_trait]
impl<S: SessionSource> RemoteMailbox for ImapMailbox<S> {
    fn supports_flags(&self) -> bool {
        true
    }

    fn supports_expunge(&self) -> bool {
        true
    }

    async fn expunge(&mut self, folder: &str) -> Result<()> {
        let mut selected = self.session().await?.select(folder).await?;
        let outcome = selected.expunge().await;
        self.source.checkin(selected.deselect());
        Ok(outcome?)
    }

    async fn open(&mut self, folder: &str) -> Result<FolderStatus> {
        let selected = self.session().await?.examine(folder).await?;
        let state = selected.state();
        let status = FolderStatus {
            message_count: state.exists(),
            uid_validity: state.uid_validity().map(UidValidity::get),
        };
        self.selected = Some(selected);
        Ok(status)
    }

    async fn headers(&mut self, start: u32, end: u32) -> Result<Vec<RemoteMessage>> {
        let Some(range) = SequenceSet::range(start, end) else {
            return Ok(Vec::new());
        };
        let selected = self.selected()?;
        let uids = selected.uid_search(vec![SearchKey::Sequence(range)]).await?;
        let Some(set) = SequenceSet::from_uids(&uids) else {
            return Ok(Vec::new());
        };
        let responses = selected
            .uid_fetch(
                &set,
                vec![
                    FetchAttribute::Uid,
                    FetchAttribute::Flags,
                    FetchAttribute::InternalDate,
                    FetchAttribute::Size,
                ],
            )
            .await?;

        let mut messages: Vec<RemoteMessage> = responses.iter().filter_map(remote_message).collect();
        messages.sort_by_key(|m| m.number);
        Ok(messages)
    }

    async fn download(&mut self, message: &RemoteMessage, headers_only: bool) -> Result<Vec<u8>> {
        let uid = message
            .uid
            .and_then(Uid::new)
            .ok_or_else(|| Error::InvalidServerId(message.server_id.clone()))?;
        let section = if headers_only { "HEADER" } else { "" };
        let responses = self
            .selected()?
            .uid_fetch(
                &SequenceSet::uid(uid),
                vec![FetchAttribute::Uid, FetchAttribute::BodyPeek(section.to_string())],
            )
            .await?;
        responses
            .iter()
            .find(|r| r.uid() == Some(uid))
            .and_then(FetchResponse::body)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::Remote(format!("no body returned for UID {uid}")))
    }

    async fn has_messages_before(&mut self, start: u32, earliest: Option<DateTime<Utc>>) -> Result<bool> {
        let Some(range) = SequenceSet::range(1, start.saturating_sub(1)) else {
            return Ok(false);
        };
        let mut keys = vec![SearchKey::Sequence(range), SearchKey::NotDeleted];
        if let Some(earliest) = earliest {
            keys.push(SearchKey::Since(earliest.date_naive()));
        }
        Ok(!self.selected()?.uid_search(keys).await?.is_empty())
    }
}

fn remote_message(response: &FetchResponse) -> Option<RemoteMessage> {
    let uid = response.uid()?;
    Some(RemoteMessage {
        number: response.seq,
        server_id: uid.to_string(),
        uid: Some(uid.get()),
        flags: response.flags().map(flags_from_imap).unwrap_or_default(),
        date: response.internal_date().map(|d| d.with_timezone(&Utc)),
        size: response.size().unwrap_or(0),
    })
}

async fn mark_deleted(selected: &mut SelectedSession, set: &SequenceSet, expunge: bool) -> postern_imap::Result<()> {
    selected
        .uid_store(set, StoreAction::Add, &flags_to_imap([&Flag::Deleted]))
        .await?;
    if !expunge {
        return Ok(());
    }
    if selected.has_capability(&Capability::UidPlus) {
        selected.uid_expunge(set).await
    } else {
        selected.expunge().await
    }
}

async fn wait_for_change(handle: &mut IdleHandle<'_, MailStream>, budget: Duration) -> Result<IdleEvent> {
    use postern_imap::IdleEvent as Imap;

    let deadline = Instant::now() + budget;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = match handle.wait(remaining).await? {
            Imap::Exists(count) => IdleEvent::NewMail(count),
            Imap::Expunge(seq) => IdleEvent::Expunge(seq),
            Imap::Fetch { seq, .. } => IdleEvent::FlagsChanged(seq),
            Imap::Timeout => IdleEvent::Timeout,
            // RECENT always comes with EXISTS.
            Imap::Recent(_) => continue,
        };
        return Ok(event);
    }
}

fn checkout(lease: &mut Lease<'_, ImapSession>) -> Result<ImapSession> {
    lease.take().ok_or(Error::PoolClosed)
}

fn parse_uid(server_id: &str) -> Result<Uid> {
    server_id
        .parse::<u32>()
        .ok()
        .and_then(Uid::new)
        .ok_or_else(|| Error::InvalidServerId(server_id.to_string()))
}

fn uid_set(server_ids: &[String]) -> Result<Option<SequenceSet>> {
    let uids = server_ids
        .iter()
        .map(|id| parse_uid(id))
        .collect::<Result<Vec<_>>>()?;
    Ok(SequenceSet::from_uids(&uids))
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
    use chrono::TimeZone;
    use postern_sasl::{AuthType, Credentials};
    use postern_transport::Timeouts;
    use tokio_test::io::{Builder, Mock};

    use super::*;
    use crate::storage::{BackendFolder, EXTRA_HIGHEST_KNOWN_UID, EXTRA_UID_VALIDITY, MemoryStorage, MoreMessages};
    use crate::sync::NoopListener;

    const PREAUTH: &[u8] = b"* PREAUTH [CAPABILITY IMAP4rev1 UIDPLUS] ready\r\n";

    struct ScriptedSession(Option<Client<Mock, Authenticated>>);

    #[async_trait]
    impl SessionSource for ScriptedSession {
        type Stream = Mock;

        async fn checkout(&mut self) -> Result<Client<Mock, Authenticated>> {
            self.0.take().ok_or(Error::PoolClosed)
        }

        fn checkin(&mut self, session: Client<Mock, Authenticated>) {
            self.0 = Some(session);
        }
    }

    async fn mailbox(mock: Mock) -> ImapMailbox<ScriptedSession> {
        let client = Client::connect(mock, Timeouts::default())
            .await
            .unwrap()
            .authenticate(&Credentials::password(AuthType::Plain, "u", "p"))
            .await
            .unwrap();
        ImapMailbox::new(ScriptedSession(Some(client)))
    }

    async fn sync(
        storage: &MemoryStorage,
        mailbox: &mut ImapMailbox<ScriptedSession>,
        config: &SyncConfig,
    ) -> SyncResult {
        let cancel = CancellationToken::new();
        SyncEngine::new(storage, config, &NoopListener, &cancel)
            .sync(mailbox, "INBOX")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sync_lists_window_and_downloads_by_size() {
        let mock = Builder::new()
            .read(PREAUTH)
            .write(b"A0001 EXAMINE INBOX\r\n")
            .read(b"* 3 EXISTS\r\n* OK [UIDVALIDITY 7] valid\r\nA0001 OK [READ-ONLY] done\r\n")
            .write(b"A0002 UID SEARCH 2:3\r\n")
            .read(b"* SEARCH 11 12\r\nA0002 OK done\r\n")
            .write(b"A0003 UID FETCH 11:12 (UID FLAGS INTERNALDATE RFC822.SIZE)\r\n")
            .read(b"* 2 FETCH (UID 11 FLAGS (\\Seen) INTERNALDATE \"01-Jun-2024 10:00:00 +0000\" RFC822.SIZE 16)\r\n")
            .read(b"* 3 FETCH (UID 12 FLAGS () INTERNALDATE \"02-Jun-2024 10:00:00 +0000\" RFC822.SIZE 5000)\r\n")
            .read(b"A0003 OK done\r\n")
            .write(b"A0004 UID FETCH 12 (UID BODY.PEEK[HEADER])\r\n")
            .read(b"* 3 FETCH (UID 12 BODY[HEADER] {14}\r\nSubject: b\r\n\r\n)\r\nA0004 OK done\r\n")
            .write(b"A0005 UID FETCH 11 (UID BODY.PEEK[])\r\n")
            .read(b"* 2 FETCH (UID 11 BODY[] {16}\r\nSubject: a\r\n\r\nhi)\r\nA0005 OK done\r\n")
            .write(b"A0006 UID SEARCH 1 NOT DELETED\r\n")
            .read(b"* SEARCH 10\r\nA0006 OK done\r\n")
            .build();
        let storage = MemoryStorage::with_folders(["INBOX"]);
        storage.memory_folder("INBOX").unwrap().set_visible_limit(Some(2));
        let config = SyncConfig {
            max_download_size: Some(1_000),
            ..SyncConfig::default()
        };

        let result = sync(&storage, &mut mailbox(mock).await, &config).await;

        assert_eq!(result.added, vec!["12".to_string(), "11".to_string()]);
        let folder = storage.memory_folder("INBOX").unwrap();
        let large = folder.message("12").unwrap();
        assert_eq!(large.download, DownloadState::Partial);
        assert_eq!(large.size, 5_000);
        assert_eq!(large.data, b"Subject: b\r\n\r\n");
        let small = folder.message("11").unwrap();
        assert_eq!(small.download, DownloadState::Full);
        assert_eq!(small.data, b"Subject: a\r\n\r\nhi");
        assert_eq!(small.flags, FlagSet::from([Flag::Seen]));
        assert_eq!(small.date, Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        assert_eq!(folder.more_messages().unwrap(), MoreMessages::True);
        assert_eq!(folder.extra_number(EXTRA_UID_VALIDITY).unwrap(), Some(7));
        assert_eq!(folder.extra_number(EXTRA_HIGHEST_KNOWN_UID).unwrap(), Some(12));
    }

    #[tokio::test]
    async fn test_more_messages_search_is_bounded_by_earliest_poll_date() {
        let mock = Builder::new()
            .read(PREAUTH)
            .write(b"A0001 EXAMINE INBOX\r\n")
            .read(b"* 2 EXISTS\r\n* OK [UIDVALIDITY 7] valid\r\nA0001 OK done\r\n")
            .write(b"A0002 UID SEARCH 2\r\n")
            .read(b"* SEARCH 11\r\nA0002 OK done\r\n")
            .write(b"A0003 UID FETCH 11 (UID FLAGS INTERNALDATE RFC822.SIZE)\r\n")
            .read(b"* 2 FETCH (UID 11 FLAGS () INTERNALDATE \"01-Jun-2024 10:00:00 +0000\" RFC822.SIZE 16)\r\n")
            .read(b"A0003 OK done\r\n")
            .write(b"A0004 UID FETCH 11 (UID BODY.PEEK[])\r\n")
            .read(b"* 2 FETCH (UID 11 BODY[] {16}\r\nSubject: a\r\n\r\nhi)\r\nA0004 OK done\r\n")
            .write(b"A0005 UID SEARCH 1 NOT DELETED SINCE 1-Jan-2024\r\n")
            .read(b"* SEARCH\r\nA0005 OK done\r\n")
            .build();
        let storage = MemoryStorage::with_folders(["INBOX"]);
        storage.memory_folder("INBOX").unwrap().set_visible_limit(Some(1));
        let config = SyncConfig {
            earliest_poll_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ..SyncConfig::default()
        };

        let result = sync(&storage, &mut mailbox(mock).await, &config).await;

        assert_eq!(result.added, vec!["11".to_string()]);
        let folder = storage.folder("INBOX").unwrap();
        assert_eq!(folder.more_messages().unwrap(), MoreMessages::False);
    }

    #[tokio::test]
    async fn test_nothing_before_the_first_message() {
        let mut mailbox = mailbox(Builder::new().read(PREAUTH).build()).await;
        assert!(!mailbox.has_messages_before(1, None).await.unwrap());
    }

    #[test]
    fn test_uid_set_rejects_garbage() {
        assert!(uid_set(&["12".into(), "x".into()]).is_err());
        assert!(matches!(parse_uid("0"), Err(Error::InvalidServerId(_))));
        assert!(uid_set(&[]).unwrap().is_none());
        assert_eq!(uid_set(&["3".into(), "4".into()]).unwrap().unwrap().len(), 2);
    }
}
