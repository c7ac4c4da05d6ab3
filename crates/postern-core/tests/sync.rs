//! Folder and account sync against scripted servers and in-memory storage.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use postern_core::storage::{
    BackendFolder, BackendStorage, EXTRA_HIGHEST_KNOWN_UID, EXTRA_UID_VALIDITY, MemoryStorage, MoreMessages,
};
use postern_core::sync::{FolderStatus, RemoteMailbox, RemoteMessage, SyncEngine};
use postern_core::{
    Backend, DownloadState, Error, ErrorKind, Flag, FlagSet, OutgoingMessage, RemoteFolder, Result, RetryPolicy,
    StoredMessage, SyncConfig, SyncListener, SyncResult, sync_account,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct FakeRemote {
    uid_validity: Option<u32>,
    messages: Vec<RemoteMessage>,
    fail_open: Option<String>,
    downloads: Vec<(String, bool)>,
}

impl FakeRemote {
    fn imap(uid_validity: u32, uids: &[u32]) -> Self {
        let messages = uids
            .iter()
            .zip(1..)
            .map(|(&uid, number)| RemoteMessage {
                number,
                server_id: uid.to_string(),
                uid: Some(uid),
                flags: FlagSet::new(),
                date: Some(date(2024, 6, 1)),
                size: 100,
            })
            .collect();
        Self {
            uid_validity: Some(uid_validity),
            messages,
            fail_open: None,
            downloads: Vec::new(),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            fail_open: Some(message.to_string()),
            ..Self::imap(1, &[])
        }
    }

    fn message_mut(&mut self, server_id: &str) -> &mut RemoteMessage {
        self.messages.iter_mut().find(|m| m.server_id == server_id).unwrap()
    }

    /// Drops a message the way an expunge does: later messages move down.
    fn remove(&mut self, server_id: &str) {
        self.messages.retain(|m| m.server_id != server_id);
        self.renumber();
    }

    fn renumber(&mut self) {
        for (message, number) in self.messages.iter_mut().zip(1..) {
            message.number = number;
        }
    }
}

#[async_trait]
impl RemoteMailbox for FakeRemote {
    fn supports_flags(&self) -> bool {
        true
    }

    fn supports_expunge(&self) -> bool {
        true
    }

    async fn expunge(&mut self, _folder: &str) -> Result<()> {
        self.messages.retain(|m| !m.flags.contains(&Flag::Deleted));
        self.renumber();
        Ok(())
    }

    async fn open(&mut self, _folder: &str) -> Result<FolderStatus> {
        if let Some(message) = &self.fail_open {
            return Err(Error::Remote(message.clone()));
        }
        Ok(FolderStatus {
            message_count: u32::try_from(self.messages.len()).unwrap(),
            uid_validity: self.uid_validity,
        })
    }

    async fn headers(&mut self, start: u32, end: u32) -> Result<Vec<RemoteMessage>> {
        Ok(self
            .messages
            .iter()
            .filter(|m| (start..=end).contains(&m.number))
            .cloned()
            .collect())
    }

    async fn download(&mut self, message: &RemoteMessage, headers_only: bool) -> Result<Vec<u8>> {
        self.downloads.push((message.server_id.clone(), headers_only));
        let header = format!("Subject: message {}\r\n\r\n", message.server_id);
        if headers_only {
            Ok(header.into_bytes())
        } else {
            Ok(format!("{header}body").into_bytes())
        }
    }

    async fn has_messages_before(&mut self, start: u32, earliest: Option<DateTime<Utc>>) -> Result<bool> {
        Ok(self.messages.iter().any(|m| {
            m.number < start
                && !m.flags.contains(&Flag::Deleted)
                && earliest.zip(m.date).is_none_or(|(earliest, date)| date >= earliest)
        }))
    }
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SyncListener for RecordingListener {
    fn sync_started(&self, folder: &str) {
        self.push(format!("started {folder}"));
    }

    fn sync_new_message(&self, folder: &str, server_id: &str) {
        self.push(format!("new {folder} {server_id}"));
    }

    fn sync_finished(&self, folder: &str) {
        self.push(format!("finished {folder}"));
    }

    fn sync_failed(&self, folder: &str, message: &str) {
        self.push(format!("failed {folder} {message}"));
    }
}

fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

async fn sync(
    storage: &MemoryStorage,
    remote: &mut FakeRemote,
    config: &SyncConfig,
    folder: &str,
) -> Result<SyncResult> {
    let cancel = CancellationToken::new();
    SyncEngine::new(storage, config, &RecordingListener::default(), &cancel)
        .sync(remote, folder)
        .await
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_second_sync_of_unchanged_folder_writes_nothing() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(7, &[10, 11, 12]);
    remote.message_mut("11").flags.insert(Flag::Seen);
    let config = SyncConfig::default();

    let first = sync(&storage, &mut remote, &config, "INBOX").await.unwrap();
    assert_eq!(first.added, ids(&["12", "11", "10"]));
    let writes = storage.write_count();

    let second = sync(&storage, &mut remote, &config, "INBOX").await.unwrap();
    assert!(second.is_empty());
    assert_eq!(storage.write_count(), writes);

    let folder = storage.folder("INBOX").unwrap();
    assert_eq!(folder.extra_number(EXTRA_UID_VALIDITY).unwrap(), Some(7));
    assert_eq!(folder.extra_number(EXTRA_HIGHEST_KNOWN_UID).unwrap(), Some(12));
    assert_eq!(folder.more_messages().unwrap(), MoreMessages::False);
    assert!(folder.last_checked().unwrap().is_some());
}

#[tokio::test]
async fn test_new_messages_download_newest_first() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2, 3]);
    sync(&storage, &mut remote, &SyncConfig::default(), "INBOX").await.unwrap();

    let order: Vec<&str> = remote.downloads.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, ["3", "2", "1"]);
}

#[tokio::test]
async fn test_uid_validity_change_discards_local_messages() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    sync(&storage, &mut FakeRemote::imap(7, &[1, 2, 3]), &SyncConfig::default(), "INBOX")
        .await
        .unwrap();

    // Same UIDs would collide with the old ones if kept.
    let mut renumbered = FakeRemote::imap(8, &[1]);
    let result = sync(&storage, &mut renumbered, &SyncConfig::default(), "INBOX")
        .await
        .unwrap();

    assert_eq!(result.added, ids(&["1"]));
    assert!(result.removed.is_empty());
    let folder = storage.memory_folder("INBOX").unwrap();
    assert_eq!(folder.message_ids(), ids(&["1"]));
    assert_eq!(folder.extra_number(EXTRA_UID_VALIDITY).unwrap(), Some(8));
    assert_eq!(folder.extra_number(EXTRA_HIGHEST_KNOWN_UID).unwrap(), Some(1));
}

#[tokio::test]
async fn test_flag_changes_and_remote_deletions() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2, 3]);
    let config = SyncConfig::default();
    sync(&storage, &mut remote, &config, "INBOX").await.unwrap();

    remote.remove("2");
    remote.message_mut("1").flags = FlagSet::from([Flag::Seen, Flag::Flagged]);
    let result = sync(&storage, &mut remote, &config, "INBOX").await.unwrap();

    assert_eq!(result.updated, ids(&["1"]));
    assert_eq!(result.removed, ids(&["2"]));
    assert!(result.added.is_empty());
    let folder = storage.folder("INBOX").unwrap();
    assert_eq!(
        folder.message_flags("1").unwrap(),
        Some(FlagSet::from([Flag::Seen, Flag::Flagged]))
    );
    assert_eq!(folder.message_flags("2").unwrap(), None);
}

#[tokio::test]
async fn test_remote_deletions_can_be_disabled() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    let config = SyncConfig {
        sync_remote_deletions: false,
        ..SyncConfig::default()
    };
    sync(&storage, &mut remote, &config, "INBOX").await.unwrap();

    remote.messages.clear();
    let result = sync(&storage, &mut remote, &config, "INBOX").await.unwrap();
    assert!(result.removed.is_empty());
    assert_eq!(storage.memory_folder("INBOX").unwrap().message_ids(), ids(&["1", "2"]));
}

#[tokio::test]
async fn test_local_deletion_survives_flag_sync() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    let config = SyncConfig::default();
    sync(&storage, &mut remote, &config, "INBOX").await.unwrap();

    let folder = storage.folder("INBOX").unwrap();
    folder.set_message_flags("1", &FlagSet::from([Flag::Deleted])).unwrap();
    remote.message_mut("1").flags.insert(Flag::Seen);
    let result = sync(&storage, &mut remote, &config, "INBOX").await.unwrap();

    assert!(result.is_empty());
    assert_eq!(folder.message_flags("1").unwrap(), Some(FlagSet::from([Flag::Deleted])));
}

#[tokio::test]
async fn test_remote_deleted_flag_follows_remote_deletions_setting() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    let keep = SyncConfig {
        sync_remote_deletions: false,
        ..SyncConfig::default()
    };
    sync(&storage, &mut remote, &keep, "INBOX").await.unwrap();

    remote.message_mut("1").flags = FlagSet::from([Flag::Deleted, Flag::Seen]);
    let result = sync(&storage, &mut remote, &keep, "INBOX").await.unwrap();
    assert!(result.updated.is_empty());
    let folder = storage.folder("INBOX").unwrap();
    assert_eq!(folder.message_flags("1").unwrap(), Some(FlagSet::new()));

    let result = sync(&storage, &mut remote, &SyncConfig::default(), "INBOX").await.unwrap();
    assert_eq!(result.updated, ids(&["1"]));
    assert_eq!(folder.message_flags("1").unwrap(), Some(FlagSet::from([Flag::Deleted])));
}

#[tokio::test]
async fn test_sync_flags_limits_mirrored_flags() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    let config = SyncConfig {
        sync_flags: FlagSet::from([Flag::Seen]),
        ..SyncConfig::default()
    };
    sync(&storage, &mut remote, &config, "INBOX").await.unwrap();

    remote.message_mut("1").flags = FlagSet::from([Flag::Seen, Flag::Flagged]);
    remote.message_mut("2").flags = FlagSet::from([Flag::Answered]);
    let result = sync(&storage, &mut remote, &config, "INBOX").await.unwrap();

    assert_eq!(result.updated, ids(&["1"]));
    let folder = storage.folder("INBOX").unwrap();
    assert_eq!(folder.message_flags("1").unwrap(), Some(FlagSet::from([Flag::Seen])));
    assert_eq!(folder.message_flags("2").unwrap(), Some(FlagSet::new()));
}

#[tokio::test]
async fn test_envelope_only_message_is_downloaded() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let folder = storage.memory_folder("INBOX").unwrap();
    folder
        .save_message(StoredMessage {
            server_id: "1".to_string(),
            date: Some(date(2024, 6, 1)),
            size: 100,
            flags: FlagSet::from([Flag::Seen]),
            data: Vec::new(),
            download: DownloadState::Envelope,
        })
        .unwrap();
    let mut remote = FakeRemote::imap(1, &[1]);
    remote.message_mut("1").flags = FlagSet::from([Flag::Seen, Flag::Flagged]);

    let result = sync(&storage, &mut remote, &SyncConfig::default(), "INBOX").await.unwrap();

    assert_eq!(result.added, ids(&["1"]));
    assert!(result.updated.is_empty());
    assert_eq!(remote.downloads, vec![("1".to_string(), false)]);
    let stored = folder.message("1").unwrap();
    assert_eq!(stored.download, DownloadState::Full);
    assert_eq!(stored.data, b"Subject: message 1\r\n\r\nbody");
    assert_eq!(stored.flags, FlagSet::from([Flag::Seen, Flag::Flagged]));
}

#[tokio::test]
async fn test_partial_message_is_completed_once_the_limit_allows() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    remote.message_mut("2").size = 5_000;
    let limited = SyncConfig {
        max_download_size: Some(1_000),
        ..SyncConfig::default()
    };
    sync(&storage, &mut remote, &limited, "INBOX").await.unwrap();

    let again = sync(&storage, &mut remote, &limited, "INBOX").await.unwrap();
    assert!(again.is_empty());
    assert_eq!(remote.downloads.len(), 2);

    let unlimited = sync(&storage, &mut remote, &SyncConfig::default(), "INBOX").await.unwrap();
    assert_eq!(unlimited.added, ids(&["2"]));
    assert_eq!(remote.downloads.last(), Some(&("2".to_string(), false)));
    let folder = storage.memory_folder("INBOX").unwrap();
    assert_eq!(folder.message("2").unwrap().download, DownloadState::Full);
}

#[tokio::test]
async fn test_large_messages_are_downloaded_partially() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    remote.message_mut("2").size = 5_000;
    let config = SyncConfig {
        max_download_size: Some(1_000),
        ..SyncConfig::default()
    };
    sync(&storage, &mut remote, &config, "INBOX").await.unwrap();

    let folder = storage.memory_folder("INBOX").unwrap();
    let large = folder.message("2").unwrap();
    assert_eq!(large.download, DownloadState::Partial);
    assert_eq!(large.size, 5_000);
    assert_eq!(large.data, b"Subject: message 2\r\n\r\n");
    assert_eq!(folder.message("1").unwrap().download, DownloadState::Full);
}

#[tokio::test]
async fn test_earliest_poll_date_skips_old_messages() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    remote.message_mut("1").date = Some(date(2020, 1, 1));
    let config = SyncConfig {
        earliest_poll_date: Some(date(2023, 1, 1)),
        ..SyncConfig::default()
    };

    let result = sync(&storage, &mut remote, &config, "INBOX").await.unwrap();
    assert_eq!(result.added, ids(&["2"]));
}

#[tokio::test]
async fn test_raising_earliest_poll_date_prunes_old_local_messages() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    remote.message_mut("1").date = Some(date(2020, 1, 1));
    sync(&storage, &mut remote, &SyncConfig::default(), "INBOX").await.unwrap();

    let keep = SyncConfig {
        earliest_poll_date: Some(date(2023, 1, 1)),
        sync_remote_deletions: false,
        ..SyncConfig::default()
    };
    let result = sync(&storage, &mut remote, &keep, "INBOX").await.unwrap();
    assert!(result.is_empty());

    let prune = SyncConfig {
        earliest_poll_date: Some(date(2023, 1, 1)),
        ..SyncConfig::default()
    };
    let result = sync(&storage, &mut remote, &prune, "INBOX").await.unwrap();
    assert_eq!(result.removed, ids(&["1"]));
    assert_eq!(storage.memory_folder("INBOX").unwrap().message_ids(), ids(&["2"]));
}

#[tokio::test]
async fn test_more_messages_ignores_messages_before_earliest_poll_date() {
    let mut remote = FakeRemote::imap(1, &[1, 2, 3]);
    remote.message_mut("1").date = Some(date(2020, 1, 1));
    remote.message_mut("2").date = Some(date(2021, 1, 1));

    let storage = MemoryStorage::with_folders(["INBOX"]);
    storage.memory_folder("INBOX").unwrap().set_visible_limit(Some(1));
    let config = SyncConfig {
        earliest_poll_date: Some(date(2023, 1, 1)),
        ..SyncConfig::default()
    };
    let result = sync(&storage, &mut remote, &config, "INBOX").await.unwrap();
    assert_eq!(result.added, ids(&["3"]));
    let folder = storage.folder("INBOX").unwrap();
    assert_eq!(folder.more_messages().unwrap(), MoreMessages::False);

    // Growing the window without new history keeps the answer.
    storage.memory_folder("INBOX").unwrap().set_visible_limit(Some(2));
    sync(&storage, &mut remote, &config, "INBOX").await.unwrap();
    assert_eq!(folder.more_messages().unwrap(), MoreMessages::False);

    let storage = MemoryStorage::with_folders(["INBOX"]);
    storage.memory_folder("INBOX").unwrap().set_visible_limit(Some(1));
    sync(&storage, &mut remote, &SyncConfig::default(), "INBOX").await.unwrap();
    assert_eq!(storage.folder("INBOX").unwrap().more_messages().unwrap(), MoreMessages::True);
}

#[tokio::test]
async fn test_more_messages_ignores_deleted_history() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    storage.memory_folder("INBOX").unwrap().set_visible_limit(Some(1));
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    remote.message_mut("1").flags.insert(Flag::Deleted);

    sync(&storage, &mut remote, &SyncConfig::default(), "INBOX").await.unwrap();
    assert_eq!(storage.folder("INBOX").unwrap().more_messages().unwrap(), MoreMessages::False);
}

#[tokio::test]
async fn test_visible_limit_windows_the_newest_messages() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    storage.memory_folder("INBOX").unwrap().set_visible_limit(Some(2));
    let mut remote = FakeRemote::imap(1, &[1, 2, 3, 4, 5]);

    let result = sync(&storage, &mut remote, &SyncConfig::default(), "INBOX").await.unwrap();
    assert_eq!(result.added, ids(&["5", "4"]));
    let folder = storage.folder("INBOX").unwrap();
    assert_eq!(folder.more_messages().unwrap(), MoreMessages::True);
    assert_eq!(folder.extra_number(EXTRA_HIGHEST_KNOWN_UID).unwrap(), Some(5));
}

#[tokio::test]
async fn test_new_messages_marked_deleted_are_skipped() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    remote.message_mut("1").flags.insert(Flag::Deleted);

    let result = sync(&storage, &mut remote, &SyncConfig::default(), "INBOX").await.unwrap();
    assert_eq!(result.added, ids(&["2"]));
}

#[tokio::test]
async fn test_failure_sets_folder_status_and_success_clears_it() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let listener = RecordingListener::default();
    let cancel = CancellationToken::new();
    let config = SyncConfig::default();
    let engine = SyncEngine::new(&storage, &config, &listener, &cancel);

    let err = engine
        .sync(&mut FakeRemote::failing("mailbox locked"), "INBOX")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    let folder = storage.folder("INBOX").unwrap();
    assert_eq!(folder.status().unwrap(), Some(err.root_cause_message()));
    assert_eq!(
        listener.events(),
        vec![
            "started INBOX".to_string(),
            format!("failed INBOX {}", err.root_cause_message()),
        ]
    );

    engine.sync(&mut FakeRemote::imap(1, &[]), "INBOX").await.unwrap();
    assert_eq!(folder.status().unwrap(), None);
}

#[tokio::test]
async fn test_cancelled_sync_returns_cancelled_and_writes_no_messages() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let config = SyncConfig::default();

    let err = SyncEngine::new(&storage, &config, &RecordingListener::default(), &cancel)
        .sync(&mut FakeRemote::imap(1, &[1, 2]), "INBOX")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    let folder = storage.memory_folder("INBOX").unwrap();
    assert!(folder.message_ids().is_empty());
    assert_eq!(folder.status().unwrap(), None);
}

#[tokio::test]
async fn test_unknown_folder_fails() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let err = sync(&storage, &mut FakeRemote::imap(1, &[1]), &SyncConfig::default(), "Nope")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

/// Backend whose folders are scripted remotes over one in-memory store.
struct FakeBackend {
    storage: MemoryStorage,
    remotes: Mutex<HashMap<String, FakeRemote>>,
    transient_failures: AtomicU32,
}

impl FakeBackend {
    fn new(remotes: impl IntoIterator<Item = (&'static str, FakeRemote)>) -> Self {
        let remotes: HashMap<String, FakeRemote> = remotes.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let storage = MemoryStorage::with_folders(remotes.keys().map(String::as_str));
        Self {
            storage,
            remotes: Mutex::new(remotes),
            transient_failures: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn max_parallel_syncs(&self) -> usize {
        3
    }

    async fn refresh_folder_list(&self) -> Result<Vec<RemoteFolder>> {
        Ok(Vec::new())
    }

    async fn sync(
        &self,
        folder: &str,
        config: &SyncConfig,
        listener: &dyn SyncListener,
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let reset = postern_transport::Error::from(io::Error::from(io::ErrorKind::ConnectionReset));
            return Err(reset.into());
        }
        let mut remote = self.remotes.lock().unwrap().get(folder).cloned().unwrap();
        SyncEngine::new(&self.storage, config, listener, cancel)
            .sync(&mut remote, folder)
            .await
    }

    async fn download_message(&self, _folder: &str, _server_id: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_messages(&self, _folder: &str, _server_ids: &[String]) -> Result<()> {
        Ok(())
    }

    async fn send_message(&self, _message: &OutgoingMessage) -> Result<()> {
        Ok(())
    }

    async fn check_incoming_server_settings(&self) -> Result<()> {
        Ok(())
    }

    async fn check_outgoing_server_settings(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failing_folder_does_not_affect_siblings() {
    let backend = FakeBackend::new([
        ("A", FakeRemote::imap(1, &[1, 2])),
        ("B", FakeRemote::failing("folder is broken")),
        ("C", FakeRemote::imap(1, &[5])),
    ]);
    let listener = RecordingListener::default();

    let outcomes = sync_account(
        &backend,
        &ids(&["A", "B", "C"]),
        &SyncConfig::default(),
        &RetryPolicy::default(),
        &listener,
        &CancellationToken::new(),
    )
    .await;

    let folders: Vec<&str> = outcomes.iter().map(|o| o.folder.as_str()).collect();
    assert_eq!(folders, ["A", "B", "C"]);
    assert_eq!(outcomes[0].result.as_ref().unwrap().added, ids(&["2", "1"]));
    assert!(outcomes[1].result.is_err());
    // Protocol failures are not retried.
    assert_eq!(outcomes[1].attempts, 1);
    assert_eq!(outcomes[2].result.as_ref().unwrap().added, ids(&["5"]));

    assert_eq!(backend.storage.memory_folder("A").unwrap().message_ids(), ids(&["1", "2"]));
    assert_eq!(backend.storage.memory_folder("C").unwrap().message_ids(), ids(&["5"]));
    let broken = backend.storage.folder("B").unwrap();
    assert!(broken.status().unwrap().unwrap().contains("folder is broken"));
    assert!(listener.events().contains(&"finished C".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried() {
    let backend = FakeBackend::new([("INBOX", FakeRemote::imap(1, &[1]))]);
    backend.transient_failures.store(1, Ordering::SeqCst);

    let outcomes = sync_account(
        &backend,
        &ids(&["INBOX"]),
        &SyncConfig::default(),
        &RetryPolicy {
            initial_backoff: Duration::from_secs(5),
            ..RetryPolicy::default()
        },
        &RecordingListener::default(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcomes[0].attempts, 2);
    assert_eq!(outcomes[0].result.as_ref().unwrap().added, ids(&["1"]));
}

#[tokio::test(start_paused = true)]
async fn test_retries_stop_at_max_attempts() {
    let backend = FakeBackend::new([("INBOX", FakeRemote::imap(1, &[1]))]);
    backend.transient_failures.store(10, Ordering::SeqCst);

    let outcomes = sync_account(
        &backend,
        &ids(&["INBOX"]),
        &SyncConfig::default(),
        &RetryPolicy::default(),
        &RecordingListener::default(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcomes[0].attempts, 3);
    assert_eq!(outcomes[0].result.as_ref().unwrap_err().kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_expunge_on_poll_runs_before_listing() {
    let storage = MemoryStorage::with_folders(["INBOX"]);
    let mut remote = FakeRemote::imap(1, &[1, 2]);
    remote.message_mut("1").flags.insert(Flag::Deleted);
    let config = SyncConfig {
        expunge_policy: postern_core::ExpungePolicy::OnPoll,
        ..SyncConfig::default()
    };

    sync(&storage, &mut remote, &config, "INBOX").await.unwrap();
    assert_eq!(remote.messages.len(), 1);
}
