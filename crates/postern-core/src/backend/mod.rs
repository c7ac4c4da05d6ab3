//! Per-account protocol backends.
//!
//! A [`Backend`] is the only way the rest of an application talks to a mail
//! server. [`BackendFactory`] looks at the incoming server's protocol once
//! and hands back an [`ImapBackend`] or a [`Pop3Backend`] behind the same
//! trait. Both write server state into the account's
//! [`BackendStorage`](crate::storage::BackendStorage) and never keep their
//! own copy of it.

mod connector;
mod factory;
mod imap;
mod pop3;
mod smtp;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use connector::{Connector, ImapSession, Pop3Session, SmtpSession};
pub use factory::{BackendFactory, MemoryStorageProvider, StorageProvider};
pub use imap::ImapBackend;
pub use pop3::Pop3Backend;

use crate::folder::RemoteFolder;
use crate::message::{Flag, FlagSet, OutgoingMessage};
use crate::storage::{BackendStorage, StorageResult};
use crate::sync::{SyncConfig, SyncListener, SyncResult};
use crate::{Error, Result};

/// A change reported while idling on a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    /// The folder now holds this many messages.
    NewMail(u32),
    /// The message with this sequence number was expunged.
    Expunge(u32),
    /// Flags of the message with this sequence number changed.
    FlagsChanged(u32),
    /// Nothing happened before the idle budget ran out.
    Timeout,
}

/// Uniform access to one account's mail server.
///
/// Operations a protocol cannot perform return [`Error::Unsupported`]; the
/// `supports_*` checks say which ones those are without a round trip.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether the server stores message flags.
    fn supports_flags(&self) -> bool {
        false
    }

    /// Whether deleted messages can be expunged on request.
    fn supports_expunge(&self) -> bool {
        false
    }

    /// Whether messages can be moved or copied between folders.
    fn supports_move(&self) -> bool {
        false
    }

    /// Whether messages can be appended to a folder.
    fn supports_upload(&self) -> bool {
        false
    }

    /// Whether [`Self::idle`] can wait for changes.
    fn is_push_capable(&self) -> bool {
        false
    }

    /// How many folders may sync at the same time.
    fn max_parallel_syncs(&self) -> usize {
        1
    }

    /// Lists the server's folders and brings local storage in line.
    async fn refresh_folder_list(&self) -> Result<Vec<RemoteFolder>>;

    /// Syncs one folder into local storage.
    async fn sync(
        &self,
        folder: &str,
        config: &SyncConfig,
        listener: &dyn SyncListener,
        cancel: &CancellationToken,
    ) -> Result<SyncResult>;

    /// Downloads one message in full and stores it.
    async fn download_message(&self, folder: &str, server_id: &str) -> Result<()>;

    /// Adds or removes `flag` on messages.
    async fn set_flags(&self, folder: &str, server_ids: &[String], flag: Flag, value: bool) -> Result<()> {
        let _ = (folder, server_ids, flag, value);
        Err(Error::Unsupported("flags".into()))
    }

    /// Moves messages, returning old to new server ids where the server
    /// reports them.
    async fn move_messages(
        &self,
        source: &str,
        destination: &str,
        server_ids: &[String],
    ) -> Result<HashMap<String, String>> {
        let _ = (source, destination, server_ids);
        Err(Error::Unsupported("move".into()))
    }

    /// Copies messages, returning old to new server ids where the server
    /// reports them.
    async fn copy_messages(
        &self,
        source: &str,
        destination: &str,
        server_ids: &[String],
    ) -> Result<HashMap<String, String>> {
        let _ = (source, destination, server_ids);
        Err(Error::Unsupported("copy".into()))
    }

    /// Deletes messages on the server.
    async fn delete_messages(&self, folder: &str, server_ids: &[String]) -> Result<()>;

    /// Permanently removes messages marked deleted.
    async fn expunge(&self, folder: &str) -> Result<()> {
        let _ = folder;
        Err(Error::Unsupported("expunge".into()))
    }

    /// Appends a message, returning its new server id if the server reports
    /// one.
    async fn upload_message(&self, folder: &str, flags: &FlagSet, message: &[u8]) -> Result<Option<String>> {
        let _ = (folder, flags, message);
        Err(Error::Unsupported("upload".into()))
    }

    /// Sends a message through the outgoing server.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<()>;

    /// Connects and logs in to the incoming server, then disconnects.
    async fn check_incoming_server_settings(&self) -> Result<()>;

    /// Connects and logs in to the outgoing server, then disconnects.
    async fn check_outgoing_server_settings(&self) -> Result<()>;

    /// Waits for the next change in `folder`.
    async fn idle(&self, folder: &str) -> Result<IdleEvent> {
        let _ = folder;
        Err(Error::Unsupported("push".into()))
    }
}

/// Makes the local folder list match `remote`.
///
/// Creates missing folders, updates renamed or retyped ones and deletes
/// folders the server no longer has. Unchanged folders are not written.
pub(crate) fn apply_folder_list(storage: &dyn BackendStorage, remote: &[RemoteFolder]) -> StorageResult<()> {
    let local: HashSet<String> = storage.folder_server_ids()?.into_iter().collect();

    let mut created = Vec::new();
    for folder in remote {
        if !local.contains(&folder.server_id) {
            created.push(folder.clone());
            continue;
        }
        let existing = storage.folder(&folder.server_id)?;
        if existing.name()? != folder.display_name || existing.folder_type()? != folder.folder_type {
            storage.change_folder(folder)?;
        }
    }
    if !created.is_empty() {
        debug!(count = created.len(), "Creating local folders");
        storage.create_folders(&created)?;
    }

    let remote_ids: HashSet<&str> = remote.iter().map(|f| f.server_id.as_str()).collect();
    let deleted: Vec<String> = local
        .into_iter()
        .filter(|id| !remote_ids.contains(id.as_str()))
        .collect();
    if !deleted.is_empty() {
        debug!(count = deleted.len(), "Deleting local folders");
        storage.delete_folders(&deleted)?;
    }
    Ok(())
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
    use crate::folder::FolderType;
    use crate::storage::MemoryStorage;

    fn folder(id: &str, folder_type: FolderType) -> RemoteFolder {
        RemoteFolder {
            server_id: id.to_string(),
            display_name: id.to_string(),
            folder_type,
        }
    }

    #[test]
    fn test_apply_folder_list() {
        let storage = MemoryStorage::with_folders(["INBOX", "Old"]);
        let remote = vec![
            folder("INBOX", FolderType::Inbox),
            folder("Sent", FolderType::Sent),
        ];

        apply_folder_list(&storage, &remote).unwrap();
        assert_eq!(storage.folder_server_ids().unwrap(), vec!["INBOX", "Sent"]);
        assert_eq!(
            storage.folder("INBOX").unwrap().folder_type().unwrap(),
            FolderType::Inbox
        );

        let writes = storage.write_count();
        apply_folder_list(&storage, &remote).unwrap();
        assert_eq!(storage.write_count(), writes);
    }
}
