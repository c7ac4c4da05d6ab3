//! In-memory storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{BackendFolder, BackendStorage, MoreMessages, StorageError, StorageResult};
use crate::folder::{FolderType, RemoteFolder};
use crate::message::{DownloadState, FlagSet, StoredMessage};

/// [`BackendStorage`] kept in memory.
///
/// Counts every data write across all folders; see [`Self::write_count`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    folders: Mutex<BTreeMap<String, Arc<MemoryFolder>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage holding empty folders with these server ids.
    #[must_use]
    pub fn with_folders<'a>(server_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let storage = Self::new();
        {
            let mut folders = storage.lock();
            for id in server_ids {
                let folder = MemoryFolder::new(id, id, FolderType::Regular, Arc::clone(&storage.writes));
                folders.insert(id.to_string(), Arc::new(folder));
            }
        }
        storage
    }

    /// Number of message, flag, status, extra and folder-list writes so far.
    ///
    /// [`BackendFolder::set_last_checked`] is not counted.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Concrete handle to a folder, for inspection.
    #[must_use]
    pub fn memory_folder(&self, server_id: &str) -> Option<Arc<MemoryFolder>> {
        self.lock().get(server_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<MemoryFolder>>> {
        self.folders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl BackendStorage for MemoryStorage {
    fn folder(&self, server_id: &str) -> StorageResult<Arc<dyn BackendFolder>> {
        self.lock()
            .get(server_id)
            .map(|f| Arc::clone(f) as Arc<dyn BackendFolder>)
            .ok_or_else(|| StorageError::FolderNotFound(server_id.to_string()))
    }

    fn folder_server_ids(&self) -> StorageResult<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn create_folders(&self, folders: &[RemoteFolder]) -> StorageResult<()> {
        self.count_write();
        let mut map = self.lock();
        for folder in folders {
            map.entry(folder.server_id.clone()).or_insert_with(|| {
                Arc::new(MemoryFolder::new(
                    &folder.server_id,
                    &folder.display_name,
                    folder.folder_type,
                    Arc::clone(&self.writes),
                ))
            });
        }
        Ok(())
    }

    fn change_folder(&self, folder: &RemoteFolder) -> StorageResult<()> {
        let existing = self
            .memory_folder(&folder.server_id)
            .ok_or_else(|| StorageError::FolderNotFound(folder.server_id.clone()))?;
        self.count_write();
        let mut state = existing.lock();
        state.name.clone_from(&folder.display_name);
        state.folder_type = folder.folder_type;
        Ok(())
    }

    fn delete_folders(&self, server_ids: &[String]) -> StorageResult<()> {
        self.count_write();
        let mut map = self.lock();
        for id in server_ids {
            map.remove(id);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FolderState {
    name: String,
    folder_type: FolderType,
    visible_limit: Option<u32>,
    messages: BTreeMap<String, StoredMessage>,
    more_messages: MoreMessages,
    last_checked: Option<DateTime<Utc>>,
    status: Option<String>,
    extras: HashMap<String, u64>,
}

/// One folder of a [`MemoryStorage`].
#[derive(Debug)]
pub struct MemoryFolder {
    server_id: String,
    state: Mutex<FolderState>,
    writes: Arc<AtomicUsize>,
}

impl MemoryFolder {
    fn new(server_id: &str, name: &str, folder_type: FolderType, writes: Arc<AtomicUsize>) -> Self {
        Self {
            server_id: server_id.to_string(),
            state: Mutex::new(FolderState {
                name: name.to_string(),
                folder_type,
                ..FolderState::default()
            }),
            writes,
        }
    }

    /// Server id of the folder.
    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Sets the per-folder window. Not counted as a write.
    pub fn set_visible_limit(&self, limit: Option<u32>) {
        self.lock().visible_limit = limit;
    }

    /// A stored message.
    #[must_use]
    pub fn message(&self, server_id: &str) -> Option<StoredMessage> {
        self.lock().messages.get(server_id).cloned()
    }

    /// Server ids of stored messages, in order.
    #[must_use]
    pub fn message_ids(&self) -> Vec<String> {
        self.lock().messages.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, FolderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> MutexGuard<'_, FolderState> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lock()
    }
}

impl BackendFolder for MemoryFolder {
    fn name(&self) -> StorageResult<String> {
        Ok(self.lock().name.clone())
    }

    fn folder_type(&self) -> StorageResult<FolderType> {
        Ok(self.lock().folder_type)
    }

    fn visible_limit(&self) -> StorageResult<Option<u32>> {
        Ok(self.lock().visible_limit)
    }

    fn all_messages_and_effective_dates(&self) -> StorageResult<HashMap<String, Option<DateTime<Utc>>>> {
        Ok(self
            .lock()
            .messages
            .iter()
            .map(|(id, message)| (id.clone(), message.date))
            .collect())
    }

    fn message_flags(&self, server_id: &str) -> StorageResult<Option<FlagSet>> {
        Ok(self.lock().messages.get(server_id).map(|m| m.flags.clone()))
    }

    fn download_state(&self, server_id: &str) -> StorageResult<Option<DownloadState>> {
        Ok(self.lock().messages.get(server_id).map(|m| m.download))
    }

    fn save_message(&self, message: StoredMessage) -> StorageResult<()> {
        self.write().messages.insert(message.server_id.clone(), message);
        Ok(())
    }

    fn set_message_flags(&self, server_id: &str, flags: &FlagSet) -> StorageResult<()> {
        let mut state = self.write();
        let message = state
            .messages
            .get_mut(server_id)
            .ok_or_else(|| StorageError::Backend(format!("no message {server_id} in {}", self.server_id)))?;
        message.flags.clone_from(flags);
        Ok(())
    }

    fn destroy_messages(&self, server_ids: &[String]) -> StorageResult<()> {
        let mut state = self.write();
        for id in server_ids {
            state.messages.remove(id);
        }
        Ok(())
    }

    fn clear_all_messages(&self) -> StorageResult<()> {
        self.write().messages.clear();
        Ok(())
    }

    fn more_messages(&self) -> StorageResult<MoreMessages> {
        Ok(self.lock().more_messages)
    }

    fn set_more_messages(&self, more: MoreMessages) -> StorageResult<()> {
        self.write().more_messages = more;
        Ok(())
    }

    fn last_checked(&self) -> StorageResult<Option<DateTime<Utc>>> {
        Ok(self.lock().last_checked)
    }

    fn set_last_checked(&self, at: DateTime<Utc>) -> StorageResult<()> {
        self.lock().last_checked = Some(at);
        Ok(())
    }

    fn status(&self) -> StorageResult<Option<String>> {
        Ok(self.lock().status.clone())
    }

    fn set_status(&self, status: Option<&str>) -> StorageResult<()> {
        self.write().status = status.map(str::to_string);
        Ok(())
    }

    fn extra_number(&self, key: &str) -> StorageResult<Option<u64>> {
        Ok(self.lock().extras.get(key).copied())
    }

    fn set_extra_number(&self, key: &str, value: u64) -> StorageResult<()> {
        self.write().extras.insert(key.to_string(), value);
        Ok(())
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
    use crate::message::Flag;

    fn message(id: &str) -> StoredMessage {
        StoredMessage {
            server_id: id.to_string(),
            date: None,
            size: 10,
            flags: FlagSet::new(),
            data: b"Subject: x\r\n\r\n".to_vec(),
            download: DownloadState::Full,
        }
    }

    #[test]
    fn test_write_count_skips_last_checked() {
        let storage = MemoryStorage::with_folders(["INBOX"]);
        let folder = storage.folder("INBOX").unwrap();

        folder.save_message(message("1")).unwrap();
        folder.set_message_flags("1", &FlagSet::from([Flag::Seen])).unwrap();
        folder.set_extra_number("k", 5).unwrap();
        folder.set_last_checked(Utc::now()).unwrap();

        assert_eq!(storage.write_count(), 3);
        assert_eq!(folder.message_flags("1").unwrap(), Some(FlagSet::from([Flag::Seen])));
        assert_eq!(folder.extra_number("k").unwrap(), Some(5));
        assert!(folder.last_checked().unwrap().is_some());
    }

    #[test]
    fn test_unknown_folder() {
        let storage = MemoryStorage::new();
        assert!(matches!(storage.folder("Nope"), Err(StorageError::FolderNotFound(_))));
    }

    #[test]
    fn test_folder_list_changes() {
        let storage = MemoryStorage::new();
        storage
            .create_folders(&[RemoteFolder::pop3_inbox()])
            .unwrap();
        assert_eq!(storage.folder_server_ids().unwrap(), vec!["INBOX"]);

        let renamed = RemoteFolder {
            display_name: "Posteingang".into(),
            ..RemoteFolder::pop3_inbox()
        };
        storage.change_folder(&renamed).unwrap();
        assert_eq!(storage.folder("INBOX").unwrap().name().unwrap(), "Posteingang");

        storage.delete_folders(&["INBOX".to_string()]).unwrap();
        assert!(storage.folder_server_ids().unwrap().is_empty());
    }

    #[test]
    fn test_set_flags_on_missing_message_fails() {
        let storage = MemoryStorage::with_folders(["INBOX"]);
        let folder = storage.folder("INBOX").unwrap();
        assert!(folder.set_message_flags("42", &FlagSet::new()).is_err());
    }
}
