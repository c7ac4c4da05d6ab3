//! Local mailbox state the protocol layer writes into.
//!
//! The sync engine never owns storage: it receives a [`BackendStorage`] and
//! reads and writes per-folder state through [`BackendFolder`]. Every write
//! is a single call, so an interrupted sync leaves storage consistent with
//! the operations that completed.
//!
//! [`MemoryStorage`] is the in-memory implementation used by tests and the
//! runner binary.

mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{MemoryFolder, MemoryStorage};

use crate::folder::{FolderType, RemoteFolder};
use crate::message::{DownloadState, FlagSet, StoredMessage};

/// Folder extra holding the last seen UIDVALIDITY.
pub const EXTRA_UID_VALIDITY: &str = "imapUidValidity";

/// Folder extra holding the highest UID seen so far.
pub const EXTRA_HIGHEST_KNOWN_UID: &str = "imapHighestKnownUid";

/// Errors raised by a storage implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No folder with this server id.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// The storage engine failed.
    #[error("Storage backend failed: {0}")]
    Backend(String),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Whether the server holds older messages than the local window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MoreMessages {
    /// Not known yet.
    #[default]
    Unknown,
    /// Older messages exist.
    True,
    /// Everything is local.
    False,
}

impl From<bool> for MoreMessages {
    fn from(more: bool) -> Self {
        if more { Self::True } else { Self::False }
    }
}

/// Account-wide local store.
///
/// Implementations serialize their own writes.
pub trait BackendStorage: Send + Sync {
    /// Opens the folder with this server id.
    fn folder(&self, server_id: &str) -> StorageResult<Arc<dyn BackendFolder>>;

    /// Server ids of every local folder.
    fn folder_server_ids(&self) -> StorageResult<Vec<String>>;

    /// Adds folders. Existing ones are left alone.
    fn create_folders(&self, folders: &[RemoteFolder]) -> StorageResult<()>;

    /// Updates name and type of an existing folder.
    fn change_folder(&self, folder: &RemoteFolder) -> StorageResult<()>;

    /// Removes folders and their messages.
    fn delete_folders(&self, server_ids: &[String]) -> StorageResult<()>;
}

/// Local state of one folder.
pub trait BackendFolder: Send + Sync {
    /// Display name.
    fn name(&self) -> StorageResult<String>;

    /// Folder role.
    fn folder_type(&self) -> StorageResult<FolderType>;

    /// Per-folder window size; `None` falls back to the sync default.
    fn visible_limit(&self) -> StorageResult<Option<u32>>;

    /// Every local message with its effective date.
    fn all_messages_and_effective_dates(&self) -> StorageResult<HashMap<String, Option<DateTime<Utc>>>>;

    /// Flags of one message, or `None` if it is not stored.
    fn message_flags(&self, server_id: &str) -> StorageResult<Option<FlagSet>>;

    /// How much of one message is stored, or `None` if it is not stored.
    fn download_state(&self, server_id: &str) -> StorageResult<Option<DownloadState>>;

    /// Stores a downloaded message, replacing any earlier copy.
    fn save_message(&self, message: StoredMessage) -> StorageResult<()>;

    /// Replaces the whole flag set of one message.
    fn set_message_flags(&self, server_id: &str, flags: &FlagSet) -> StorageResult<()>;

    /// Removes messages.
    fn destroy_messages(&self, server_ids: &[String]) -> StorageResult<()>;

    /// Removes every message.
    fn clear_all_messages(&self) -> StorageResult<()>;

    /// Whether older messages exist on the server.
    fn more_messages(&self) -> StorageResult<MoreMessages>;

    /// Records whether older messages exist on the server.
    fn set_more_messages(&self, more: MoreMessages) -> StorageResult<()>;

    /// When the folder was last synced.
    fn last_checked(&self) -> StorageResult<Option<DateTime<Utc>>>;

    /// Records the time of a sync attempt.
    ///
    /// A metadata touch, not a data write.
    fn set_last_checked(&self, at: DateTime<Utc>) -> StorageResult<()>;

    /// Error text of the last failed sync.
    fn status(&self) -> StorageResult<Option<String>>;

    /// Sets or clears the error text.
    fn set_status(&self, status: Option<&str>) -> StorageResult<()>;

    /// Numeric folder extra.
    fn extra_number(&self, key: &str) -> StorageResult<Option<u64>>;

    /// Sets a numeric folder extra.
    fn set_extra_number(&self, key: &str, value: u64) -> StorageResult<()>;
}
