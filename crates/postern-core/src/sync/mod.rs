//! Folder synchronization.
//!
//! [`SyncEngine`] brings one local folder up to date with its server
//! counterpart through a [`RemoteMailbox`]. [`sync_account`] runs the engine
//! over every folder of an account, isolating and retrying per folder.
//!
//! The engine keeps no state between runs: everything it needs to resume
//! lives in [`crate::storage::BackendFolder`]. Running it twice against an
//! unchanged server writes nothing the second time.

mod account;
mod engine;
mod remote;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Flag, FlagSet};

pub use account::{FolderOutcome, sync_account};
pub use engine::SyncEngine;
pub use remote::{FolderStatus, RemoteMailbox, RemoteMessage};

/// When deleted messages are expunged on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpungePolicy {
    /// Right after messages are marked deleted.
    #[default]
    Immediately,
    /// At the start of each sync.
    OnPoll,
    /// Only on explicit request.
    Manually,
}

/// Per-account sync behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Newest messages kept per folder unless the folder sets its own limit.
    /// Zero means no limit.
    pub default_visible_limit: u32,
    /// Messages older than this are not downloaded, and local copies
    /// older than this are removed.
    pub earliest_poll_date: Option<DateTime<Utc>>,
    /// Remove local messages that are gone from the server, and mirror a
    /// server-side `\Deleted`.
    pub sync_remote_deletions: bool,
    /// When deleted messages are expunged.
    pub expunge_policy: ExpungePolicy,
    /// Messages larger than this many bytes are stored headers-only.
    pub max_download_size: Option<u32>,
    /// Flags copied from the server onto messages already stored locally.
    pub sync_flags: FlagSet,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_visible_limit: 25,
            earliest_poll_date: None,
            sync_remote_deletions: true,
            expunge_policy: ExpungePolicy::default(),
            max_download_size: None,
            sync_flags: FlagSet::from([Flag::Seen, Flag::Flagged, Flag::Answered, Flag::Forwarded]),
        }
    }
}

/// What one folder sync changed locally, by message server id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// Messages downloaded by this sync, newest first. Includes local
    /// messages whose content was incomplete.
    pub added: Vec<String>,
    /// Messages whose flags changed, in server order.
    pub updated: Vec<String>,
    /// Messages removed because the server no longer has them, or because
    /// they fell outside the visible window or the earliest poll date.
    pub removed: Vec<String>,
}

impl SyncResult {
    /// Returns true if the sync changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Progress callbacks for a folder sync.
///
/// Called from the syncing task; implementations must not block.
pub trait SyncListener: Send + Sync {
    /// The sync of `folder` began.
    fn sync_started(&self, folder: &str) {
        let _ = folder;
    }

    /// `completed` of `total` message headers were examined.
    fn sync_headers_progress(&self, folder: &str, completed: usize, total: usize) {
        let _ = (folder, completed, total);
    }

    /// A message was downloaded and stored.
    fn sync_new_message(&self, folder: &str, server_id: &str) {
        let _ = (folder, server_id);
    }

    /// A message was removed locally because the server dropped it.
    fn sync_removed_message(&self, folder: &str, server_id: &str) {
        let _ = (folder, server_id);
    }

    /// A message's flags changed.
    fn sync_flag_changed(&self, folder: &str, server_id: &str) {
        let _ = (folder, server_id);
    }

    /// The sync of `folder` completed.
    fn sync_finished(&self, folder: &str) {
        let _ = folder;
    }

    /// The sync of `folder` failed with `message`.
    fn sync_failed(&self, folder: &str, message: &str) {
        let _ = (folder, message);
    }
}

/// A listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl SyncListener for NoopListener {}
