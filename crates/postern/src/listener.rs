//! Sync progress as log lines.

use postern_core::SyncListener;
use tracing::{debug, trace, warn};

/// Logs sync progress for one account.
pub struct LoggingListener {
    account: String,
}

impl LoggingListener {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }
}

impl SyncListener for LoggingListener {
    fn sync_started(&self, folder: &str) {
        debug!(account = %self.account, folder, "Sync started");
    }

    fn sync_headers_progress(&self, folder: &str, completed: usize, total: usize) {
        trace!(account = %self.account, folder, completed, total, "Headers");
    }

    fn sync_new_message(&self, folder: &str, server_id: &str) {
        debug!(account = %self.account, folder, server_id, "New message");
    }

    fn sync_removed_message(&self, folder: &str, server_id: &str) {
        debug!(account = %self.account, folder, server_id, "Message removed");
    }

    fn sync_flag_changed(&self, folder: &str, server_id: &str) {
        trace!(account = %self.account, folder, server_id, "Flags changed");
    }

    fn sync_failed(&self, folder: &str, message: &str) {
        warn!(account = %self.account, folder, message, "Sync failed");
    }
}
