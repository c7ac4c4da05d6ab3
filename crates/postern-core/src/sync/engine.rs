//! Single-folder sync.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ExpungePolicy, RemoteMailbox, RemoteMessage, SyncConfig, SyncListener, SyncResult};
use crate::message::{DownloadState, Flag, FlagSet, StoredMessage};
use crate::storage::{
    BackendFolder, BackendStorage, EXTRA_HIGHEST_KNOWN_UID, EXTRA_UID_VALIDITY, MoreMessages, StorageResult,
};
use crate::{Error, Result};

/// Brings local folders up to date with the server.
///
/// Holds only borrowed collaborators, so one engine can sync any number of
/// folders one after another. Every storage write happens as soon as the
/// data for it is known; a failed or cancelled sync keeps what was written
/// before the failure.
pub struct SyncEngine<'a> {
    storage: &'a dyn BackendStorage,
    config: &'a SyncConfig,
    listener: &'a dyn SyncListener,
    cancel: &'a CancellationToken,
}

impl<'a> SyncEngine<'a> {
    /// Creates an engine.
    #[must_use]
    pub const fn new(
        storage: &'a dyn BackendStorage,
        config: &'a SyncConfig,
        listener: &'a dyn SyncListener,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            listener,
            cancel,
        }
    }

    /// Syncs one folder.
    ///
    /// On failure the folder's status is set to the root cause and the error
    /// is returned. A cancelled sync returns [`Error::Cancelled`] and leaves
    /// the status alone.
    ///
    /// # Errors
    ///
    /// Returns the first storage, protocol or transport error, or
    /// [`Error::Cancelled`].
    pub async fn sync<M>(&self, remote: &mut M, folder: &str) -> Result<SyncResult>
    where
        M: RemoteMailbox + ?Sized,
    {
        let local = self.storage.folder(folder)?;
        info!(folder, "Synchronizing folder");
        self.listener.sync_started(folder);

        let mut highest_uid = 0;
        let outcome = self.run(remote, folder, local.as_ref(), &mut highest_uid).await;

        match outcome {
            Ok(result) => {
                store_highest_uid(local.as_ref(), highest_uid)?;
                info!(
                    folder,
                    added = result.added.len(),
                    updated = result.updated.len(),
                    removed = result.removed.len(),
                    "Folder synchronized"
                );
                self.listener.sync_finished(folder);
                Ok(result)
            }
            Err(Error::Cancelled) => {
                if let Err(err) = store_highest_uid(local.as_ref(), highest_uid) {
                    warn!(?err, folder, "Could not persist highest UID");
                }
                info!(folder, "Folder sync cancelled");
                Err(Error::Cancelled)
            }
            Err(e) => {
                if let Err(err) = store_highest_uid(local.as_ref(), highest_uid) {
                    warn!(?err, folder, "Could not persist highest UID");
                }
                let message = e.root_cause_message();
                error!(folder, kind = ?e.kind(), %message, "Folder sync failed");
                if let Err(err) = record_failure(local.as_ref(), &message) {
                    warn!(?err, folder, "Could not record sync failure");
                }
                self.listener.sync_failed(folder, &message);
                Err(e)
            }
        }
    }

    async fn run<M>(
        &self,
        remote: &mut M,
        folder: &str,
        local: &dyn BackendFolder,
        highest_uid: &mut u64,
    ) -> Result<SyncResult>
    where
        M: RemoteMailbox + ?Sized,
    {
        let mut result = SyncResult::default();

        if self.config.expunge_policy == ExpungePolicy::OnPoll && remote.supports_expunge() {
            self.checkpoint()?;
            debug!(folder, "Expunging before sync");
            remote.expunge(folder).await?;
        }

        self.checkpoint()?;
        let status = remote.open(folder).await?;
        check_uid_validity(local, folder, status.uid_validity)?;

        let known = local.all_messages_and_effective_dates()?;
        let highest_known = local.extra_number(EXTRA_HIGHEST_KNOWN_UID)?.unwrap_or(0);
        let visible_limit = local.visible_limit()?.unwrap_or(self.config.default_visible_limit);
        let count = status.message_count;
        let start = window_start(count, visible_limit);

        let mut listed = Vec::new();
        if count > 0 {
            self.checkpoint()?;
            debug!(folder, start, end = count, "Listing remote messages");
            let headers = remote.headers(start, count).await?;
            let total = headers.len();
            for (i, message) in headers.into_iter().enumerate() {
                self.listener.sync_headers_progress(folder, i + 1, total);
                if let Some(uid) = message.uid.map(u64::from)
                    && uid > highest_known
                    && uid > *highest_uid
                {
                    *highest_uid = uid;
                }
                // Local copies are judged by their own date.
                let date = known.get(&message.server_id).copied().unwrap_or(message.date);
                if self.is_recent_enough(date) {
                    listed.push(message);
                }
            }
        }

        if self.config.sync_remote_deletions {
            let remote_ids: HashSet<&str> = listed.iter().map(|m| m.server_id.as_str()).collect();
            let mut gone: Vec<String> = known
                .keys()
                .filter(|id| !remote_ids.contains(id.as_str()))
                .cloned()
                .collect();
            if !gone.is_empty() {
                gone.sort();
                debug!(folder, count = gone.len(), "Removing messages gone from the server or the window");
                local.destroy_messages(&gone)?;
                for id in &gone {
                    self.listener.sync_removed_message(folder, id);
                }
                result.removed = gone;
            }
        }

        let mut downloads: Vec<(RemoteMessage, Option<FlagSet>)> = Vec::new();
        let mut existing: Vec<(RemoteMessage, FlagSet)> = Vec::new();
        for message in listed {
            let remote_deleted = message.flags.contains(&Flag::Deleted);
            if !known.contains_key(&message.server_id) {
                if !remote_deleted {
                    downloads.push((message, None));
                }
                continue;
            }
            let local_flags = local.message_flags(&message.server_id)?.unwrap_or_default();
            if local_flags.contains(&Flag::Deleted) {
                continue;
            }
            if !remote_deleted && self.is_incomplete(local.download_state(&message.server_id)?, message.size) {
                downloads.push((message, Some(local_flags)));
            } else {
                existing.push((message, local_flags));
            }
        }

        downloads.sort_by(|(a, _), (b, _)| b.number.cmp(&a.number));
        for (message, local_flags) in downloads {
            self.checkpoint()?;
            let headers_only = self.is_over_limit(message.size);
            let data = remote.download(&message, headers_only).await?;
            let flags = match local_flags {
                Some(local_flags) => {
                    mirrored_flags(&local_flags, &message.flags, self.config).unwrap_or(local_flags)
                }
                None => message.flags,
            };
            local.save_message(StoredMessage {
                server_id: message.server_id.clone(),
                date: message.date,
                size: message.size,
                flags,
                data,
                download: if headers_only {
                    DownloadState::Partial
                } else {
                    DownloadState::Full
                },
            })?;
            self.listener.sync_new_message(folder, &message.server_id);
            result.added.push(message.server_id);
        }

        if remote.supports_flags() {
            for (message, local_flags) in &existing {
                if let Some(flags) = mirrored_flags(local_flags, &message.flags, self.config) {
                    local.set_message_flags(&message.server_id, &flags)?;
                    self.listener.sync_flag_changed(folder, &message.server_id);
                    result.updated.push(message.server_id.clone());
                }
            }
        }

        let stored_more = local.more_messages()?;
        if more_messages_stale(stored_more, start, !result.removed.is_empty()) {
            let more = if start > 1 {
                self.checkpoint()?;
                remote
                    .has_messages_before(start, self.config.earliest_poll_date)
                    .await?
            } else {
                false
            };
            let more = MoreMessages::from(more);
            if more != stored_more {
                local.set_more_messages(more)?;
            }
        }
        local.set_last_checked(Utc::now())?;
        if local.status()?.is_some() {
            local.set_status(None)?;
        }

        Ok(result)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn is_recent_enough(&self, date: Option<DateTime<Utc>>) -> bool {
        match (self.config.earliest_poll_date, date) {
            (Some(earliest), Some(date)) => date >= earliest,
            _ => true,
        }
    }

    fn is_over_limit(&self, size: u32) -> bool {
        self.config.max_download_size.is_some_and(|max| size > max)
    }

    /// Whether a stored message should be downloaded again: it has no
    /// content yet, or only headers that the current limit no longer forces.
    fn is_incomplete(&self, state: Option<DownloadState>, size: u32) -> bool {
        match state {
            None | Some(DownloadState::Envelope) => true,
            Some(DownloadState::Partial) => !self.is_over_limit(size),
            Some(DownloadState::Full) => false,
        }
    }
}

/// Local flags after applying the server's, or `None` if nothing changes.
///
/// A message deleted locally keeps its flags until the deletion reaches the
/// server. A server-side `\Deleted` is only copied when remote deletions are
/// synced; otherwise the flags in `config.sync_flags` are mirrored one by one
/// and every other local flag is left alone.
fn mirrored_flags(local: &FlagSet, remote: &FlagSet, config: &SyncConfig) -> Option<FlagSet> {
    if local.contains(&Flag::Deleted) {
        return None;
    }
    let mut next = local.clone();
    if remote.contains(&Flag::Deleted) {
        if !config.sync_remote_deletions {
            return None;
        }
        next.insert(Flag::Deleted);
    } else {
        for flag in &config.sync_flags {
            if remote.contains(flag) {
                next.insert(flag.clone());
            } else {
                next.remove(flag);
            }
        }
    }
    (next != *local).then_some(next)
}

/// Whether the stored "older messages exist" answer may be out of date.
const fn more_messages_stale(stored: MoreMessages, start: u32, removed_any: bool) -> bool {
    match stored {
        MoreMessages::Unknown => true,
        MoreMessages::True => removed_any || start == 1,
        MoreMessages::False => removed_any || start > 1,
    }
}

/// First sequence number inside the visible window. A limit of zero keeps
/// everything.
const fn window_start(count: u32, visible_limit: u32) -> u32 {
    if visible_limit == 0 || count <= visible_limit {
        1
    } else {
        count - visible_limit + 1
    }
}

fn check_uid_validity(local: &dyn BackendFolder, folder: &str, current: Option<u32>) -> Result<()> {
    let Some(current) = current.map(u64::from) else {
        return Ok(());
    };
    match local.extra_number(EXTRA_UID_VALIDITY)? {
        None => {
            debug!(folder, uid_validity = current, "Recording UIDVALIDITY");
            local.set_extra_number(EXTRA_UID_VALIDITY, current)?;
        }
        Some(stored) if stored != current => {
            warn!(folder, stored, current, "UIDVALIDITY changed, discarding local messages");
            local.clear_all_messages()?;
            local.set_extra_number(EXTRA_UID_VALIDITY, current)?;
            local.set_extra_number(EXTRA_HIGHEST_KNOWN_UID, 0)?;
        }
        Some(_) => {}
    }
    Ok(())
}

fn store_highest_uid(local: &dyn BackendFolder, seen: u64) -> StorageResult<()> {
    if seen > local.extra_number(EXTRA_HIGHEST_KNOWN_UID)?.unwrap_or(0) {
        local.set_extra_number(EXTRA_HIGHEST_KNOWN_UID, seen)?;
    }
    Ok(())
}

fn record_failure(local: &dyn BackendFolder, message: &str) -> StorageResult<()> {
    if local.status()?.as_deref() != Some(message) {
        local.set_status(Some(message))?;
    }
    local.set_last_checked(Utc::now())
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

    fn flags(flags: &[Flag]) -> FlagSet {
        flags.iter().cloned().collect()
    }

    #[test]
    fn test_mirrored_flags_only_touches_synced_flags() {
        let config = SyncConfig::default();
        let local = flags(&[Flag::Seen, Flag::Keyword("$Label1".into())]);
        let remote = flags(&[Flag::Flagged, Flag::Draft]);

        let next = mirrored_flags(&local, &remote, &config).unwrap();
        assert_eq!(next, flags(&[Flag::Flagged, Flag::Keyword("$Label1".into())]));
        assert_eq!(mirrored_flags(&next, &remote, &config), None);
    }

    #[test]
    fn test_mirrored_flags_keeps_local_deletion() {
        let config = SyncConfig::default();
        let local = flags(&[Flag::Deleted]);
        assert_eq!(mirrored_flags(&local, &flags(&[Flag::Seen]), &config), None);
        assert_eq!(mirrored_flags(&local, &FlagSet::new(), &config), None);
    }

    #[test]
    fn test_mirrored_flags_remote_deletion() {
        let local = flags(&[Flag::Seen]);
        let remote = flags(&[Flag::Deleted]);

        let next = mirrored_flags(&local, &remote, &SyncConfig::default()).unwrap();
        assert_eq!(next, flags(&[Flag::Seen, Flag::Deleted]));

        let keep = SyncConfig {
            sync_remote_deletions: false,
            ..SyncConfig::default()
        };
        assert_eq!(mirrored_flags(&local, &remote, &keep), None);
    }

    #[test]
    fn test_more_messages_stale() {
        assert!(more_messages_stale(MoreMessages::Unknown, 1, false));
        assert!(!more_messages_stale(MoreMessages::False, 1, false));
        assert!(more_messages_stale(MoreMessages::False, 5, false));
        assert!(!more_messages_stale(MoreMessages::True, 5, false));
        assert!(more_messages_stale(MoreMessages::True, 5, true));
        assert!(more_messages_stale(MoreMessages::True, 1, false));
    }

    #[test]
    fn test_window_start() {
        assert_eq!(window_start(0, 25), 1);
        assert_eq!(window_start(10, 25), 1);
        assert_eq!(window_start(25, 25), 1);
        assert_eq!(window_start(100, 25), 76);
        assert_eq!(window_start(100, 0), 1);
    }
}
