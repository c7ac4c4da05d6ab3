//! Whole-account sync.

use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{SyncConfig, SyncListener, SyncResult};
use crate::backend::Backend;
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// How one folder of an account sync ended.
#[derive(Debug)]
pub struct FolderOutcome {
    /// Folder server id.
    pub folder: String,
    /// Result of the last attempt.
    pub result: Result<SyncResult>,
    /// Attempts made, the first one included.
    pub attempts: u32,
}

/// Syncs every folder in `folders` and reports each one separately.
///
/// A failing folder never stops its siblings. Up to
/// [`Backend::max_parallel_syncs`] folders run at once; outcomes come back in
/// the order of `folders`. Transient failures are retried per `retry`.
pub async fn sync_account(
    backend: &dyn Backend,
    folders: &[String],
    config: &SyncConfig,
    retry: &RetryPolicy,
    listener: &dyn SyncListener,
    cancel: &CancellationToken,
) -> Vec<FolderOutcome> {
    let parallel = backend.max_parallel_syncs().max(1);
    info!(folders = folders.len(), parallel, "Synchronizing account");

    stream::iter(folders)
        .map(|folder| sync_with_retry(backend, folder, config, retry, listener, cancel))
        .buffered(parallel)
        .collect()
        .await
}

async fn sync_with_retry(
    backend: &dyn Backend,
    folder: &str,
    config: &SyncConfig,
    retry: &RetryPolicy,
    listener: &dyn SyncListener,
    cancel: &CancellationToken,
) -> FolderOutcome {
    let mut attempts = 0;
    let result = loop {
        attempts += 1;
        match backend.sync(folder, config, listener, cancel).await {
            Err(e) if retry.should_retry(e.kind(), attempts) => {
                let delay = retry.delay_for(attempts);
                warn!(?e, folder, attempts, ?delay, "Retrying folder sync");
                tokio::select! {
                    () = cancel.cancelled() => break Err(Error::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            result => break result,
        }
    };

    FolderOutcome {
        folder: folder.to_string(),
        result,
        attempts,
    }
}
