//! `postern` - headless mail sync runner
//!
//! Loads every configured account and runs one sync pass over all of their
//! folders. Accounts sync in parallel; the exit code is non-zero if any
//! account or folder failed.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod listener;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use postern_core::{AccountConfig, Backend, BackendFactory, sync_account};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use listener::LoggingListener;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postern=info,postern_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every account synced cleanly.
async fn run() -> Result<bool> {
    let path = config::config_path()?;
    let accounts = config::load_accounts(&path)?;
    info!(path = %path.display(), accounts = accounts.len(), "Starting postern");

    let factory = config::backend_factory(&accounts)?;
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling sync");
                cancel.cancel();
            }
        }
    });

    let results = join_all(
        accounts
            .iter()
            .map(|account| sync_one(&factory, account, &cancel)),
    )
    .await;
    interrupt.abort();

    let failed = results.iter().filter(|ok| !**ok).count();
    info!(accounts = results.len(), failed, "Sync pass complete");
    Ok(failed == 0)
}

async fn sync_one(factory: &BackendFactory, account: &AccountConfig, cancel: &CancellationToken) -> bool {
    let id = account.id.as_str();
    let backend: Arc<dyn Backend> = match factory.create_backend(account) {
        Ok(backend) => backend,
        Err(e) => {
            error!(account = id, %e, "Cannot set up account");
            return false;
        }
    };

    let folders = match backend.refresh_folder_list().await {
        Ok(folders) => folders,
        Err(e) => {
            error!(account = id, kind = ?e.kind(), %e, "Folder list refresh failed");
            return false;
        }
    };
    let folder_ids: Vec<String> = folders.into_iter().map(|f| f.server_id).collect();

    let listener = LoggingListener::new(id);
    let outcomes = sync_account(
        backend.as_ref(),
        &folder_ids,
        &account.sync,
        &account.retry,
        &listener,
        cancel,
    )
    .await;

    let mut ok = true;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => info!(
                account = id,
                folder = %outcome.folder,
                added = result.added.len(),
                updated = result.updated.len(),
                removed = result.removed.len(),
                attempts = outcome.attempts,
                "Folder done"
            ),
            Err(e) => {
                ok = false;
                error!(
                    account = id,
                    folder = %outcome.folder,
                    kind = ?e.kind(),
                    attempts = outcome.attempts,
                    %e,
                    "Folder failed"
                );
            }
        }
    }
    ok
}
