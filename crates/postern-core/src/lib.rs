//! # postern-core
//!
//! Account-level mail logic on top of the protocol crates.
//!
//! ## Features
//!
//! - **Backends**: one [`Backend`] trait over IMAP and POP3, with SMTP for sending
//! - **Folder sync**: windowed header download, flag and deletion reconciliation,
//!   UIDVALIDITY handling and partial downloads of large messages
//! - **Account sync**: parallel folder syncs with isolated failures and retry
//! - **Settings**: server settings with validation and a stable JSON form
//! - **Connection pooling**: bounded IMAP connection reuse per account
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use postern_core::{BackendFactory, MemoryStorageProvider, NoopListener, sync_account};
//! use postern_transport::WebPkiTrust;
//! use tokio_util::sync::CancellationToken;
//!
//! let factory = BackendFactory::new(Arc::new(WebPkiTrust), Arc::new(MemoryStorageProvider::new()));
//! let backend = factory.create_backend(&account)?;
//! let folders = backend.refresh_folder_list().await?;
//! let ids: Vec<String> = folders.into_iter().map(|f| f.server_id).collect();
//!
//! let outcomes = sync_account(
//!     backend.as_ref(),
//!     &ids,
//!     &account.sync,
//!     &account.retry,
//!     &NoopListener,
//!     &CancellationToken::new(),
//! )
//! .await;
//! ```
//!
//! ## Modules
//!
//! - [`backend`]: the [`Backend`] trait, IMAP and POP3 implementations, factory
//! - [`sync`]: the folder sync engine and account-wide sync
//! - [`storage`]: the local storage contract and an in-memory implementation
//! - [`settings`]: server and account settings
//! - [`fetcher`]: folder listing during account setup

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod backend;
mod error;
pub mod fetcher;
mod folder;
mod message;
pub mod pool;
mod retry;
pub mod settings;
pub mod storage;
pub mod sync;

pub use backend::{Backend, BackendFactory, IdleEvent, MemoryStorageProvider, StorageProvider};
pub use error::{Error, ErrorKind, FolderFetcherError, Result, SyncError};
pub use fetcher::{FolderFetcher, ImapFolderFetcher, Pop3FolderFetcher};
pub use folder::{FolderType, NoImapAttribute, RemoteFolder};
pub use message::{
    DownloadState, Flag, FlagSet, OutgoingMessage, StoredMessage, flags_from_imap, flags_to_imap,
};
pub use retry::RetryPolicy;
pub use settings::{AccountConfig, Protocol, ServerSettings, ServerSettingsMapper};
pub use sync::{
    ExpungePolicy, FolderOutcome, NoopListener, SyncConfig, SyncListener, SyncResult, sync_account,
};
