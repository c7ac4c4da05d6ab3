//! Error types for the core library.

use thiserror::Error;

pub use postern_transport::ErrorKind;

use crate::storage::StorageError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket, TLS, DNS or timeout failure outside a protocol engine.
    #[error(transparent)]
    Transport(#[from] postern_transport::Error),

    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] postern_imap::Error),

    /// POP3 operation failed.
    #[error("POP3 error: {0}")]
    Pop3(#[from] postern_pop3::Error),

    /// SMTP operation failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] postern_smtp::Error),

    /// Token handling failed before any protocol traffic.
    #[error("Authentication error: {0}")]
    Sasl(#[from] postern_sasl::Error),

    /// Local storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Server settings failed validation.
    #[error("Invalid server settings: {0}")]
    InvalidSettings(String),

    /// The account's protocol cannot do this.
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// The server reported something the sync cannot work with.
    #[error("Unexpected server state: {0}")]
    Remote(String),

    /// A stored message id is not a valid UID.
    #[error("Invalid message server id: {0}")]
    InvalidServerId(String),

    /// The connection pool was shut down.
    #[error("Connection pool is closed")]
    PoolClosed,

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors returned by a sync pass. Cancellation surfaces as
/// [`SyncError::Cancelled`].
pub type SyncError = Error;

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::PoolClosed => ErrorKind::Transport,
            Self::Imap(e) => e.kind(),
            Self::Pop3(e) => e.kind(),
            Self::Smtp(e) => e.kind(),
            Self::Sasl(e) if e.is_credential_problem() => ErrorKind::Auth,
            Self::Sasl(e) if e.is_network() => ErrorKind::Transport,
            Self::Storage(_) | Self::Serde(_) | Self::InvalidServerId(_) => ErrorKind::Storage,
            Self::InvalidSettings(_) | Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Sasl(_) | Self::Remote(_) => ErrorKind::Protocol,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Text the server sent with the failure, if any.
    #[must_use]
    pub fn server_text(&self) -> Option<&str> {
        match self {
            Self::Imap(e) => e.server_text(),
            Self::Pop3(e) => e.server_text(),
            Self::Smtp(e) => e.server_text(),
            _ => None,
        }
    }

    /// Message of the innermost error in the source chain.
    ///
    /// This is what a folder's `status` shows after a failed sync.
    #[must_use]
    pub fn root_cause_message(&self) -> String {
        let mut current: &dyn std::error::Error = self;
        while let Some(source) = current.source() {
            current = source;
        }
        current.to_string()
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to list a server's folders.
///
/// Keeps the server's own diagnostic text apart from the error so it can be
/// shown to the user verbatim. Never retried automatically.
#[derive(Debug, Error)]
#[error("Failed to fetch folders: {source}")]
pub struct FolderFetcherError {
    /// Underlying failure.
    #[source]
    pub source: Error,
    /// Text the server sent, if any.
    pub server_text: Option<String>,
}

impl FolderFetcherError {
    /// Classifies the underlying failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Always false: folder listing failures go back to the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}

impl From<Error> for FolderFetcherError {
    fn from(source: Error) -> Self {
        let server_text = source.server_text().map(str::to_string);
        Self {
            source,
            server_text,
        }
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

    #[test]
    fn test_kind_follows_protocol_error() {
        let err = Error::from(postern_pop3::Error::Auth("bad password".into()));
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.server_text(), Some("bad password"));

        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            Error::from(StorageError::FolderNotFound("X".into())).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_fetcher_error_keeps_server_text() {
        let err = FolderFetcherError::from(Error::from(postern_pop3::Error::Server(
            "[SYS/TEMP] try later".into(),
        )));
        assert_eq!(err.server_text.as_deref(), Some("[SYS/TEMP] try later"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_root_cause_message() {
        let err = Error::Transport(postern_transport::Error::NoAddress("mail.invalid".into()));
        assert_eq!(err.root_cause_message(), "No address found for mail.invalid");
    }
}
