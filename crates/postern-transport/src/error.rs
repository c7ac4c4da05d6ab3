//! Error types for the transport layer.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Coarse classification shared by every protocol crate.
///
/// Decides whether a failure may be retried and how it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Network, DNS, TLS or timeout failure. The connection is gone.
    Transport,
    /// Credentials were rejected.
    Auth,
    /// The server sent something malformed or unexpected.
    Protocol,
    /// Local storage failed.
    Storage,
    /// The operation was cancelled by the caller.
    Cancelled,
    /// The account or server does not support the requested operation.
    Unsupported,
}

impl ErrorKind {
    /// Returns true for failures that a later attempt may not hit again.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Transport)
    }
}

/// Errors raised while establishing or using a mail transport.
///
/// Every variant is a transport failure: the connection it happened on must
/// be discarded.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Host name cannot be used as a TLS server name.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A network operation exceeded its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited on.
        operation: &'static str,
        /// The budget that expired.
        after: Duration,
    },

    /// Name resolution produced no usable address.
    #[error("No address found for {0}")]
    NoAddress(String),

    /// DNS lookup failed.
    #[error("DNS lookup failed: {0}")]
    Dns(String),

    /// The configured client certificate could not be loaded.
    #[error("Client certificate unavailable: {0}")]
    ClientCertificate(String),

    /// STARTTLS was requested on a stream that is already encrypted.
    #[error("Stream is already using TLS")]
    AlreadyTls,
}

impl Error {
    /// Every transport error classifies as [`ErrorKind::Transport`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Transport
    }

    /// Returns true if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias using the transport error.
pub type Result<T> = std::result::Result<T, Error>;
