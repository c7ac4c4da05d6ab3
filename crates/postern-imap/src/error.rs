//! Error types for the IMAP engine.

use postern_transport::ErrorKind;
use thiserror::Error;

use crate::types::ResponseCode;

/// Errors raised by the IMAP client.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket, TLS or timeout failure.
    #[error(transparent)]
    Transport(#[from] postern_transport::Error),

    /// A response did not follow the grammar.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte offset in the response.
        position: usize,
        /// What was wrong.
        message: String,
    },

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Tagged `NO`.
    #[error("Server returned NO: {text}")]
    No {
        /// Server text.
        text: String,
        /// Response code, e.g. `TRYCREATE`.
        code: Option<ResponseCode>,
    },

    /// Tagged `BAD`.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// The server is closing the connection.
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Unexpected but well-formed data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server lacks something the operation needs.
    #[error("Server does not support {0}")]
    MissingCapability(String),

    /// An earlier transport failure left the session in an unknown state.
    #[error("Connection is poisoned by an earlier failure")]
    ConnectionPoisoned,

    /// Building a SASL response or obtaining a token failed.
    #[error(transparent)]
    Sasl(#[from] postern_sasl::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.into())
    }
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::ConnectionPoisoned | Self::Bye(_) => ErrorKind::Transport,
            Self::Auth(_) => ErrorKind::Auth,
            Self::MissingCapability(_) => ErrorKind::Unsupported,
            Self::Sasl(e) if e.is_credential_problem() => ErrorKind::Auth,
            Self::Sasl(e) if e.is_network() => ErrorKind::Transport,
            Self::Parse { .. } | Self::No { .. } | Self::Bad(_) | Self::Protocol(_) | Self::Sasl(_) => {
                ErrorKind::Protocol
            }
        }
    }

    /// Text the server sent with the failure, if any.
    #[must_use]
    pub fn server_text(&self) -> Option<&str> {
        match self {
            Self::Auth(text) | Self::No { text, .. } | Self::Bad(text) | Self::Bye(text) => {
                Some(text)
            }
            _ => None,
        }
    }
}

/// Result type alias using the IMAP error.
pub type Result<T> = std::result::Result<T, Error>;
