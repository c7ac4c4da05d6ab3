//! Error types for POP3 operations.

use postern_transport::ErrorKind;

/// Result type alias for POP3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// POP3 error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket, TLS or timeout failure.
    #[error(transparent)]
    Transport(#[from] postern_transport::Error),

    /// Server answered `-ERR`.
    #[error("Server returned -ERR: {0}")]
    Server(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Unexpected or malformed server data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server lacks something the operation needs.
    #[error("Server does not support {0}")]
    MissingCapability(String),

    /// The account settings cannot work with POP3.
    #[error("Invalid POP3 settings: {0}")]
    InvalidSettings(String),

    /// An earlier transport failure left the session in an unknown state.
    #[error("Connection is poisoned by an earlier failure")]
    ConnectionPoisoned,

    /// Building a SASL response failed.
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
            Self::Transport(_) | Self::ConnectionPoisoned => ErrorKind::Transport,
            Self::Auth(_) => ErrorKind::Auth,
            Self::MissingCapability(_) | Self::InvalidSettings(_) => ErrorKind::Unsupported,
            Self::Sasl(e) if e.is_credential_problem() => ErrorKind::Auth,
            Self::Server(_) | Self::Protocol(_) | Self::Sasl(_) => ErrorKind::Protocol,
        }
    }

    /// Text the server sent with the failure, if any.
    #[must_use]
    pub fn server_text(&self) -> Option<&str> {
        match self {
            Self::Server(text) | Self::Auth(text) => Some(text),
            _ => None,
        }
    }
}
