//! Error types for SMTP operations.

use postern_transport::ErrorKind;

use crate::types::{EnhancedStatus, Reply};

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket, TLS or timeout failure.
    #[error(transparent)]
    Transport(#[from] postern_transport::Error),

    /// Server returned error response.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Enhanced status code, when the server sent one.
        enhanced: Option<EnhancedStatus>,
        /// Error message from server.
        message: String,
    },

    /// The server rejected the credentials.
    #[error("Authentication failed ({code}): {message}")]
    Auth {
        /// Reply code, usually 535.
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Message larger than the server's advertised SIZE.
    #[error("Message of {size} bytes exceeds the server limit of {max} bytes")]
    MessageTooLarge {
        /// Message size.
        size: usize,
        /// Advertised limit.
        max: usize,
    },

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    MissingCapability(String),

    /// An earlier transport failure left the session in an unknown state.
    #[error("Connection is poisoned by an earlier failure")]
    ConnectionPoisoned,

    /// Building a SASL response or fetching a token failed.
    #[error(transparent)]
    Sasl(#[from] postern_sasl::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.into())
    }
}

impl Error {
    /// Creates an SMTP error from a negative reply.
    #[must_use]
    pub fn from_reply(reply: &Reply) -> Self {
        Self::SmtpError {
            code: reply.code.as_u16(),
            enhanced: reply.enhanced,
            message: reply.message_text(),
        }
    }

    /// Creates an authentication error from a negative reply.
    #[must_use]
    pub fn auth(reply: &Reply) -> Self {
        Self::Auth {
            code: reply.code.as_u16(),
            message: reply.message_text(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }

    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::ConnectionPoisoned => ErrorKind::Transport,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Sasl(e) if e.is_credential_problem() => ErrorKind::Auth,
            Self::MissingCapability(_) => ErrorKind::Unsupported,
            Self::SmtpError { .. }
            | Self::Protocol(_)
            | Self::InvalidAddress(_)
            | Self::MessageTooLarge { .. }
            | Self::Sasl(_) => ErrorKind::Protocol,
        }
    }

    /// Text the server sent with the failure, if any.
    #[must_use]
    pub fn server_text(&self) -> Option<&str> {
        match self {
            Self::SmtpError { message, .. } | Self::Auth { message, .. } => Some(message),
            _ => None,
        }
    }
}
