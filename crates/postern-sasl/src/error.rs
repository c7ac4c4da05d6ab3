//! Error types for authentication helpers.

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Authentication error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request error while talking to the token endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `OAuth2` error returned by the token endpoint.
    #[error("OAuth2 error: {error} - {description}")]
    OAuth {
        /// Error code (e.g., `invalid_grant`).
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// No token has been stored for this account yet.
    #[error("No OAuth2 token available")]
    NoToken,

    /// Stored token cannot be refreshed.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// A server challenge was not valid base64.
    #[error("Invalid SASL challenge: {0}")]
    InvalidChallenge(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Returns true if the stored credential cannot be used and the user has
    /// to authorize again.
    #[must_use]
    pub const fn is_credential_problem(&self) -> bool {
        matches!(self, Self::OAuth { .. } | Self::NoToken | Self::NoRefreshToken)
    }

    /// Returns true if the token endpoint could not be reached.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Http(_))
    }

    /// Creates an OAuth error from error code and description.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }
}
