//! # postern-sasl
//!
//! Authentication building blocks shared by the IMAP, POP3 and SMTP engines.
//!
//! ## Features
//!
//! - **SASL initial responses**: PLAIN (RFC 4616), LOGIN, CRAM-MD5 (RFC 2195),
//!   EXTERNAL (RFC 4422), OAUTHBEARER (RFC 7628) and XOAUTH2
//! - **POP3 APOP** digests (RFC 1939)
//! - **Token state**: [`AuthStateStorage`] holds the current `OAuth2` token;
//!   [`RefreshingTokenProvider`] hands out access tokens and refreshes them
//!   through a [`TokenRefresher`]
//! - **Configured method**: [`AuthType`] and the borrowed [`Credentials`]
//!   every engine's `authenticate` takes
//!
//! Every encoder in [`sasl`] is a pure function: the same inputs always give
//! the same bytes.
//!
//! ## Using with IMAP/SMTP
//!
//! ```
//! use postern_sasl::sasl::oauthbearer;
//!
//! // AUTHENTICATE OAUTHBEARER <response>
//! let response = oauthbearer("user@example.com", "ya29.token");
//! assert!(!response.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod credentials;
mod error;
mod mechanism;
pub mod provider;
pub mod sasl;
mod state;
mod token;

pub use credentials::{AuthType, Credentials};
pub use error::{Error, Result};
pub use mechanism::Mechanism;
pub use provider::{HttpTokenRefresher, RefreshingTokenProvider, TokenProvider, TokenRefresher};
pub use state::{AuthStateStorage, MemoryAuthState};
pub use token::{ErrorResponse, Token, TokenResponse};
