//! Per-account `OAuth2` state.

use std::sync::{Mutex, PoisonError};

use crate::token::Token;

/// Holds the `OAuth2` state of one account.
///
/// Shared between the backend and the token provider. Protocol code never
/// writes to it; only [`crate::TokenProvider`] implementations do, after a
/// refresh.
pub trait AuthStateStorage: Send + Sync {
    /// Returns the current token, if the account has been authorized.
    fn token(&self) -> Option<Token>;

    /// Replaces the stored token.
    fn update(&self, token: Token);
}

/// [`AuthStateStorage`] kept in memory.
#[derive(Debug, Default)]
pub struct MemoryAuthState {
    token: Mutex<Option<Token>>,
}

impl MemoryAuthState {
    /// Creates storage holding `token`.
    #[must_use]
    pub const fn new(token: Option<Token>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }
}

impl AuthStateStorage for MemoryAuthState {
    fn token(&self) -> Option<Token> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, token: Token) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }
}
