//! Access token providers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::state::AuthStateStorage;
use crate::token::{ErrorResponse, Token, TokenResponse};

/// Hands out access tokens to protocol engines.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a usable access token, refreshing first if needed.
    async fn access_token(&self) -> Result<String>;

    /// Marks the current token as rejected so the next call refreshes it.
    fn invalidate(&self);
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Refreshes `token`.
    async fn refresh(&self, token: &Token) -> Result<Token>;
}

/// [`TokenProvider`] backed by an [`AuthStateStorage`] and a [`TokenRefresher`].
///
/// Refreshes are serialized so concurrent connections of one account do not
/// each burn the refresh token.
pub struct RefreshingTokenProvider<R> {
    state: Arc<dyn AuthStateStorage>,
    refresher: R,
    invalidated: AtomicBool,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl<R: TokenRefresher> RefreshingTokenProvider<R> {
    /// Creates a provider over `state`.
    pub fn new(state: Arc<dyn AuthStateStorage>, refresher: R) -> Self {
        Self {
            state,
            refresher,
            invalidated: AtomicBool::new(false),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl<R: TokenRefresher> TokenProvider for RefreshingTokenProvider<R> {
    async fn access_token(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        let token = self.state.token().ok_or(Error::NoToken)?;
        let forced = self.invalidated.swap(false, Ordering::SeqCst);
        if !forced && !token.is_expired() {
            return Ok(token.access_token);
        }

        debug!(forced, "Refreshing OAuth2 access token");
        let refreshed = self.refresher.refresh(&token).await?;
        let access = refreshed.access_token.clone();
        self.state.update(refreshed);
        Ok(access)
    }

    fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }
}

/// RFC 6749 §6 refresh against an HTTP token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http_client: Client,
    token_url: Url,
    client_id: String,
    client_secret: Option<String>,
}

impl HttpTokenRefresher {
    /// Creates a refresher for the given token endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if `token_url` is not a valid URL.
    pub fn new(token_url: &str, client_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http_client: Client::new(),
            token_url: Url::parse(token_url)?,
            client_id: client_id.into(),
            client_secret: None,
        })
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, token: &Token) -> Result<Token> {
        let refresh_token = token.refresh_token()?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.client_id);
        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await?;
            return Err(error.into_error());
        }

        let body: TokenResponse = response.json().await?;
        info!(endpoint = %self.token_url, "OAuth2 token refreshed");
        Ok(Token::from_response(body, Some(token)))
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
    use std::sync::atomic::AtomicUsize;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::state::MemoryAuthState;

    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, token: &Token) -> Result<Token> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            token.refresh_token()?;
            Ok(Token::new(format!("fresh-{n}"))
                .with_refresh_token("r")
                .with_expires_at(Utc::now() + Duration::hours(1)))
        }
    }

    fn provider(token: Option<Token>) -> (Arc<MemoryAuthState>, RefreshingTokenProvider<CountingRefresher>) {
        let state = Arc::new(MemoryAuthState::new(token));
        let provider = RefreshingTokenProvider::new(state.clone(), CountingRefresher::default());
        (state, provider)
    }

    #[tokio::test]
    async fn test_valid_token_is_reused() {
        let token = Token::new("current").with_expires_at(Utc::now() + Duration::hours(1));
        let (_, provider) = provider(Some(token));

        assert_eq!(provider.access_token().await.unwrap(), "current");
        assert_eq!(provider.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_stored() {
        let token = Token::new("stale")
            .with_refresh_token("r")
            .with_expires_at(Utc::now() - Duration::minutes(5));
        let (state, provider) = provider(Some(token));

        assert_eq!(provider.access_token().await.unwrap(), "fresh-1");
        assert_eq!(state.token().unwrap().access_token, "fresh-1");
    }

    #[tokio::test]
    async fn test_invalidate_forces_one_refresh() {
        let token = Token::new("current").with_refresh_token("r");
        let (_, provider) = provider(Some(token));

        provider.invalidate();
        assert_eq!(provider.access_token().await.unwrap(), "fresh-1");
        assert_eq!(provider.access_token().await.unwrap(), "fresh-1");
        assert_eq!(provider.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (_, provider) = provider(None);
        assert!(matches!(provider.access_token().await, Err(Error::NoToken)));
    }

    #[test]
    fn test_http_refresher_rejects_bad_url() {
        assert!(HttpTokenRefresher::new("not a url", "client").is_err());
    }
}
