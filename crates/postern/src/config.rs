//! Account configuration loading.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use postern_core::settings::OAuthConfig;
use postern_core::{AccountConfig, BackendFactory, MemoryStorageProvider};
use postern_sasl::{HttpTokenRefresher, MemoryAuthState, RefreshingTokenProvider, Token, TokenProvider};
use postern_transport::WebPkiTrust;
use tracing::debug;

/// Environment variable overriding the accounts file location.
const CONFIG_ENV: &str = "POSTERN_CONFIG";

/// `$POSTERN_CONFIG`, or `accounts.json` in the platform config directory.
pub fn config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("postern").join("accounts.json"))
        .context("no configuration directory on this platform; set POSTERN_CONFIG")
}

/// Reads and validates the accounts file.
pub fn load_accounts(path: &Path) -> Result<Vec<AccountConfig>> {
    let json = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    parse_accounts(&json).with_context(|| format!("invalid accounts file {}", path.display()))
}

/// Parses a JSON array of accounts and validates each one.
pub fn parse_accounts(json: &str) -> Result<Vec<AccountConfig>> {
    let accounts: Vec<AccountConfig> = serde_json::from_str(json)?;
    let mut seen = HashSet::new();
    for account in &accounts {
        if !seen.insert(account.id.as_str()) {
            bail!("duplicate account id {}", account.id);
        }
        account
            .validate()
            .with_context(|| format!("account {}", account.id))?;
    }
    debug!(count = accounts.len(), "Accounts loaded");
    Ok(accounts)
}

/// Builds the factory shared by all accounts, with a token source for every
/// account that has `OAuth2` settings.
pub fn backend_factory(accounts: &[AccountConfig]) -> Result<BackendFactory> {
    let mut factory = BackendFactory::new(Arc::new(WebPkiTrust), Arc::new(MemoryStorageProvider::new()));
    for account in accounts {
        if let Some(oauth) = &account.oauth {
            let tokens = token_provider(oauth).with_context(|| format!("account {}", account.id))?;
            factory = factory.with_tokens(account.id.clone(), tokens);
        }
    }
    Ok(factory)
}

fn token_provider(oauth: &OAuthConfig) -> Result<Arc<dyn TokenProvider>> {
    let mut refresher = HttpTokenRefresher::new(&oauth.token_url, oauth.client_id.clone())?;
    if let Some(secret) = &oauth.client_secret {
        refresher = refresher.with_client_secret(secret.clone());
    }
    // Starts expired so the first use refreshes.
    let seed = Token::new(String::new())
        .with_refresh_token(oauth.refresh_token.clone())
        .with_expires_at(DateTime::<Utc>::UNIX_EPOCH);
    let state = Arc::new(MemoryAuthState::new(Some(seed)));
    Ok(Arc::new(RefreshingTokenProvider::new(state, refresher)))
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

    const ACCOUNTS: &str = r#"[
        {
            "id": "home",
            "email": "me@example.com",
            "incoming": {
                "type": "imap",
                "host": "imap.example.com",
                "port": 993,
                "connectionSecurity": "SSL_TLS_REQUIRED",
                "authenticationType": "PLAIN",
                "username": "me",
                "password": "secret"
            },
            "outgoing": {
                "type": "smtp",
                "host": "smtp.example.com",
                "port": 587,
                "connectionSecurity": "STARTTLS",
                "authenticationType": "PLAIN",
                "username": "me",
                "password": "secret"
            },
            "sync": { "default_visible_limit": 50 },
            "retry": { "max_attempts": 5 }
        }
    ]"#;

    #[test]
    fn test_parse_accounts() {
        let accounts = parse_accounts(ACCOUNTS).unwrap();
        assert_eq!(accounts.len(), 1);
        let account = &accounts[0];
        assert_eq!(account.id, "home");
        assert_eq!(account.sync.default_visible_limit, 50);
        assert!(account.sync.sync_remote_deletions);
        assert_eq!(account.retry.max_attempts, 5);
        assert_eq!(account.pool_size, 2);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let one: serde_json::Value = serde_json::from_str(ACCOUNTS).unwrap();
        let mut list = one.as_array().unwrap().clone();
        list.push(list[0].clone());
        let err = parse_accounts(&serde_json::to_string(&list).unwrap()).unwrap_err();
        assert!(err.to_string().contains("duplicate account id home"));
    }

    #[test]
    fn test_invalid_account_names_it() {
        let json = ACCOUNTS.replace("\"imap.example.com\"", "\"\"");
        let err = parse_accounts(&json).unwrap_err();
        assert_eq!(err.to_string(), "account home");
    }

    #[test]
    fn test_factory_with_oauth_account() {
        let mut accounts = parse_accounts(ACCOUNTS).unwrap();
        accounts[0].oauth = Some(OAuthConfig {
            token_url: "https://login.example.com/token".into(),
            client_id: "client".into(),
            client_secret: None,
            refresh_token: "refresh".into(),
        });
        let factory = backend_factory(&accounts).unwrap();
        assert!(format!("{factory:?}").contains("home"));
    }
}
