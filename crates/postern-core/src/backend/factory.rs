//! Building backends from account configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use postern_sasl::TokenProvider;
use postern_transport::{ClientCertificateStore, TlsContext, TrustProvider};
use tracing::{debug, info};

use super::connector::Connector;
use super::{Backend, ImapBackend, Pop3Backend};
use crate::settings::{AccountConfig, Protocol, ServerSettings};
use crate::storage::{BackendStorage, MemoryStorage};
use crate::{Error, Result};

/// Hands out the local storage for an account.
pub trait StorageProvider: Send + Sync {
    /// Returns the storage for `account`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be opened.
    fn storage_for(&self, account: &AccountConfig) -> Result<Arc<dyn BackendStorage>>;
}

/// Keeps each account's storage in memory for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryStorageProvider {
    accounts: Mutex<HashMap<String, Arc<MemoryStorage>>>,
}

impl MemoryStorageProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageProvider for MemoryStorageProvider {
    fn storage_for(&self, account: &AccountConfig) -> Result<Arc<dyn BackendStorage>> {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        let storage = accounts.entry(account.id.clone()).or_default();
        Ok(Arc::clone(storage) as Arc<dyn BackendStorage>)
    }
}

/// Creates the right [`Backend`] for an account.
///
/// The incoming server's protocol picks the implementation. Everything
/// shared between accounts (trust, client certificates, storage and
/// `OAuth2` token sources) is held here.
pub struct BackendFactory {
    trust: Arc<dyn TrustProvider>,
    certificates: Option<Arc<dyn ClientCertificateStore>>,
    storage: Arc<dyn StorageProvider>,
    tokens: HashMap<String, Arc<dyn TokenProvider>>,
}

impl fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendFactory")
            .field("has_certificates", &self.certificates.is_some())
            .field("token_accounts", &self.tokens.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl BackendFactory {
    /// Creates a factory.
    #[must_use]
    pub fn new(trust: Arc<dyn TrustProvider>, storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            trust,
            certificates: None,
            storage,
            tokens: HashMap::new(),
        }
    }

    /// Sets the store client certificate aliases resolve against.
    #[must_use]
    pub fn with_certificates(mut self, certificates: Arc<dyn ClientCertificateStore>) -> Self {
        self.certificates = Some(certificates);
        self
    }

    /// Registers the `OAuth2` token source for an account.
    #[must_use]
    pub fn with_tokens(mut self, account_id: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens.insert(account_id.into(), tokens);
        self
    }

    /// Returns the local storage for `account`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider fails.
    pub fn create_backend_storage(&self, account: &AccountConfig) -> Result<Arc<dyn BackendStorage>> {
        self.storage.storage_for(account)
    }

    /// Validates `account` and builds its backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSettings`] for invalid settings, a transport
    /// error when the client certificate alias is unknown, and
    /// [`Error::Unsupported`] for protocols without a backend.
    pub fn create_backend(&self, account: &AccountConfig) -> Result<Arc<dyn Backend>> {
        account.validate()?;
        let storage = self.create_backend_storage(account)?;
        let incoming = self.connector(account, &account.incoming)?;
        let outgoing = account
            .outgoing
            .as_ref()
            .map(|settings| self.connector(account, settings))
            .transpose()?;

        let backend: Arc<dyn Backend> = match account.incoming.protocol {
            Protocol::Imap => Arc::new(ImapBackend::new(
                incoming,
                outgoing,
                storage,
                account.pool_size,
                account.sync.expunge_policy,
            )),
            Protocol::Pop3 => Arc::new(Pop3Backend::new(incoming, outgoing, storage)),
            protocol @ (Protocol::WebDav | Protocol::Jmap | Protocol::Smtp) => {
                return Err(Error::Unsupported(format!("no backend for {protocol}")));
            }
        };
        info!(
            account = %account.id,
            protocol = %account.incoming.protocol,
            host = %account.incoming.host,
            "Backend created"
        );
        Ok(backend)
    }

    fn connector(&self, account: &AccountConfig, settings: &ServerSettings) -> Result<Connector> {
        let identity = match settings.client_certificate_alias.as_deref() {
            Some(alias) => {
                let identity = self
                    .certificates
                    .as_ref()
                    .and_then(|store| store.identity(alias))
                    .ok_or_else(|| postern_transport::Error::ClientCertificate(alias.to_string()))?;
                debug!(alias, "Using client certificate");
                Some(identity)
            }
            None => None,
        };
        let tls = TlsContext::new(self.trust.as_ref(), identity)?;
        Ok(Connector::new(
            settings.clone(),
            tls,
            account.timeouts,
            self.tokens.get(&account.id).cloned(),
        ))
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
    use postern_sasl::AuthType;
    use postern_transport::{ConnectionSecurity, WebPkiTrust};

    use super::*;

    fn server(protocol: Protocol) -> ServerSettings {
        ServerSettings::new(
            protocol,
            "mail.example.com",
            protocol.default_port(ConnectionSecurity::Tls),
            ConnectionSecurity::Tls,
            AuthType::Plain,
            "user",
            Some("secret".to_string()),
        )
        .unwrap()
    }

    fn account(incoming: Protocol) -> AccountConfig {
        serde_json::from_value(serde_json::json!({
            "id": "work",
            "email": "user@example.com",
            "incoming": serde_json::to_value(server(incoming)).unwrap(),
            "outgoing": serde_json::to_value(server(Protocol::Smtp)).unwrap(),
        }))
        .unwrap()
    }

    fn factory() -> BackendFactory {
        BackendFactory::new(Arc::new(WebPkiTrust), Arc::new(MemoryStorageProvider::new()))
    }

    #[test]
    fn test_creates_backend_per_protocol() {
        let factory = factory();
        let imap = factory.create_backend(&account(Protocol::Imap)).unwrap();
        assert!(imap.supports_flags());
        assert!(imap.is_push_capable());

        let pop3 = factory.create_backend(&account(Protocol::Pop3)).unwrap();
        assert!(!pop3.supports_flags());
        assert!(!pop3.supports_move());
    }

    #[test]
    fn test_webdav_incoming_is_rejected() {
        let mut config = account(Protocol::Imap);
        config.incoming.protocol = Protocol::WebDav;
        let err = factory().create_backend(&config).err().unwrap();
        assert!(matches!(err, Error::InvalidSettings(_)));
    }

    #[test]
    fn test_missing_client_certificate() {
        let mut config = account(Protocol::Imap);
        config.incoming.client_certificate_alias = Some("laptop".into());
        let err = factory().create_backend(&config).err().unwrap();
        assert!(matches!(
            err,
            Error::Transport(postern_transport::Error::ClientCertificate(ref alias)) if alias == "laptop"
        ));
    }

    #[test]
    fn test_storage_is_shared_per_account() {
        let factory = factory();
        let config = account(Protocol::Imap);
        let first = factory.create_backend_storage(&config).unwrap();
        first.create_folders(&[crate::folder::RemoteFolder::pop3_inbox()]).unwrap();
        let second = factory.create_backend_storage(&config).unwrap();
        assert_eq!(second.folder_server_ids().unwrap(), vec!["INBOX"]);
    }
}
