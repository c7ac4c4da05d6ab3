//! Certificate trust and TLS client configuration.

use std::fmt;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::Result;

/// Supplies trust anchors for server certificate validation.
///
/// An empty list means "bundled roots only". Anchors returned here are
/// trusted in addition to the bundled roots.
pub trait TrustProvider: Send + Sync {
    /// Returns extra trusted certificates.
    fn certificates(&self) -> Vec<CertificateDer<'static>>;
}

/// Trusts the Mozilla root program shipped with `webpki-roots` and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebPkiTrust;

impl TrustProvider for WebPkiTrust {
    fn certificates(&self) -> Vec<CertificateDer<'static>> {
        Vec::new()
    }
}

/// Trusts a fixed set of user-accepted certificates on top of the bundled roots.
#[derive(Debug, Clone, Default)]
pub struct PinnedTrust {
    certificates: Vec<CertificateDer<'static>>,
}

impl PinnedTrust {
    /// Creates a provider from DER-encoded certificates.
    #[must_use]
    pub const fn new(certificates: Vec<CertificateDer<'static>>) -> Self {
        Self { certificates }
    }
}

impl TrustProvider for PinnedTrust {
    fn certificates(&self) -> Vec<CertificateDer<'static>> {
        self.certificates.clone()
    }
}

/// Certificate chain and key used for TLS client authentication.
pub struct ClientIdentity {
    /// Leaf certificate first.
    pub chain: Vec<CertificateDer<'static>>,
    /// Private key for the leaf certificate.
    pub key: PrivateKeyDer<'static>,
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Resolves a client certificate alias to key material.
pub trait ClientCertificateStore: Send + Sync {
    /// Looks up the identity stored under `alias`.
    fn identity(&self, alias: &str) -> Option<ClientIdentity>;
}

/// A ready-to-use TLS client configuration.
#[derive(Clone)]
pub struct TlsContext {
    connector: TlsConnector,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext").finish_non_exhaustive()
    }
}

impl TlsContext {
    /// Builds a TLS context from a trust provider and an optional client identity.
    ///
    /// # Errors
    ///
    /// Returns an error if a pinned certificate or the client key is rejected
    /// by rustls.
    pub fn new(trust: &dyn TrustProvider, identity: Option<ClientIdentity>) -> Result<Self> {
        let mut roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let extra = trust.certificates();
        if !extra.is_empty() {
            debug!(count = extra.len(), "Adding user-trusted certificates");
        }
        for cert in extra {
            roots.add(cert)?;
        }

        let builder = rustls::ClientConfig::builder().with_root_certificates(roots);
        let config = match identity {
            Some(identity) => builder.with_client_auth_cert(identity.chain, identity.key)?,
            None => builder.with_no_client_auth(),
        };

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Runs the client handshake over an established TCP stream.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not a valid server name or the handshake fails.
    pub async fn handshake(&self, host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(host.to_string())?;
        let stream = self.connector.connect(server_name, tcp).await?;
        Ok(stream)
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
    use super::*;

    #[test]
    fn test_webpki_context() {
        assert!(TlsContext::new(&WebPkiTrust, None).is_ok());
    }

    #[test]
    fn test_pinned_garbage_certificate_rejected() {
        let trust = PinnedTrust::new(vec![CertificateDer::from(vec![0x30, 0x00])]);
        assert!(TlsContext::new(&trust, None).is_err());
    }
}
