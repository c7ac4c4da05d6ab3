//! DNS SRV based server discovery (RFC 6186).
//!
//! Given an email address, [`SrvServiceDiscovery`] asks DNS for the
//! `_submission`, `_imap` and `_imaps` services of its domain, in that
//! order, and turns the answers into connection candidates.

use std::cmp::Ordering;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::error::ResolveErrorKind;
use tracing::{debug, trace, warn};

use crate::security::ConnectionSecurity;
use crate::{Error, Result};

/// A single SRV answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    /// Lower is preferred.
    pub priority: u16,
    /// Higher is preferred among equal priorities.
    pub weight: u16,
    /// Service port.
    pub port: u16,
    /// Target host, without a trailing dot. `"."` means "service not offered".
    pub target: String,
}

impl Ord for SrvRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.weight.cmp(&self.weight))
    }
}

impl PartialOrd for SrvRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Performs SRV lookups.
#[async_trait]
pub trait SrvResolver: Send + Sync {
    /// Looks up the SRV records of `name`. A missing record set is `Ok(vec![])`.
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>>;
}

#[async_trait]
impl<T: SrvResolver + ?Sized> SrvResolver for std::sync::Arc<T> {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>> {
        (**self).lookup_srv(name).await
    }
}

/// [`SrvResolver`] backed by the system resolver configuration.
pub struct HickorySrvResolver {
    resolver: TokioAsyncResolver,
}

impl HickorySrvResolver {
    /// Creates a resolver from `/etc/resolv.conf` (or the platform equivalent).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dns`] if the system configuration cannot be read.
    pub fn from_system_conf() -> Result<Self> {
        let resolver =
            TokioAsyncResolver::tokio_from_system_conf().map_err(|e| Error::Dns(e.to_string()))?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl SrvResolver for HickorySrvResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>> {
        match self.resolver.srv_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|srv| SrvRecord {
                    priority: srv.priority(),
                    weight: srv.weight(),
                    port: srv.port(),
                    target: srv.target().to_utf8(),
                })
                .collect()),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(Error::Dns(e.to_string())),
        }
    }
}

/// The services queried during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SrvService {
    /// Message submission, RFC 6409.
    Submission,
    /// IMAP with STARTTLS.
    Imap,
    /// IMAP over implicit TLS.
    Imaps,
}

impl SrvService {
    /// Lookup order used by [`SrvServiceDiscovery::discover`].
    pub const ALL: [Self; 3] = [Self::Submission, Self::Imap, Self::Imaps];

    /// The service label, e.g. `_imaps._tcp`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submission => "_submission._tcp",
            Self::Imap => "_imap._tcp",
            Self::Imaps => "_imaps._tcp",
        }
    }

    /// Security used when connecting to a server found under this service.
    #[must_use]
    pub const fn security(self) -> ConnectionSecurity {
        match self {
            Self::Submission | Self::Imap => ConnectionSecurity::StartTls,
            Self::Imaps => ConnectionSecurity::Tls,
        }
    }
}

/// A connection candidate produced by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    /// Service the record was found under.
    pub service: SrvService,
    /// Target host.
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Security implied by the service.
    pub security: ConnectionSecurity,
    /// Record priority, kept for ordering across services.
    pub priority: u16,
}

/// Discovered incoming and outgoing candidates, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryResults {
    /// IMAP servers.
    pub incoming: Vec<DiscoveredServer>,
    /// Submission servers.
    pub outgoing: Vec<DiscoveredServer>,
}

/// Finds mail servers for an address via SRV records.
pub struct SrvServiceDiscovery<R> {
    resolver: R,
}

impl<R: SrvResolver> SrvServiceDiscovery<R> {
    /// Creates a discovery service over `resolver`.
    pub const fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Discovers servers for `email`.
    ///
    /// Returns `None` when the address has no domain or no service is
    /// advertised. Lookup failures count as "no records" for that service.
    pub async fn discover(&self, email: &str) -> Option<DiscoveryResults> {
        let domain = email.rsplit_once('@').map(|(_, d)| d.trim())?;
        if domain.is_empty() {
            return None;
        }

        let mut results = DiscoveryResults::default();
        for service in SrvService::ALL {
            let found = self.lookup(service, domain).await;
            match service {
                SrvService::Submission => results.outgoing.extend(found),
                SrvService::Imap | SrvService::Imaps => results.incoming.extend(found),
            }
        }

        // Stable sort: equal priorities keep the IMAP-before-IMAPS query order.
        results.incoming.sort_by_key(|s| s.priority);

        if results.incoming.is_empty() && results.outgoing.is_empty() {
            debug!(domain, "No SRV records found");
            return None;
        }
        Some(results)
    }

    async fn lookup(&self, service: SrvService, domain: &str) -> Vec<DiscoveredServer> {
        let name = format!("{}.{domain}", service.label());
        let mut records = match self.resolver.lookup_srv(&name).await {
            Ok(records) => records,
            Err(e) => {
                warn!(?e, %name, "SRV lookup failed");
                return Vec::new();
            }
        };
        records.retain(|r| r.target != "." && !r.target.is_empty());
        records.sort();
        trace!(%name, ?records, "SRV answers");

        records
            .into_iter()
            .map(|r| DiscoveredServer {
                service,
                host: r.target.trim_end_matches('.').to_string(),
                port: r.port,
                security: service.security(),
                priority: r.priority,
            })
            .collect()
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
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct RecordingResolver {
        answers: HashMap<String, Vec<SrvRecord>>,
        queries: Mutex<Vec<String>>,
    }

    impl RecordingResolver {
        fn with(mut self, name: &str, records: Vec<SrvRecord>) -> Self {
            self.answers.insert(name.to_string(), records);
            self
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SrvResolver for RecordingResolver {
        async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>> {
            self.queries.lock().unwrap().push(name.to_string());
            Ok(self.answers.get(name).cloned().unwrap_or_default())
        }
    }

    fn record(priority: u16, weight: u16, port: u16, target: &str) -> SrvRecord {
        SrvRecord {
            priority,
            weight,
            port,
            target: target.to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_result_returns_none_after_three_queries() {
        let resolver = Arc::new(RecordingResolver::default());
        let discovery = SrvServiceDiscovery::new(Arc::clone(&resolver));

        assert!(discovery.discover("test@example.com").await.is_none());
        assert_eq!(
            resolver.queries(),
            vec![
                "_submission._tcp.example.com",
                "_imap._tcp.example.com",
                "_imaps._tcp.example.com",
            ]
        );
    }

    #[tokio::test]
    async fn test_records_are_ordered_and_typed() {
        let resolver = Arc::new(RecordingResolver::default()
            .with(
                "_imaps._tcp.example.com",
                vec![
                    record(10, 5, 993, "backup.example.com."),
                    record(0, 1, 993, "low.example.com."),
                    record(0, 50, 993, "heavy.example.com."),
                ],
            )
            .with(
                "_submission._tcp.example.com",
                vec![record(0, 0, 587, "smtp.example.com.")],
            ));
        let discovery = SrvServiceDiscovery::new(Arc::clone(&resolver));

        let results = discovery.discover("someone@example.com").await.unwrap();
        let hosts: Vec<_> = results.incoming.iter().map(|s| s.host.as_str()).collect();
        assert_eq!(hosts, vec!["heavy.example.com", "low.example.com", "backup.example.com"]);
        assert!(results.incoming.iter().all(|s| s.security == ConnectionSecurity::Tls));

        assert_eq!(results.outgoing.len(), 1);
        assert_eq!(results.outgoing[0].port, 587);
        assert_eq!(results.outgoing[0].security, ConnectionSecurity::StartTls);
    }

    #[tokio::test]
    async fn test_root_target_means_not_offered() {
        let resolver = Arc::new(
            RecordingResolver::default().with("_imap._tcp.example.com", vec![record(0, 0, 0, ".")]),
        );
        let discovery = SrvServiceDiscovery::new(Arc::clone(&resolver));

        assert!(discovery.discover("a@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_address_without_domain() {
        let resolver = Arc::new(RecordingResolver::default());
        let discovery = SrvServiceDiscovery::new(Arc::clone(&resolver));

        assert!(discovery.discover("no-at-sign").await.is_none());
        assert!(resolver.queries().is_empty());
    }
}
