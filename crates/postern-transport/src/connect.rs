//! Establishing connections.

use std::fmt;
use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::security::ConnectionSecurity;
use crate::stream::MailStream;
use crate::timeout::{Timeouts, with_timeout};
use crate::tls::TlsContext;
use crate::{Error, Result};

/// A host and port to connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or address literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens a connection to `endpoint`.
///
/// The host is resolved lazily here and every returned address is tried in
/// order, each under the connect budget. For [`ConnectionSecurity::Tls`] the
/// handshake completes before this returns. For
/// [`ConnectionSecurity::StartTls`] the caller upgrades the stream itself
/// once the protocol has negotiated it.
///
/// # Errors
///
/// Returns the last connect error if no address accepted the connection, or
/// a timeout / TLS error.
pub async fn connect(
    endpoint: &Endpoint,
    security: ConnectionSecurity,
    tls: &TlsContext,
    timeouts: &Timeouts,
) -> Result<MailStream> {
    let addrs: Vec<SocketAddr> = with_timeout(
        "DNS lookup",
        timeouts.connect,
        tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port)),
    )
    .await?
    .collect();

    if addrs.is_empty() {
        return Err(Error::NoAddress(endpoint.host.clone()));
    }

    let mut last_error = None;
    let mut tcp = None;
    for addr in addrs {
        debug!(%endpoint, %addr, "Connecting");
        match with_timeout("connect", timeouts.connect, TcpStream::connect(addr)).await {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(e) => {
                warn!(?e, %addr, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    let Some(tcp) = tcp else {
        return Err(last_error.unwrap_or_else(|| Error::NoAddress(endpoint.host.clone())));
    };

    if security.is_implicit_tls() {
        let stream = with_timeout(
            "TLS handshake",
            timeouts.connect,
            tls.handshake(&endpoint.host, tcp),
        )
        .await?;
        return Ok(MailStream::Tls(Box::new(stream)));
    }

    Ok(MailStream::Plain(tcp))
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
    use crate::tls::WebPkiTrust;

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("mail.example.com", 993).to_string(), "mail.example.com:993");
    }

    #[tokio::test]
    async fn test_connect_plain_to_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let tls = TlsContext::new(&WebPkiTrust, None).unwrap();
        let stream = connect(
            &Endpoint::new("127.0.0.1", port),
            ConnectionSecurity::StartTls,
            &tls,
            &Timeouts::default(),
        )
        .await
        .unwrap();

        assert!(!stream.is_tls());
        accept.await.unwrap().unwrap();
    }
}
