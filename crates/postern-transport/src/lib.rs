//! # postern-transport
//!
//! Network plumbing shared by the IMAP, POP3 and SMTP engines.
//!
//! ## Features
//!
//! - **One stream type for every protocol**: [`MailStream`] is either plain
//!   TCP or TLS and can be upgraded in place after a STARTTLS/STLS exchange
//! - **Pluggable trust**: certificate anchors come from a [`TrustProvider`],
//!   client certificates from a [`ClientCertificateStore`]
//! - **Bounded I/O**: every connect, handshake, read and write runs under a
//!   [`Timeouts`] budget; an expired budget is a transport error
//! - **SRV discovery**: [`SrvServiceDiscovery`] finds IMAP and submission
//!   servers for an email address through an injectable [`SrvResolver`]
//!
//! ## Connecting
//!
//! ```ignore
//! use postern_transport::{connect, ConnectionSecurity, Endpoint, TlsContext, Timeouts, WebPkiTrust};
//!
//! let tls = TlsContext::new(&WebPkiTrust, None)?;
//! let endpoint = Endpoint::new("imap.example.com", 993);
//! let stream = connect(&endpoint, ConnectionSecurity::Tls, &tls, &Timeouts::default()).await?;
//! assert!(stream.is_tls());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod connect;
mod error;
mod security;
pub mod srv;
mod stream;
mod timeout;
mod tls;

pub use connect::{Endpoint, connect};
pub use error::{Error, ErrorKind, Result};
pub use security::ConnectionSecurity;
pub use srv::{
    DiscoveredServer, DiscoveryResults, HickorySrvResolver, SrvRecord, SrvResolver, SrvService,
    SrvServiceDiscovery,
};
pub use stream::MailStream;
pub use timeout::{Timeouts, duration_secs, with_timeout};
pub use tls::{
    ClientCertificateStore, ClientIdentity, PinnedTrust, TlsContext, TrustProvider, WebPkiTrust,
};

/// Re-exported certificate type used by [`TrustProvider`] implementations.
pub use rustls::pki_types::CertificateDer;
