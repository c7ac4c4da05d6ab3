//! # postern-imap
//!
//! IMAP client for the postern mail core, implementing RFC 3501
//! (`IMAP4rev1`) and the extensions a syncing client leans on.
//!
//! ## Features
//!
//! - **Type-state connection management**: compile-time enforcement of valid
//!   IMAP state transitions (`NotAuthenticated` → `Authenticated` → `Selected`)
//! - **Authentication by configured method**: [`Client::authenticate`]
//!   resolves PLAIN, CRAM-MD5, EXTERNAL and `OAuth2` against the announced
//!   capabilities, with SASL-IR and a single fresh-token retry for `OAuth2`
//! - **UID commands**: SEARCH, FETCH, STORE, COPY, MOVE (with a
//!   COPY/STORE/EXPUNGE fallback) and UID EXPUNGE
//! - **UIDPLUS**: `APPENDUID` and `COPYUID` are surfaced to the caller
//! - **IDLE support**: real-time notifications via RFC 2177
//! - **Sans-I/O parser**: protocol parsing separated from network I/O
//! - **Bounded I/O**: every read and write runs under the transport
//!   timeouts; a failed read poisons the connection
//!
//! ## Quick Start
//!
//! ```ignore
//! use postern_imap::{Client, FetchAttribute, SequenceSet};
//! use postern_sasl::{AuthType, Credentials};
//! use postern_transport::{connect, ConnectionSecurity, Endpoint, Timeouts, TlsContext, WebPkiTrust};
//!
//! let timeouts = Timeouts::default();
//! let tls = TlsContext::new(&WebPkiTrust, None)?;
//! let stream = connect(&Endpoint::new("imap.example.com", 993), ConnectionSecurity::Tls, &tls, &timeouts).await?;
//!
//! let client = Client::connect(stream, timeouts).await?;
//! let credentials = Credentials::password(AuthType::Plain, "user@example.com", "password");
//! let client = client.authenticate(&credentials).await?;
//!
//! let mut inbox = client.examine("INBOX").await?;
//! let first_ten = SequenceSet::range(1, 10).expect("valid range");
//! let messages = inbox
//!     .uid_fetch(&first_ten, vec![FetchAttribute::Uid, FetchAttribute::Flags])
//!     .await?;
//! println!("{} messages", messages.len());
//!
//! inbox.logout().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌─────────────────────┐
//! │   NotAuthenticated  │ ─── authenticate()/login() ───→ Authenticated
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    Authenticated    │ ─── select()/examine() ───→ Selected
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │      Selected       │ ─── close()/deselect() ───→ Authenticated
//! └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: IMAP command builders and types
//! - [`connection`]: Framed I/O, type-state client, IDLE
//! - [`parser`]: Sans-I/O response parser
//! - [`types`]: Core IMAP types (flags, mailboxes, sequences, etc.)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchAttribute, SearchKey, StoreAction, TagGenerator};
pub use connection::{
    Authenticated, Client, FetchResponse, FramedStream, IdleEvent, IdleHandle, NotAuthenticated,
    Selected,
};
pub use error::{Error, Result};
pub use parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
pub use types::{
    Capabilities, Capability, CopyUid, Flag, Flags, ListEntry, MailboxAttribute, MailboxStatus,
    ResponseCode, SeqNum, SequenceSet, StatusAttribute, StatusData, Uid, UidValidity,
};
