//! # postern-pop3
//!
//! POP3 client (RFC 1939) with the extensions a mail app meets in practice.
//!
//! ## Features
//!
//! - **Type-state sessions**: AUTHORIZATION and TRANSACTION commands are
//!   only callable in their state
//! - **CAPA** (RFC 2449), tolerated when missing
//! - **STLS** (RFC 2595) over a [`postern_transport::MailStream`]
//! - **Authentication**: `USER`/`PASS`, `APOP`, SASL PLAIN, CRAM-MD5 and
//!   EXTERNAL (RFC 5034)
//! - **Bounded I/O**: every read and write runs under
//!   [`postern_transport::Timeouts`]; a failure poisons the session
//!
//! ## Quick Start
//!
//! ```ignore
//! use postern_pop3::Client;
//! use postern_sasl::{AuthType, Credentials};
//!
//! let client = Client::connect(stream, timeouts).await?;
//! let client = client.starttls("pop.example.com", &tls).await?;
//! let mut client = client
//!     .authenticate(&Credentials::password(AuthType::Plain, "user", "secret"))
//!     .await?;
//!
//! for entry in client.uidl().await? {
//!     let message = client.retr(entry.number).await?;
//!     println!("{} is {} bytes", entry.uid, message.len());
//! }
//! client.quit().await?;
//! ```
//!
//! ## Modules
//!
//! - [`command`]: POP3 command builders
//! - [`connection`]: Line I/O and the type-state client
//! - [`parser`]: Status line and listing parsers
//! - [`types`]: Capabilities and listing entries

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::Command;
pub use connection::{Authorization, Client, Pop3Stream, Transaction};
pub use error::{Error, Result};
pub use types::{Capabilities, ListEntry, Stat, UidlEntry};
