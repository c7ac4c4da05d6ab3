//! # postern-smtp
//!
//! SMTP submission client (RFC 5321) for sending a user's mail.
//!
//! ## Features
//!
//! - **Type-state connection management**: Compile-time enforcement of valid
//!   SMTP state transitions
//! - **Greeting**: EHLO with a HELO fallback, repeated after STARTTLS
//! - **TLS support**: implicit TLS or STARTTLS over a
//!   [`postern_transport::MailStream`]
//! - **Authentication**: PLAIN, LOGIN, CRAM-MD5, EXTERNAL, OAUTHBEARER and
//!   XOAUTH2, with one retry on a rejected `OAuth2` token
//! - **Extensions**: SIZE (checked before MAIL FROM), 8BITMIME,
//!   ENHANCEDSTATUSCODES
//!
//! ## Quick Start
//!
//! ```ignore
//! use postern_sasl::{AuthType, Credentials};
//! use postern_smtp::{Address, Client};
//!
//! let client = Client::connect(stream, timeouts, "localhost").await?;
//! let client = client.starttls("smtp.example.com", &tls).await?;
//! let client = client
//!     .authenticate(&Credentials::password(AuthType::Plain, "user@example.com", "password"))
//!     .await?;
//!
//! let from = Address::new("sender@example.com")?;
//! let to = [Address::new("recipient@example.com")?];
//! let client = client
//!     .send_mail(&from, &to, b"Subject: Test\r\n\r\nHello, World!\r\n")
//!     .await?;
//! client.quit().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── authenticate() ───→ Ready
//! └──────────────┘                           │
//!                                            └─── mail_from() ───→ MailTransaction ───→ RecipientAdded ───→ Data ───→ Ready
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders and DATA encoding
//! - [`connection`]: Connection management and type-state client
//! - [`parser`]: Response parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Client, Connected, Data, MailTransaction, Ready, RecipientAdded, ServerInfo, SmtpConnection,
    SmtpStream,
};
pub use error::{Error, Result};
pub use types::{Address, EnhancedStatus, Extension, Reply, ReplyCode};
