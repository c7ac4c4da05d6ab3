//! IMAP connection handling.
//!
//! - Framed I/O with literals, under transport timeouts
//! - Type-state client wrapper
//! - IDLE support for real-time notifications

mod client;
mod framed;
mod idle;

pub use client::{Authenticated, Client, FetchResponse, NotAuthenticated, Selected};
pub use framed::{FramedStream, MAX_LINE_LENGTH, MAX_LITERAL_SIZE};
pub use idle::{IdleEvent, IdleHandle};
