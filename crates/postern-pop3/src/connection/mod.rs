//! POP3 connection management with type-state.
//!
//! ```text
//! connect() ──→ Authorization ── authenticate() ──→ Transaction ── quit()
//!                    │
//!                    └── starttls() ──→ Authorization
//! ```

mod client;
mod stream;

pub use client::{Authorization, Client, Transaction};
pub use stream::{MAX_LINE_LENGTH, Pop3Stream};
