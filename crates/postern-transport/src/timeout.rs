//! Time budgets for network operations.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Timeouts applied to every network call of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Budget for DNS resolution, TCP connect and TLS handshake.
    #[serde(with = "duration_secs")]
    pub connect: Duration,
    /// Budget for a single read of a server response.
    #[serde(with = "duration_secs")]
    pub read: Duration,
    /// Budget for writing a command.
    #[serde(with = "duration_secs")]
    pub write: Duration,
    /// How long an IMAP IDLE may last before it is refreshed (RFC 2177 asks
    /// for less than 30 minutes).
    #[serde(with = "duration_secs")]
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            read: Duration::from_secs(60),
            write: Duration::from_secs(60),
            idle: Duration::from_secs(29 * 60),
        }
    }
}

/// Runs `future` under `budget`, mapping expiry to [`Error::Timeout`].
///
/// # Errors
///
/// Returns [`Error::Timeout`] if the budget expires, or the future's own error.
pub async fn with_timeout<T, E, F>(operation: &'static str, budget: Duration, future: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(Error::Timeout {
            operation,
            after: budget,
        }),
    }
}

/// Serde adapter storing a [`Duration`] as whole seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes a duration as seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    /// Deserializes a duration from seconds.
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
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

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_transport_error() {
        let never = std::future::pending::<std::io::Result<()>>();
        let err = with_timeout("read", Duration::from_secs(5), never)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "read timed out after 5s");
    }

    #[tokio::test]
    async fn test_timeout_passes_through_value() {
        let ready = async { Ok::<_, std::io::Error>(7) };
        let value = with_timeout("read", Duration::from_secs(1), ready).await.unwrap();
        assert_eq!(value, 7);
    }
}
