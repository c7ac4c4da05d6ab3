//! Backoff for transient failures.

use std::time::Duration;

use postern_transport::duration_secs;
use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// When and how long to wait before retrying a failed folder sync.
///
/// Only [`ErrorKind::Transport`] failures are retried. An auth failure needs
/// new credentials and a protocol or storage failure will fail the same way
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_secs")]
    pub initial_backoff: Duration,
    /// Upper bound for any delay.
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Returns true if another attempt should follow `attempt` failed ones.
    #[must_use]
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        kind == ErrorKind::Transport && attempt < self.max_attempts
    }

    /// Delay before the retry that follows failed attempt number `attempt`
    /// (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
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
    fn test_only_transport_is_retried() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(ErrorKind::Transport, 1));
        assert!(policy.should_retry(ErrorKind::Transport, 2));
        assert!(!policy.should_retry(ErrorKind::Transport, 3));
        for kind in [
            ErrorKind::Auth,
            ErrorKind::Protocol,
            ErrorKind::Storage,
            ErrorKind::Cancelled,
            ErrorKind::Unsupported,
        ] {
            assert!(!policy.should_retry(kind, 1));
        }
        assert!(!RetryPolicy::never().should_retry(ErrorKind::Transport, 1));
    }

    #[test]
    fn test_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(7), Duration::from_secs(60));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_seconds_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts":5,"initial_backoff":2}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_secs(2));
        assert_eq!(policy.max_backoff, Duration::from_secs(60));
    }
}
