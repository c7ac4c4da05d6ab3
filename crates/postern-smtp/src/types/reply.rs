//! SMTP reply types.

use std::fmt;

/// Enhanced mail system status code (RFC 3463), e.g. `5.7.8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnhancedStatus {
    /// 2 success, 4 persistent transient failure, 5 permanent failure.
    pub class: u8,
    /// Subject sub-code.
    pub subject: u16,
    /// Detail sub-code.
    pub detail: u16,
}

impl EnhancedStatus {
    /// Parses `class.subject.detail`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('.');
        let class: u8 = parts.next()?.parse().ok()?;
        let subject = parts.next()?.parse().ok()?;
        let detail = parts.next()?.parse().ok()?;
        if parts.next().is_some() || !matches!(class, 2 | 4 | 5) {
            return None;
        }
        Some(Self {
            class,
            subject,
            detail,
        })
    }
}

impl fmt::Display for EnhancedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Enhanced status code from the first line, if it carried one.
    pub enhanced: Option<EnhancedStatus>,
    /// Reply text lines, enhanced codes removed.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a reply from raw line texts (code and separator already removed).
    ///
    /// An enhanced status code is only recognized when its class matches
    /// the first digit of the reply code.
    #[must_use]
    pub fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        let class = u8::try_from(code.as_u16() / 100).unwrap_or(0);
        let mut enhanced = None;
        let message = lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| match split_enhanced(&line, class) {
                Some((status, rest)) => {
                    if i == 0 {
                        enhanced = Some(status);
                    }
                    rest.to_string()
                }
                None => line,
            })
            .collect();
        Self {
            code,
            enhanced,
            message,
        }
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code.is_intermediate()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }
}

fn split_enhanced(line: &str, class: u8) -> Option<(EnhancedStatus, &str)> {
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    let status = EnhancedStatus::parse(head)?;
    (status.class == class).then_some((status, rest))
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Codes the client acts on.
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCEEDED: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 552 Exceeded storage allocation
    pub const EXCEEDED_STORAGE: Self = Self(552);
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
    fn test_reply_code_classes() {
        assert!(ReplyCode::OK.is_success());
        assert!(ReplyCode::AUTH_CONTINUE.is_intermediate());
        assert!(ReplyCode::SERVICE_UNAVAILABLE.is_transient());
        assert!(ReplyCode::AUTH_FAILED.is_permanent());
        assert!(ReplyCode::OK < ReplyCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_enhanced_status_is_split_off() {
        let reply = Reply::new(
            ReplyCode::AUTH_FAILED,
            vec!["5.7.8 Username and Password not accepted.".into(), "5.7.8 Learn more".into()],
        );
        assert_eq!(
            reply.enhanced,
            Some(EnhancedStatus {
                class: 5,
                subject: 7,
                detail: 8
            })
        );
        assert_eq!(reply.message_text(), "Username and Password not accepted.\nLearn more");
    }

    #[test]
    fn test_enhanced_status_class_must_match() {
        let reply = Reply::new(ReplyCode::OK, vec!["5.0.0 odd".into()]);
        assert_eq!(reply.enhanced, None);
        assert_eq!(reply.message_text(), "5.0.0 odd");

        let greeting = Reply::new(ReplyCode::SERVICE_READY, vec!["smtp.example.com ESMTP".into()]);
        assert_eq!(greeting.enhanced, None);
    }

    #[test]
    fn test_enhanced_status_parse() {
        assert_eq!(EnhancedStatus::parse("2.1.5").unwrap().to_string(), "2.1.5");
        assert!(EnhancedStatus::parse("3.0.0").is_none());
        assert!(EnhancedStatus::parse("2.1").is_none());
        assert!(EnhancedStatus::parse("2.1.5.1").is_none());
        assert!(EnhancedStatus::parse("example.com").is_none());
    }
}
