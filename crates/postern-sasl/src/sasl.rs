//! SASL initial responses and challenge handling.
//!
//! Implements:
//! - PLAIN (RFC 4616)
//! - LOGIN (username and password as separate base64 lines)
//! - CRAM-MD5 (RFC 2195)
//! - EXTERNAL (RFC 4422)
//! - OAUTHBEARER (RFC 7628)
//! - XOAUTH2 (Google/Microsoft proprietary)
//!
//! All responses are returned base64-encoded, ready to be sent after the
//! mechanism name or as a continuation line.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::{Error, Result};

/// PLAIN initial response (RFC 4616).
///
/// Format: `<authzid>\0<username>\0<password>` with an empty authzid.
///
/// ```
/// use postern_sasl::sasl::plain;
///
/// assert_eq!(plain("test", "pass"), "AHRlc3QAcGFzcw==");
/// ```
#[must_use]
pub fn plain(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}

/// LOGIN response to the `Username:` prompt.
#[must_use]
pub fn login_username(username: &str) -> String {
    STANDARD.encode(username)
}

/// LOGIN response to the `Password:` prompt.
#[must_use]
pub fn login_password(password: &str) -> String {
    STANDARD.encode(password)
}

/// EXTERNAL initial response: the authorization identity.
#[must_use]
pub fn external(username: &str) -> String {
    STANDARD.encode(username)
}

/// Escapes a username for use as a GS2 `saslname` (RFC 5801).
///
/// `=` becomes `=3D` and `,` becomes `=2C`.
#[must_use]
pub fn sasl_name(username: &str) -> String {
    let mut escaped = String::with_capacity(username.len());
    for c in username.chars() {
        match c {
            '=' => escaped.push_str("=3D"),
            ',' => escaped.push_str("=2C"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// OAUTHBEARER initial response (RFC 7628).
///
/// Format: `n,a=<saslname>,\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn oauthbearer(username: &str, token: &str) -> String {
    let gs2 = format!("n,a={},\x01auth=Bearer {token}\x01\x01", sasl_name(username));
    STANDARD.encode(gs2)
}

/// XOAUTH2 initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn xoauth2(username: &str, token: &str) -> String {
    STANDARD.encode(format!("user={username}\x01auth=Bearer {token}\x01\x01"))
}

/// CRAM-MD5 response to a base64 server challenge (RFC 2195).
///
/// # Errors
///
/// Returns [`Error::InvalidChallenge`] if the challenge is not base64.
pub fn cram_md5(username: &str, password: &str, challenge_b64: &str) -> Result<String> {
    let challenge = STANDARD
        .decode(challenge_b64.trim())
        .map_err(|e| Error::InvalidChallenge(e.to_string()))?;
    let digest = hmac_md5(password.as_bytes(), &challenge);
    Ok(STANDARD.encode(format!("{username} {}", hex(&digest))))
}

/// APOP digest (RFC 1939): `MD5(<timestamp> + secret)` as lowercase hex.
///
/// `timestamp` includes the angle brackets from the greeting.
#[must_use]
pub fn apop_digest(timestamp: &str, password: &str) -> String {
    let mut ctx = md5::Context::new();
    ctx.consume(timestamp.as_bytes());
    ctx.consume(password.as_bytes());
    format!("{:x}", ctx.compute())
}

fn hmac_md5(key: &[u8], message: &[u8]) -> [u8; 16] {
    const BLOCK: usize = 64;

    let mut block_key = [0u8; BLOCK];
    if key.len() > BLOCK {
        block_key[..16].copy_from_slice(&md5::compute(key).0);
    } else {
        block_key[..key.len()].copy_from_slice(key);
    }

    let mut inner_pad = [0x36u8; BLOCK];
    let mut outer_pad = [0x5cu8; BLOCK];
    for ((i, o), k) in inner_pad.iter_mut().zip(outer_pad.iter_mut()).zip(block_key) {
        *i ^= k;
        *o ^= k;
    }

    let mut inner = md5::Context::new();
    inner.consume(inner_pad);
    inner.consume(message);
    let inner_hash = inner.compute();

    let mut outer = md5::Context::new();
    outer.consume(outer_pad);
    outer.consume(inner_hash.0);
    outer.compute().0
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// JSON error a server returns as a 334 challenge after a failed OAuth attempt.
///
/// Looks like `{"status":"401","schemes":"bearer","scope":"..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthChallenge {
    /// HTTP-style status code.
    pub status: String,
    /// Authentication schemes supported.
    #[serde(default)]
    pub schemes: Option<String>,
    /// `OAuth2` scope required.
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthChallenge {
    /// Decodes a base64 challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is not base64 or not the expected JSON.
    pub fn decode(challenge_b64: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(challenge_b64.trim())
            .map_err(|e| Error::InvalidChallenge(e.to_string()))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Returns true if a failed OAuth attempt is worth one retry with a fresh token.
///
/// A `400` status means the request itself was malformed, so a new token
/// will not help. Anything else, including an unreadable challenge, is
/// treated as an expired or revoked token.
#[must_use]
pub fn should_retry_oauth(challenge_b64: &str) -> bool {
    match OAuthChallenge::decode(challenge_b64) {
        Ok(challenge) => challenge.status != "400",
        Err(e) => {
            tracing::debug!(?e, "Unreadable OAuth challenge");
            true
        }
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
    use proptest::prelude::*;

    use super::*;

    fn decoded(response: &str) -> String {
        String::from_utf8(STANDARD.decode(response).unwrap()).unwrap()
    }

    #[test]
    fn test_oauthbearer_golden_vector() {
        assert_eq!(
            decoded(&oauthbearer("user", "tok")),
            "n,a=user,\u{1}auth=Bearer tok\u{1}\u{1}"
        );
    }

    #[test]
    fn test_oauthbearer_escapes_username() {
        assert_eq!(
            decoded(&oauthbearer("a=b,c", "t")),
            "n,a=a=3Db=2Cc,\u{1}auth=Bearer t\u{1}\u{1}"
        );
    }

    #[test]
    fn test_xoauth2_format() {
        assert_eq!(
            decoded(&xoauth2("test@test.com", "abc")),
            "user=test@test.com\u{1}auth=Bearer abc\u{1}\u{1}"
        );
    }

    #[test]
    fn test_plain_format() {
        assert_eq!(decoded(&plain("user", "pass@word!")), "\0user\0pass@word!");
    }

    #[test]
    fn test_login_parts() {
        assert_eq!(login_username("tim"), "dGlt");
        assert_eq!(login_password("secret"), "c2VjcmV0");
    }

    #[test]
    fn test_cram_md5_rfc2195_example() {
        let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
        let response = cram_md5("tim", "tanstaaftanstaaf", &challenge).unwrap();
        assert_eq!(decoded(&response), "tim b913a602c7eda7a495b4e6e7334d3890");
    }

    #[test]
    fn test_cram_md5_rejects_bad_challenge() {
        assert!(matches!(
            cram_md5("tim", "pw", "***"),
            Err(Error::InvalidChallenge(_))
        ));
    }

    #[test]
    fn test_apop_rfc1939_example() {
        assert_eq!(
            apop_digest("<1896.697170952@dbc.mtview.ca.us>", "tanstaaf"),
            "c4c9334bac560ecc979e58001b3e22fb"
        );
    }

    #[test]
    fn test_oauth_challenge_retry_rules() {
        let expired = STANDARD.encode(r#"{"status":"401","schemes":"bearer","scope":"mail"}"#);
        let malformed = STANDARD.encode(r#"{"status":"400","schemes":"bearer"}"#);
        assert!(should_retry_oauth(&expired));
        assert!(!should_retry_oauth(&malformed));
        assert!(should_retry_oauth("not base64!"));
    }

    #[test]
    fn test_oauth_challenge_decode() {
        let raw = STANDARD.encode(r#"{"status":"401","schemes":"bearer","scope":"https://mail.google.com/"}"#);
        let challenge = OAuthChallenge::decode(&raw).unwrap();
        assert_eq!(challenge.status, "401");
        assert_eq!(challenge.scope.as_deref(), Some("https://mail.google.com/"));
    }

    proptest! {
        #[test]
        fn prop_sasl_name_has_no_raw_separators(user in "[a-z=,@.]{0,32}") {
            let escaped = sasl_name(&user);
            prop_assert!(!escaped.contains(','));
            // Every '=' must start an escape sequence.
            let bytes = escaped.as_bytes();
            for (i, b) in bytes.iter().enumerate() {
                if *b == b'=' {
                    let rest = &escaped[i + 1..];
                    prop_assert!(rest.starts_with("3D") || rest.starts_with("2C"));
                }
            }
        }

        #[test]
        fn prop_oauthbearer_payload_is_well_formed(user in "[a-z=,@.]{1,32}", token in "[A-Za-z0-9._-]{1,40}") {
            let text = decoded(&oauthbearer(&user, &token));
            let expected_prefix = format!("n,a={},", sasl_name(&user));
            prop_assert!(text.starts_with(&expected_prefix));
            let expected_suffix = format!("\u{1}auth=Bearer {token}\u{1}\u{1}");
            prop_assert!(text.ends_with(&expected_suffix));
        }
    }
}
