//! Integration tests for the SMTP client.
//!
//! Each test scripts the server side with `tokio_test::io::Builder`.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use postern_sasl::{AuthType, Credentials, Mechanism, TokenProvider, sasl};
use postern_smtp::command::encode_data;
use postern_smtp::{Address, Client, Connected, Error, SmtpConnection};
use postern_transport::{ErrorKind, Timeouts};
use tokio_test::io::{Builder, Mock};

const GREETING: &[u8] = b"220 smtp.example.com ESMTP ready\r\n";
const EHLO: &[u8] = b"EHLO localhost\r\n";

async fn connect(mock: Mock) -> Client<Mock, Connected> {
    Client::connect(mock, Timeouts::default(), "localhost").await.unwrap()
}

fn password(auth_type: AuthType, user: &'static str, pass: &'static str) -> Credentials<'static> {
    Credentials::password(auth_type, user, pass)
}

#[derive(Default)]
struct Tokens {
    issued: AtomicUsize,
    invalidated: AtomicUsize,
}

#[async_trait]
impl TokenProvider for Tokens {
    async fn access_token(&self) -> postern_sasl::Result<String> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("tok{n}"))
    }

    fn invalidate(&self) {
        self.invalidated.fetch_add(1, Ordering::SeqCst);
    }
}

fn oauth_challenge(status: &str) -> String {
    STANDARD.encode(format!(r#"{{"status":"{status}","schemes":"bearer","scope":"https://mail.google.com/"}}"#))
}

#[tokio::test]
async fn test_plain_auth_and_send_with_size_and_8bitmime() {
    let message = b"Subject: hi\r\n\r\n.dot\r\n";
    let encoded = encode_data(message);
    let mail_from = format!("MAIL FROM:<a@example.com> BODY=8BITMIME SIZE={}\r\n", encoded.len());

    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250-smtp.example.com\r\n250-AUTH PLAIN LOGIN\r\n250-SIZE 1000\r\n250-8BITMIME\r\n250 ENHANCEDSTATUSCODES\r\n")
        .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
        .read(b"235 2.7.0 Authentication successful\r\n")
        .write(mail_from.as_bytes())
        .read(b"250 2.1.0 OK\r\n")
        .write(b"RCPT TO:<b@example.com>\r\n")
        .read(b"250 2.1.5 OK\r\n")
        .write(b"DATA\r\n")
        .read(b"354 Go ahead\r\n")
        .write(b"Subject: hi\r\n\r\n..dot\r\n.\r\n")
        .read(b"250 2.0.0 queued\r\n")
        .write(b"QUIT\r\n")
        .read(b"221 2.0.0 bye\r\n")
        .build();

    let client = connect(mock).await;
    assert_eq!(client.server_info().max_message_size(), Some(1000));

    let client = client
        .authenticate(&password(AuthType::Plain, "user", "pass"))
        .await
        .unwrap();
    let from = Address::new("a@example.com").unwrap();
    let to = [Address::new("b@example.com").unwrap()];
    let client = client.send_mail(&from, &to, message).await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn test_helo_fallback_when_ehlo_rejected() {
    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"502 5.5.1 Command not implemented\r\n")
        .write(b"HELO localhost\r\n")
        .read(b"250 smtp.example.com\r\n")
        .build();

    let client = connect(mock).await;
    assert!(client.server_info().extensions.is_empty());
}

#[tokio::test]
async fn test_login_when_plain_not_advertised() {
    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250-smtp.example.com\r\n250 AUTH LOGIN\r\n")
        .write(b"AUTH LOGIN\r\n")
        .read(b"334 VXNlcm5hbWU6\r\n")
        .write(b"dXNlcg==\r\n")
        .read(b"334 UGFzc3dvcmQ6\r\n")
        .write(b"cGFzcw==\r\n")
        .read(b"235 ok\r\n")
        .build();

    connect(mock)
        .await
        .authenticate(&password(AuthType::Plain, "user", "pass"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cram_md5_answers_challenge() {
    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250-smtp.example.com\r\n250 AUTH CRAM-MD5\r\n")
        .write(b"AUTH CRAM-MD5\r\n")
        .read(b"334 PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n")
        .write(b"dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw\r\n")
        .read(b"235 ok\r\n")
        .build();

    connect(mock)
        .await
        .authenticate(&password(AuthType::CramMd5, "tim", "tanstaaftanstaaf"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_mechanism_is_reported() {
    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250-smtp.example.com\r\n250 AUTH PLAIN\r\n")
        .build();

    let err = connect(mock)
        .await
        .authenticate(&password(AuthType::CramMd5, "tim", "secret"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingCapability(ref what) if what == "AUTH CRAM-MD5"));
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[tokio::test]
async fn test_rejected_password_is_auth_error() {
    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250-smtp.example.com\r\n250 AUTH PLAIN\r\n")
        .write(b"AUTH PLAIN AHVzZXIAd3Jvbmc=\r\n")
        .read(b"535 5.7.8 Username and Password not accepted\r\n")
        .build();

    let err = connect(mock)
        .await
        .authenticate(&password(AuthType::Plain, "user", "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth { code: 535, ref message } if message == "Username and Password not accepted"));
    assert_eq!(err.kind(), ErrorKind::Auth);
}

#[tokio::test]
async fn test_oauth_retries_once_with_fresh_token() {
    let first = format!("AUTH OAUTHBEARER {}\r\n", sasl::oauthbearer("user", "tok1"));
    let second = format!("AUTH OAUTHBEARER {}\r\n", sasl::oauthbearer("user", "tok2"));
    let challenge = format!("334 {}\r\n", oauth_challenge("401"));

    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250-smtp.example.com\r\n250 AUTH XOAUTH2 OAUTHBEARER\r\n")
        .write(first.as_bytes())
        .read(challenge.as_bytes())
        .write(b"\r\n")
        .read(b"535 5.7.8 token expired\r\n")
        .write(second.as_bytes())
        .read(b"235 2.7.0 Accepted\r\n")
        .build();

    let tokens = Tokens::default();
    connect(mock)
        .await
        .authenticate(&Credentials::oauth("user", &tokens))
        .await
        .unwrap();
    assert_eq!(tokens.issued.load(Ordering::SeqCst), 2);
    assert_eq!(tokens.invalidated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_oauth_bad_request_is_not_retried() {
    let first = format!("AUTH XOAUTH2 {}\r\n", sasl::xoauth2("user", "tok1"));
    let challenge = format!("334 {}\r\n", oauth_challenge("400"));

    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250-smtp.example.com\r\n250 AUTH XOAUTH2\r\n")
        .write(first.as_bytes())
        .read(challenge.as_bytes())
        .write(b"\r\n")
        .read(b"535 5.7.8 bad request\r\n")
        .build();

    let tokens = Tokens::default();
    let err = connect(mock)
        .await
        .authenticate(&Credentials::oauth("user", &tokens))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(tokens.issued.load(Ordering::SeqCst), 1);
    assert_eq!(tokens.invalidated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_oversized_message_fails_before_mail_from() {
    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250-smtp.example.com\r\n250 SIZE 10\r\n")
        .build();

    let client = connect(mock)
        .await
        .authenticate(&password(AuthType::None, "", ""))
        .await
        .unwrap();
    let from = Address::new("a@example.com").unwrap();
    let to = [Address::new("b@example.com").unwrap()];
    let err = client
        .send_mail(&from, &to, b"Subject: this is longer than ten bytes\r\n")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MessageTooLarge { max: 10, .. }));
}

#[tokio::test]
async fn test_rejected_recipient_keeps_enhanced_status() {
    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250 smtp.example.com\r\n")
        .write(b"MAIL FROM:<a@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<nobody@example.com>\r\n")
        .read(b"550 5.1.1 No such user\r\n")
        .build();

    let client = connect(mock)
        .await
        .authenticate(&password(AuthType::None, "", ""))
        .await
        .unwrap();
    let err = client
        .mail_from(&Address::new("a@example.com").unwrap(), None)
        .await
        .unwrap()
        .rcpt_to(&Address::new("nobody@example.com").unwrap())
        .await
        .unwrap_err();

    let Error::SmtpError { code, enhanced, ref message } = err else {
        panic!("expected SmtpError, got {err:?}");
    };
    assert_eq!(code, 550);
    assert_eq!(enhanced.map(|e| e.to_string()).as_deref(), Some("5.1.1"));
    assert_eq!(message, "No such user");
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_external_sends_identity() {
    let expected = format!("AUTH EXTERNAL {}\r\n", sasl::external("user@example.com"));
    let mock = Builder::new()
        .read(GREETING)
        .write(EHLO)
        .read(b"250-smtp.example.com\r\n250 AUTH EXTERNAL PLAIN\r\n")
        .write(expected.as_bytes())
        .read(b"235 ok\r\n")
        .build();

    let client = connect(mock).await;
    assert!(client.server_info().has_auth(Mechanism::External));
    client
        .authenticate(&Credentials {
            auth_type: AuthType::External,
            username: "user@example.com",
            password: None,
            tokens: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_service_unavailable_greeting() {
    let mock = Builder::new().read(b"421 4.3.2 try again later\r\n").build();
    let err = Client::connect(mock, Timeouts::default(), "localhost")
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_reply_poisons_client() {
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (stream, mut server) = tokio::io::duplex(4096);
    server
        .write_all(b"220 smtp.example.com ESMTP\r\n250 smtp.example.com\r\n")
        .await
        .unwrap();
    let timeouts = Timeouts {
        read: Duration::from_secs(5),
        ..Timeouts::default()
    };

    let mut client = Client::connect(stream, timeouts, "localhost").await.unwrap();
    let err = client.noop().await.unwrap_err();
    assert!(matches!(err, Error::Transport(ref e) if e.is_timeout()));
    assert!(client.is_poisoned());

    let err = client.noop().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionPoisoned));

    let mut sent = vec![0; 64];
    let n = server.read(&mut sent).await.unwrap();
    assert!(sent[..n].starts_with(b"EHLO localhost\r\n"));
}
