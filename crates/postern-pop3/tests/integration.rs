//! Integration tests for the POP3 client against scripted servers.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use postern_pop3::{Authorization, Client, Error};
use postern_sasl::{AuthType, Credentials};
use postern_transport::Timeouts;
use tokio_test::io::{Builder, Mock};

const GREETING: &[u8] = b"+OK POP3 server ready <1896.697170952@dbc.mtview.ca.us>\r\n";

async fn connect(mock: Mock) -> Client<Mock, Authorization> {
    Client::connect(mock, Timeouts::default()).await.unwrap()
}

#[tokio::test]
async fn test_user_pass_when_sasl_plain_missing() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"+OK\r\nUIDL\r\nTOP\r\nUSER\r\n.\r\n")
        .write(b"USER alice\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK maildrop locked\r\n")
        .write(b"STAT\r\n")
        .read(b"+OK 2 320\r\n")
        .build();

    let mut client = connect(mock)
        .await
        .authenticate(&Credentials::password(AuthType::Plain, "alice", "secret"))
        .await
        .unwrap();
    let stat = client.stat().await.unwrap();
    assert_eq!((stat.count, stat.size), (2, 320));
}

#[tokio::test]
async fn test_rejected_pass_is_auth_failure() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"-ERR unknown command\r\n")
        .write(b"USER alice\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS wrong\r\n")
        .read(b"-ERR [AUTH] invalid password\r\n")
        .build();

    let client = connect(mock).await;
    assert!(!client.capabilities().capa);
    let err = client
        .authenticate(&Credentials::password(AuthType::Plain, "alice", "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(ref text) if text.contains("invalid password")));
    assert_eq!(err.kind(), postern_transport::ErrorKind::Auth);
}

#[tokio::test]
async fn test_sasl_plain_waits_for_continuation() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"+OK\r\nSASL PLAIN\r\n.\r\n")
        .write(b"AUTH PLAIN\r\n")
        .read(b"+ \r\n")
        .write(b"AHVzZXIAcGFzcw==\r\n")
        .read(b"+OK welcome\r\n")
        .build();

    connect(mock)
        .await
        .authenticate(&Credentials::password(AuthType::Plain, "user", "pass"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cram_md5_without_sasl_uses_apop() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"+OK\r\nUIDL\r\n.\r\n")
        .write(b"APOP mrose c4c9334bac560ecc979e58001b3e22fb\r\n")
        .read(b"+OK maildrop has 1 message\r\n")
        .build();

    connect(mock)
        .await
        .authenticate(&Credentials::password(AuthType::CramMd5, "mrose", "tanstaaf"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_apop_needs_greeting_timestamp() {
    let mock = Builder::new()
        .read(b"+OK ready\r\n")
        .write(b"CAPA\r\n")
        .read(b"-ERR\r\n")
        .build();

    let err = connect(mock)
        .await
        .authenticate(&Credentials::password(AuthType::CramMd5, "mrose", "tanstaaf"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingCapability(ref what) if what == "APOP"));
}

#[tokio::test]
async fn test_sasl_cram_md5_answers_challenge() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"+OK\r\nSASL CRAM-MD5\r\n.\r\n")
        .write(b"AUTH CRAM-MD5\r\n")
        .read(b"+ PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n")
        .write(b"dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw\r\n")
        .read(b"+OK\r\n")
        .build();

    connect(mock)
        .await
        .authenticate(&Credentials::password(AuthType::CramMd5, "tim", "tanstaaftanstaaf"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_oauth_is_invalid_for_pop3() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"+OK\r\n.\r\n")
        .build();

    let creds = Credentials {
        auth_type: AuthType::XOAuth2,
        username: "alice",
        password: None,
        tokens: None,
    };
    let err = connect(mock).await.authenticate(&creds).await.unwrap_err();
    assert!(matches!(err, Error::InvalidSettings(_)));
    assert_eq!(err.kind(), postern_transport::ErrorKind::Unsupported);
}

#[tokio::test]
async fn test_uidl_retr_dele_quit() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"+OK\r\nUIDL\r\n.\r\n")
        .write(b"USER alice\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK\r\n")
        .write(b"UIDL\r\n")
        .read(b"+OK\r\n1 whqtswO00WBw418f9t5JxYwZ\r\n2 QhdPYR:00WBw1Ph7x7\r\n.\r\n")
        .write(b"RETR 2\r\n")
        .read(b"+OK 31 octets\r\nSubject: x\r\n\r\n..leading dot\r\n.\r\n")
        .write(b"DELE 2\r\n")
        .read(b"+OK message 2 deleted\r\n")
        .write(b"QUIT\r\n")
        .read(b"+OK bye\r\n")
        .build();

    let mut client = connect(mock)
        .await
        .authenticate(&Credentials::password(AuthType::Plain, "alice", "secret"))
        .await
        .unwrap();

    let uids = client.uidl().await.unwrap();
    assert_eq!(uids.len(), 2);
    assert_eq!(uids[1].uid, "QhdPYR:00WBw1Ph7x7");

    let message = client.retr(uids[1].number).await.unwrap();
    assert_eq!(message, b"Subject: x\r\n\r\n.leading dot\r\n");

    client.dele(2).await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn test_top_requires_capability_when_capa_answered() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"+OK\r\nUIDL\r\n.\r\n")
        .write(b"USER alice\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK\r\n")
        .build();

    let mut client = connect(mock)
        .await
        .authenticate(&Credentials::password(AuthType::Plain, "alice", "secret"))
        .await
        .unwrap();
    assert!(matches!(
        client.top(1, 0).await,
        Err(Error::MissingCapability(ref what)) if what == "TOP"
    ));
}

#[tokio::test]
async fn test_err_reply_keeps_session_usable() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"+OK\r\n.\r\n")
        .write(b"USER alice\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK\r\n")
        .write(b"LIST 9\r\n")
        .read(b"-ERR no such message\r\n")
        .write(b"NOOP\r\n")
        .read(b"+OK\r\n")
        .build();

    let mut client = connect(mock)
        .await
        .authenticate(&Credentials::password(AuthType::Plain, "alice", "secret"))
        .await
        .unwrap();
    assert!(matches!(client.list_one(9).await, Err(Error::Server(_))));
    assert!(!client.is_poisoned());
    client.noop().await.unwrap();
}

#[tokio::test]
async fn test_capa_reports_stls_and_sasl() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"+OK Capability list follows\r\nSTLS\r\nSASL PLAIN EXTERNAL\r\nUIDL\r\n.\r\n")
        .build();

    let client = connect(mock).await;
    let caps = client.capabilities();
    assert!(caps.stls);
    assert!(caps.uidl);
    assert!(!caps.top);
    assert!(caps.has_sasl(postern_sasl::Mechanism::External));
}

#[tokio::test]
async fn test_garbage_reply_poisons() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"CAPA\r\n")
        .read(b"* OK this is IMAP\r\n")
        .build();

    let err = Client::connect(mock, Timeouts::default()).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_times_out() {
    let (stream, _server) = tokio::io::duplex(1024);
    let timeouts = Timeouts {
        read: Duration::from_secs(5),
        ..Timeouts::default()
    };

    let err = Client::connect(stream, timeouts).await.unwrap_err();
    assert!(matches!(err, Error::Transport(ref e) if e.is_timeout()));
}
