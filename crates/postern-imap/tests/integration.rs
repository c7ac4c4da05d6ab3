//! Integration tests for the IMAP client.
//!
//! Each test scripts both sides of a conversation with
//! `tokio_test::io::Builder`: `read` is what the server sends, `write` is
//! what the client must send, in order.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use postern_imap::{
    Capability, Client, Error, FetchAttribute, Flag, Flags, IdleEvent, SearchKey, SequenceSet,
};
use postern_sasl::{AuthType, Credentials, TokenProvider, sasl};
use postern_transport::Timeouts;
use tokio::io::AsyncWriteExt;
use tokio_test::io::{Builder, Mock};

const PREAUTH: &[u8] = b"* PREAUTH [CAPABILITY IMAP4rev1 UIDPLUS IDLE] ready\r\n";

async fn connect(mock: Mock) -> Client<Mock, postern_imap::NotAuthenticated> {
    Client::connect(mock, Timeouts::default()).await.unwrap()
}

fn password(user: &'static str, pass: &'static str) -> Credentials<'static> {
    Credentials::password(AuthType::Plain, user, pass)
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

#[tokio::test]
async fn test_greeting_without_capabilities_asks_for_them() {
    let mock = Builder::new()
        .read(b"* OK server ready\r\n")
        .write(b"A0001 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED\r\nA0001 OK done\r\n")
        .build();

    let client = connect(mock).await;
    assert!(client.has_capability(&Capability::StartTls));
    assert!(client.has_capability(&Capability::LoginDisabled));
    assert!(!client.state().is_preauthenticated());
}

#[tokio::test]
async fn test_bye_greeting_is_rejected() {
    let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
    let err = Client::connect(mock, Timeouts::default()).await.unwrap_err();
    assert!(matches!(err, Error::Bye(text) if text == "too many connections"));
}

#[tokio::test]
async fn test_plain_without_auth_plain_uses_login() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1] hi\r\n")
        .write(b"A0001 LOGIN user pass\r\n")
        .read(b"A0001 OK [CAPABILITY IMAP4rev1 IDLE] logged in\r\n")
        .build();

    let client = connect(mock).await.authenticate(&password("user", "pass")).await.unwrap();
    assert!(client.has_capability(&Capability::Idle));
}

#[tokio::test]
async fn test_plain_uses_sasl_ir_and_refreshes_capabilities() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=PLAIN] hi\r\n")
        .write(b"A0001 AUTHENTICATE PLAIN AHVzZXIAcGFzcw==\r\n")
        .read(b"A0001 OK authenticated\r\n")
        .write(b"A0002 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1 MOVE\r\nA0002 OK done\r\n")
        .build();

    let client = connect(mock).await.authenticate(&password("user", "pass")).await.unwrap();
    assert!(client.has_capability(&Capability::Move));
}

#[tokio::test]
async fn test_rejected_authenticate_plain_falls_back_to_login() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] hi\r\n")
        .write(b"A0001 AUTHENTICATE PLAIN\r\n")
        .read(b"+ \r\n")
        .write(b"AHVzZXIAcGFzcw==\r\n")
        .read(b"A0001 NO [AUTHENTICATIONFAILED] invalid\r\n")
        .write(b"A0002 LOGIN user pass\r\n")
        .read(b"A0002 OK [CAPABILITY IMAP4rev1] ok\r\n")
        .build();

    connect(mock).await.authenticate(&password("user", "pass")).await.unwrap();
}

#[tokio::test]
async fn test_login_disabled_keeps_original_failure() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=PLAIN LOGINDISABLED] hi\r\n")
        .write(b"A0001 AUTHENTICATE PLAIN AHVzZXIAcGFzcw==\r\n")
        .read(b"A0001 NO wrong password\r\n")
        .build();

    let err = connect(mock).await.authenticate(&password("user", "pass")).await.unwrap_err();
    assert!(matches!(err, Error::Auth(text) if text == "wrong password"));
}

#[tokio::test]
async fn test_cram_md5_answers_challenge() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=CRAM-MD5] hi\r\n")
        .write(b"A0001 AUTHENTICATE CRAM-MD5\r\n")
        .read(b"+ PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n")
        .write(b"dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw\r\n")
        .read(b"A0001 OK [CAPABILITY IMAP4rev1] welcome\r\n")
        .build();

    let credentials = Credentials::password(AuthType::CramMd5, "tim", "tanstaaftanstaaf");
    connect(mock).await.authenticate(&credentials).await.unwrap();
}

#[tokio::test]
async fn test_cram_md5_requires_capability() {
    let mock = Builder::new().read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] hi\r\n").build();
    let credentials = Credentials::password(AuthType::CramMd5, "tim", "pw");
    let err = connect(mock).await.authenticate(&credentials).await.unwrap_err();
    assert!(matches!(err, Error::MissingCapability(_)));
}

#[tokio::test]
async fn test_oauth_retries_once_with_fresh_token() {
    let challenge = STANDARD.encode(r#"{"status":"401","schemes":"bearer"}"#);
    let first = format!("A0001 AUTHENTICATE OAUTHBEARER {}\r\n", sasl::oauthbearer("me@example.com", "tok1"));
    let second = format!("A0002 AUTHENTICATE OAUTHBEARER {}\r\n", sasl::oauthbearer("me@example.com", "tok2"));

    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=OAUTHBEARER AUTH=XOAUTH2] hi\r\n")
        .write(first.as_bytes())
        .read(format!("+ {challenge}\r\n").as_bytes())
        .write(b"\r\n")
        .read(b"A0001 NO [AUTHENTICATIONFAILED] expired\r\n")
        .write(second.as_bytes())
        .read(b"A0002 OK [CAPABILITY IMAP4rev1] ok\r\n")
        .build();

    let tokens = Tokens::default();
    let credentials = Credentials::oauth("me@example.com", &tokens);
    connect(mock).await.authenticate(&credentials).await.unwrap();

    assert_eq!(tokens.issued.load(Ordering::SeqCst), 2);
    assert_eq!(tokens.invalidated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_oauth_bad_request_is_permanent() {
    let challenge = STANDARD.encode(r#"{"status":"400","schemes":"bearer"}"#);
    let first = format!("A0001 AUTHENTICATE XOAUTH2 {}\r\n", sasl::xoauth2("me@example.com", "tok1"));

    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=XOAUTH2] hi\r\n")
        .write(first.as_bytes())
        .read(format!("+ {challenge}\r\n").as_bytes())
        .write(b"\r\n")
        .read(b"A0001 NO malformed\r\n")
        .build();

    let tokens = Tokens::default();
    let credentials = Credentials::oauth("me@example.com", &tokens);
    let err = connect(mock).await.authenticate(&credentials).await.unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    assert_eq!(err.kind(), postern_transport::ErrorKind::Auth);
    assert_eq!(tokens.issued.load(Ordering::SeqCst), 1);
    assert_eq!(tokens.invalidated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_oauth_requires_sasl_ir() {
    let mock = Builder::new().read(b"* OK [CAPABILITY IMAP4rev1 AUTH=XOAUTH2] hi\r\n").build();
    let tokens = Tokens::default();
    let err = connect(mock)
        .await
        .authenticate(&Credentials::oauth("me", &tokens))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingCapability(cap) if cap == "SASL-IR"));
}

#[tokio::test]
async fn test_examine_and_uid_fetch_with_literal() {
    let mock = Builder::new()
        .read(PREAUTH)
        .write(b"A0001 EXAMINE INBOX\r\n")
        .read(b"* 2 EXISTS\r\n* OK [UIDVALIDITY 7] valid\r\nA0001 OK [READ-ONLY] done\r\n")
        .write(b"A0002 UID SEARCH 1:2\r\n")
        .read(b"* SEARCH 10 11\r\nA0002 OK done\r\n")
        .write(b"A0003 UID FETCH 10:11 (UID FLAGS BODY.PEEK[HEADER])\r\n")
        .read(b"* 1 FETCH (UID 10 FLAGS (\\Seen) BODY[HEADER] {14}\r\nSubject: a\r\n\r\n)\r\n")
        .read(b"* 2 FETCH (UID 11 FLAGS ())\r\nA0003 OK done\r\n")
        .build();

    let client = connect(mock).await.authenticate(&password("u", "p")).await.unwrap();
    let mut inbox = client.examine("INBOX").await.unwrap();
    assert_eq!(inbox.state().exists(), 2);
    assert_eq!(inbox.state().uid_validity().unwrap().get(), 7);
    assert!(inbox.state().is_read_only());

    let window = SequenceSet::range(1, 2).unwrap();
    let uids = inbox.uid_search(vec![SearchKey::Sequence(window)]).await.unwrap();
    assert_eq!(uids.iter().map(|u| u.get()).collect::<Vec<_>>(), vec![10, 11]);

    let set = SequenceSet::from_uids(&uids).unwrap();
    let messages = inbox
        .uid_fetch(
            &set,
            vec![
                FetchAttribute::Uid,
                FetchAttribute::Flags,
                FetchAttribute::BodyPeek("HEADER".into()),
            ],
        )
        .await
        .unwrap();

    assert_eq!(messages.len(), 2);
    assert!(messages[0].flags().unwrap().contains(&Flag::Seen));
    assert_eq!(messages[0].body(), Some(&b"Subject: a\r\n\r\n"[..]));
    assert!(messages[1].flags().unwrap().is_empty());
}

#[tokio::test]
async fn test_move_falls_back_to_copy_store_uid_expunge() {
    let mock = Builder::new()
        .read(PREAUTH)
        .write(b"A0001 SELECT INBOX\r\n")
        .read(b"* 3 EXISTS\r\nA0001 OK [READ-WRITE] done\r\n")
        .write(b"A0002 UID COPY 5:6 Archive\r\n")
        .read(b"A0002 OK [COPYUID 9 5:6 100:101] copied\r\n")
        .write(b"A0003 UID STORE 5:6 +FLAGS.SILENT (\\Deleted)\r\n")
        .read(b"A0003 OK stored\r\n")
        .write(b"A0004 UID EXPUNGE 5:6\r\n")
        .read(b"* 2 EXPUNGE\r\n* 2 EXPUNGE\r\nA0004 OK expunged\r\n")
        .build();

    let client = connect(mock).await.authenticate(&password("u", "p")).await.unwrap();
    let mut inbox = client.select("INBOX").await.unwrap();
    let set = SequenceSet::from_numbers([5, 6]).unwrap();

    let copied = inbox.uid_move(&set, "Archive").await.unwrap().unwrap();
    assert_eq!(copied.mapping().get(&5), Some(&100));
    assert_eq!(copied.mapping().get(&6), Some(&101));
    assert_eq!(inbox.state().exists(), 1);
}

#[tokio::test]
async fn test_append_returns_appenduid() {
    let mock = Builder::new()
        .read(PREAUTH)
        .write(b"A0001 APPEND Drafts (\\Draft) {5}\r\n")
        .read(b"+ Ready for literal\r\n")
        .write(b"hello\r\n")
        .read(b"A0001 OK [APPENDUID 38505 3955] APPEND completed\r\n")
        .build();

    let mut client = connect(mock).await.authenticate(&password("u", "p")).await.unwrap();
    let flags: Flags = [Flag::Draft].into_iter().collect();
    let uid = client.append("Drafts", &flags, b"hello").await.unwrap();
    assert_eq!(uid.unwrap().get(), 3955);
}

#[tokio::test]
async fn test_append_trycreate_is_reported() {
    let mock = Builder::new()
        .read(PREAUTH)
        .write(b"A0001 APPEND Missing {5}\r\n")
        .read(b"A0001 NO [TRYCREATE] no such mailbox\r\n")
        .build();

    let mut client = connect(mock).await.authenticate(&password("u", "p")).await.unwrap();
    let err = client.append("Missing", &Flags::new(), b"hello").await.unwrap_err();
    assert!(matches!(
        err,
        Error::No {
            code: Some(postern_imap::ResponseCode::TryCreate),
            ..
        }
    ));
}

#[tokio::test]
async fn test_idle_reports_exists_and_ends_with_done() {
    let mock = Builder::new()
        .read(PREAUTH)
        .write(b"A0001 SELECT INBOX\r\n")
        .read(b"* 1 EXISTS\r\nA0001 OK done\r\n")
        .write(b"A0002 IDLE\r\n")
        .read(b"+ idling\r\n")
        .read(b"* OK Still here\r\n* 2 EXISTS\r\n")
        .write(b"DONE\r\n")
        .read(b"A0002 OK IDLE terminated\r\n")
        .build();

    let client = connect(mock).await.authenticate(&password("u", "p")).await.unwrap();
    let mut inbox = client.select("INBOX").await.unwrap();

    let mut idle = inbox.idle().await.unwrap();
    let event = idle.wait(Duration::from_secs(60)).await.unwrap();
    assert_eq!(event, IdleEvent::Exists(2));
    idle.done().await.unwrap();
}

#[tokio::test]
async fn test_malformed_response_poisons_client() {
    let mock = Builder::new()
        .read(PREAUTH)
        .write(b"A0001 NOOP\r\n")
        .read(b"A0001 MAYBE later\r\n")
        .build();

    let mut client = connect(mock).await.authenticate(&password("u", "p")).await.unwrap();
    assert!(matches!(client.noop().await, Err(Error::Parse { .. })));
    assert!(client.is_poisoned());
    assert!(matches!(client.noop().await, Err(Error::ConnectionPoisoned)));
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_times_out_and_poisons() {
    let (stream, mut server) = tokio::io::duplex(1024);
    server.write_all(PREAUTH).await.unwrap();

    let timeouts = Timeouts {
        read: Duration::from_secs(5),
        ..Timeouts::default()
    };
    let client = Client::connect(stream, timeouts).await.unwrap();
    let mut client = client.authenticate(&password("u", "p")).await.unwrap();

    let err = client.noop().await.unwrap_err();
    assert_eq!(err.kind(), postern_transport::ErrorKind::Transport);
    assert!(client.is_poisoned());
}
