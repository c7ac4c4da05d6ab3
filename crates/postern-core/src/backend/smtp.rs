//! Sending through the outgoing server.
//!
//! Shared by both backends. A new SMTP connection is opened per message.

use postern_smtp::{Address, Client, Ready};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::connector::Connector;
use crate::message::OutgoingMessage;
use crate::{Error, Result};

fn outgoing(connector: Option<&Connector>) -> Result<&Connector> {
    connector.ok_or_else(|| Error::Unsupported("no outgoing server configured".into()))
}

/// Sends `message` and ends the session with QUIT.
pub(crate) async fn send(connector: Option<&Connector>, message: &OutgoingMessage) -> Result<()> {
    let connector = outgoing(connector)?;
    // Addresses are checked before connecting.
    let (from, recipients) = envelope(message)?;
    let session = connector.smtp().await?;
    deliver(session, &from, &recipients, &message.content).await?;
    info!(
        host = %connector.settings().host,
        recipients = recipients.len(),
        "Message sent"
    );
    Ok(())
}

/// Connects, authenticates and disconnects.
pub(crate) async fn check(connector: Option<&Connector>) -> Result<()> {
    let session = outgoing(connector)?.smtp().await?;
    session.quit().await?;
    Ok(())
}

fn envelope(message: &OutgoingMessage) -> Result<(Address, Vec<Address>)> {
    let from = Address::new(message.from.as_str())?;
    let recipients = message
        .all_recipients()
        .map(Address::new)
        .collect::<postern_smtp::Result<Vec<_>>>()?;
    Ok((from, recipients))
}

async fn deliver<S>(session: Client<S, Ready>, from: &Address, recipients: &[Address], content: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session = session.send_mail(from, recipients, content).await?;
    // The message was accepted; a failing QUIT does not undo that.
    if let Err(e) = session.quit().await {
        warn!(?e, "SMTP QUIT failed after sending");
    }
    debug!(bytes = content.len(), "Delivered");
    Ok(())
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
    use postern_sasl::{AuthType, Credentials};
    use postern_transport::Timeouts;
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_send_without_outgoing_server() {
        let message = OutgoingMessage::new("me@example.com", b"x".to_vec()).to("you@example.com");
        let err = send(None, &message).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_envelope_includes_bcc() {
        let message = OutgoingMessage::new("me@example.com", b"x".to_vec())
            .to("a@example.com")
            .bcc("b@example.com");
        let (from, recipients) = envelope(&message).unwrap();
        assert_eq!(from.as_str(), "me@example.com");
        assert_eq!(
            recipients.iter().map(Address::as_str).collect::<Vec<_>>(),
            ["a@example.com", "b@example.com"]
        );
    }

    #[tokio::test]
    async fn test_deliver_tolerates_failed_quit() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n")
            .write(b"EHLO [127.0.0.1]\r\n")
            .read(b"250 smtp.example.com\r\n")
            .write(b"MAIL FROM:<me@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<you@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"Subject: hi\r\n\r\nbody\r\n.\r\n")
            .read(b"250 queued\r\n")
            .write(b"QUIT\r\n")
            .read(b"500 what\r\n")
            .build();

        let session = Client::connect(mock, Timeouts::default(), "[127.0.0.1]")
            .await
            .unwrap()
            .authenticate(&Credentials::password(AuthType::None, "", ""))
            .await
            .unwrap();
        let from = Address::new("me@example.com").unwrap();
        let to = [Address::new("you@example.com").unwrap()];
        deliver(session, &from, &to, b"Subject: hi\r\n\r\nbody").await.unwrap();
    }
}
