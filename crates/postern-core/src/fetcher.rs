//! Listing a server's folders before an account exists.
//!
//! Account setup asks a [`FolderFetcher`] for the folders of a server so the
//! user can pick special folders. Failures come back as
//! [`FolderFetcherError`] with the server's own text kept separately.

use std::sync::Arc;

use async_trait::async_trait;
use postern_imap::{Authenticated, Client};
use postern_sasl::TokenProvider;
use postern_transport::{Timeouts, TlsContext};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::backend::Connector;
use crate::folder::{FolderType, RemoteFolder};
use crate::settings::ServerSettings;
use crate::{FolderFetcherError, Result};

/// Lists the folders of a server.
#[async_trait]
pub trait FolderFetcher: Send + Sync {
    /// Connects with `settings` and returns the server's folders.
    async fn get_folders(
        &self,
        settings: &ServerSettings,
        tokens: Option<Arc<dyn TokenProvider>>,
    ) -> std::result::Result<Vec<RemoteFolder>, FolderFetcherError>;
}

/// Lists folders with IMAP `LIST` and special-use attributes.
#[derive(Debug, Clone)]
pub struct ImapFolderFetcher {
    tls: TlsContext,
    timeouts: Timeouts,
}

impl ImapFolderFetcher {
    /// Creates a fetcher.
    #[must_use]
    pub const fn new(tls: TlsContext, timeouts: Timeouts) -> Self {
        Self { tls, timeouts }
    }
}

#[async_trait]
impl FolderFetcher for ImapFolderFetcher {
    async fn get_folders(
        &self,
        settings: &ServerSettings,
        tokens: Option<Arc<dyn TokenProvider>>,
    ) -> std::result::Result<Vec<RemoteFolder>, FolderFetcherError> {
        let connector = Connector::new(settings.clone(), self.tls.clone(), self.timeouts, tokens);
        let mut session = connector.imap().await?;
        let folders = list_imap_folders(&mut session, settings.path_prefix()).await;
        if let Err(e) = session.logout().await {
            debug!(?e, "Logout after LIST failed");
        }
        Ok(folders?)
    }
}

/// POP3 has exactly one folder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pop3FolderFetcher;

#[async_trait]
impl FolderFetcher for Pop3FolderFetcher {
    async fn get_folders(
        &self,
        _settings: &ServerSettings,
        _tokens: Option<Arc<dyn TokenProvider>>,
    ) -> std::result::Result<Vec<RemoteFolder>, FolderFetcherError> {
        Ok(vec![RemoteFolder::pop3_inbox()])
    }
}

/// Lists selectable folders under `prefix`.
///
/// `INBOX` is added when the listing does not contain it, which happens
/// when a path prefix excludes it.
pub(crate) async fn list_imap_folders<S>(
    session: &mut Client<S, Authenticated>,
    prefix: &str,
) -> Result<Vec<RemoteFolder>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let entries = session.list("", &format!("{prefix}*")).await?;
    let mut folders: Vec<RemoteFolder> = entries
        .iter()
        .filter_map(|entry| RemoteFolder::from_list_entry(entry, prefix))
        .collect();

    if !folders.iter().any(|f| f.folder_type == FolderType::Inbox) {
        folders.insert(
            0,
            RemoteFolder {
                server_id: "INBOX".to_string(),
                display_name: "INBOX".to_string(),
                folder_type: FolderType::Inbox,
            },
        );
    }
    debug!(count = folders.len(), prefix, "Listed folders");
    Ok(folders)
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
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_list_maps_special_use_and_skips_noselect() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] hi\r\n")
            .write(b"A0001 LOGIN user pass\r\n")
            .read(b"A0001 OK [CAPABILITY IMAP4rev1 SPECIAL-USE] logged in\r\n")
            .write(b"A0002 LIST \"\" *\r\n")
            .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
            .read(b"* LIST (\\HasNoChildren \\Sent) \"/\" Sent\r\n")
            .read(b"* LIST (\\HasNoChildren \\Junk) \"/\" Spam\r\n")
            .read(b"* LIST (\\Noselect \\HasChildren) \"/\" Archive\r\n")
            .read(b"A0002 OK done\r\n")
            .build();

        let mut session = Client::connect(mock, Timeouts::default())
            .await
            .unwrap()
            .authenticate(&Credentials::password(AuthType::Plain, "user", "pass"))
            .await
            .unwrap();
        let folders = list_imap_folders(&mut session, "").await.unwrap();

        let types: Vec<_> = folders.iter().map(|f| (f.server_id.as_str(), f.folder_type)).collect();
        assert_eq!(
            types,
            [
                ("INBOX", FolderType::Inbox),
                ("Sent", FolderType::Sent),
                ("Spam", FolderType::Spam),
            ]
        );
    }

    #[tokio::test]
    async fn test_pop3_has_single_inbox() {
        let settings = ServerSettings::new(
            crate::settings::Protocol::Pop3,
            "pop.example.com",
            995,
            postern_transport::ConnectionSecurity::Tls,
            AuthType::Plain,
            "user",
            Some("pw".to_string()),
        )
        .unwrap();
        let folders = Pop3FolderFetcher.get_folders(&settings, None).await.unwrap();
        assert_eq!(folders, vec![RemoteFolder::pop3_inbox()]);
    }
}
