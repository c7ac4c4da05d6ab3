//! The server side of a folder sync.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::message::FlagSet;

/// State of a folder right after it was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderStatus {
    /// Messages in the folder.
    pub message_count: u32,
    /// UIDVALIDITY, for protocols that have one.
    pub uid_validity: Option<u32>,
}

/// One message as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    /// Message sequence number, 1-based.
    pub number: u32,
    /// UID (IMAP) or UIDL (POP3) as a string.
    pub server_id: String,
    /// Numeric IMAP UID.
    pub uid: Option<u32>,
    /// Current flags. Always empty for POP3.
    pub flags: FlagSet,
    /// Internal date.
    pub date: Option<DateTime<Utc>>,
    /// Size in bytes.
    pub size: u32,
}

/// Protocol operations the sync engine needs from one connection.
///
/// Each method is one protocol exchange; the engine checks for cancellation
/// between calls.
#[async_trait]
pub trait RemoteMailbox: Send {
    /// Whether the server stores flags.
    fn supports_flags(&self) -> bool;

    /// Whether deleted messages can be expunged.
    fn supports_expunge(&self) -> bool;

    /// Permanently removes messages marked deleted in `folder`.
    async fn expunge(&mut self, folder: &str) -> Result<()>;

    /// Opens `folder` read-only.
    async fn open(&mut self, folder: &str) -> Result<FolderStatus>;

    /// Lists messages `start..=end` of the open folder by sequence number.
    async fn headers(&mut self, start: u32, end: u32) -> Result<Vec<RemoteMessage>>;

    /// Downloads a message, or only its header block.
    async fn download(&mut self, message: &RemoteMessage, headers_only: bool) -> Result<Vec<u8>>;

    /// Whether the open folder holds undeleted messages before sequence
    /// number `start`, dated `earliest` or later.
    ///
    /// Without server-side dates every message counts.
    async fn has_messages_before(&mut self, start: u32, earliest: Option<DateTime<Utc>>) -> Result<bool> {
        let _ = earliest;
        Ok(start > 1)
    }
}
