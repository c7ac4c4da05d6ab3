//! Core IMAP data types.

mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;
mod sequence;

pub use capability::{Capabilities, Capability, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Uid, UidValidity};
pub use mailbox::{ListEntry, MailboxAttribute, MailboxStatus, StatusAttribute, StatusData};
pub use response_code::{CopyUid, ResponseCode};
pub use sequence::SequenceSet;
