//! Bracketed response codes, e.g. `[UIDVALIDITY 3857529045]`.

use std::collections::BTreeMap;

use super::{Capability, Flags, SequenceSet, Uid, UidValidity};

/// A response code carried by an `OK`, `NO`, `BAD`, `BYE` or `PREAUTH` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `ALERT`: text must be shown to the user.
    Alert,
    /// `CAPABILITY`
    Capability(Vec<Capability>),
    /// `PERMANENTFLAGS`
    PermanentFlags(Flags),
    /// `READ-ONLY`
    ReadOnly,
    /// `READ-WRITE`
    ReadWrite,
    /// `TRYCREATE`: the target mailbox does not exist.
    TryCreate,
    /// `UIDNEXT`
    UidNext(Uid),
    /// `UIDVALIDITY`
    UidValidity(UidValidity),
    /// `UNSEEN`
    Unseen(u32),
    /// `APPENDUID` (UIDPLUS)
    AppendUid {
        /// Validity of the target mailbox.
        uid_validity: UidValidity,
        /// UID of the appended message.
        uid: Uid,
    },
    /// `COPYUID` (UIDPLUS)
    CopyUid(CopyUid),
    /// `AUTHENTICATIONFAILED` (RFC 5530)
    AuthenticationFailed,
    /// Anything else.
    Other(String),
}

/// Payload of a `COPYUID` response code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyUid {
    /// Validity of the destination mailbox.
    pub uid_validity: UidValidity,
    /// Source UIDs, in server order.
    pub source: SequenceSet,
    /// Destination UIDs, matching `source` position by position.
    pub destination: SequenceSet,
}

impl CopyUid {
    /// Pairs each source UID with its destination UID.
    ///
    /// Returns an empty map if the two sets differ in size.
    #[must_use]
    pub fn mapping(&self) -> BTreeMap<u32, u32> {
        if self.source.len() != self.destination.len() {
            return BTreeMap::new();
        }
        self.source.iter().zip(self.destination.iter()).collect()
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
    fn test_copyuid_mapping() {
        let code = CopyUid {
            uid_validity: UidValidity::new(38505).unwrap(),
            source: SequenceSet::parse("304,319:320").unwrap(),
            destination: SequenceSet::parse("3956:3958").unwrap(),
        };
        let map = code.mapping();
        assert_eq!(map.get(&304), Some(&3956));
        assert_eq!(map.get(&320), Some(&3958));
    }

    #[test]
    fn test_copyuid_size_mismatch() {
        let code = CopyUid {
            uid_validity: UidValidity::new(1).unwrap(),
            source: SequenceSet::parse("1:3").unwrap(),
            destination: SequenceSet::parse("10").unwrap(),
        };
        assert!(code.mapping().is_empty());
    }
}
