//! Numeric identifiers: sequence numbers, UIDs and UIDVALIDITY.
//!
//! All three are non-zero on the wire, so each wraps a [`NonZeroU32`].

use std::fmt;
use std::num::NonZeroU32;

macro_rules! nonzero_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Wraps `n`, or returns `None` for zero.
            #[must_use]
            pub const fn new(n: u32) -> Option<Self> {
                match NonZeroU32::new(n) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

nonzero_id!(
    /// Message sequence number. Shifts whenever a lower message is expunged.
    SeqNum
);

nonzero_id!(
    /// Message UID. Stable for as long as the mailbox UIDVALIDITY holds.
    Uid
);

nonzero_id!(
    /// Mailbox UIDVALIDITY. A change invalidates every cached UID.
    UidValidity
);

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
    fn test_zero_is_rejected() {
        assert!(Uid::new(0).is_none());
        assert!(SeqNum::new(0).is_none());
        assert!(UidValidity::new(0).is_none());
    }

    #[test]
    fn test_display_and_order() {
        let a = Uid::new(7).unwrap();
        let b = Uid::new(12).unwrap();
        assert!(a < b);
        assert_eq!(b.to_string(), "12");
        assert_eq!(UidValidity::new(3857529045).unwrap().get(), 3857529045);
    }
}
