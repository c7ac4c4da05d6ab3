//! Commands and their wire form.

mod tag_generator;

use chrono::NaiveDate;
use postern_sasl::Mechanism;

pub use tag_generator::TagGenerator;

use crate::types::{Flags, SequenceSet, StatusAttribute};

/// Terminates IDLE. Sent without a tag.
pub const DONE: &[u8] = b"DONE\r\n";

/// Item requested with `UID FETCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// `UID`
    Uid,
    /// `FLAGS`
    Flags,
    /// `INTERNALDATE`
    InternalDate,
    /// `RFC822.SIZE`
    Size,
    /// `BODY.PEEK[<section>]`; does not set `\Seen`.
    BodyPeek(String),
}

impl FetchAttribute {
    fn write(&self, out: &mut String) {
        match self {
            Self::Uid => out.push_str("UID"),
            Self::Flags => out.push_str("FLAGS"),
            Self::InternalDate => out.push_str("INTERNALDATE"),
            Self::Size => out.push_str("RFC822.SIZE"),
            Self::BodyPeek(section) => {
                out.push_str("BODY.PEEK[");
                out.push_str(section);
                out.push(']');
            }
        }
    }
}

/// Search key for `UID SEARCH`. Keys are ANDed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    /// `ALL`
    All,
    /// Sequence numbers.
    Sequence(SequenceSet),
    /// `UID <set>`
    Uid(SequenceSet),
    /// `NOT DELETED`
    NotDeleted,
    /// `SINCE <date>`
    Since(NaiveDate),
}

impl SearchKey {
    fn write(&self, out: &mut String) {
        match self {
            Self::All => out.push_str("ALL"),
            Self::Sequence(set) => out.push_str(&set.to_string()),
            Self::Uid(set) => {
                out.push_str("UID ");
                out.push_str(&set.to_string());
            }
            Self::NotDeleted => out.push_str("NOT DELETED"),
            Self::Since(date) => {
                out.push_str("SINCE ");
                out.push_str(&date.format("%-d-%b-%Y").to_string());
            }
        }
    }
}

/// How `UID STORE` changes flags. Always sent `.SILENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    /// `+FLAGS.SILENT`
    Add,
    /// `-FLAGS.SILENT`
    Remove,
    /// `FLAGS.SILENT`
    Replace,
}

impl StoreAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+FLAGS.SILENT",
            Self::Remove => "-FLAGS.SILENT",
            Self::Replace => "FLAGS.SILENT",
        }
    }
}

/// A tagged client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CAPABILITY`
    Capability,
    /// `NOOP`
    Noop,
    /// `LOGOUT`
    Logout,
    /// `STARTTLS`
    StartTls,
    /// `LOGIN`
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// `AUTHENTICATE`, with the initial response inline when SASL-IR allows.
    Authenticate {
        /// Mechanism.
        mechanism: Mechanism,
        /// Base64 initial response. An empty response is sent as `=`.
        initial_response: Option<String>,
    },
    /// `LIST`
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// `SELECT`
    Select(String),
    /// `EXAMINE`
    Examine(String),
    /// `STATUS`
    Status {
        /// Mailbox.
        mailbox: String,
        /// Requested items.
        attributes: Vec<StatusAttribute>,
    },
    /// `CREATE`
    Create(String),
    /// `UID SEARCH`
    UidSearch(Vec<SearchKey>),
    /// `UID FETCH`
    UidFetch {
        /// UIDs.
        set: SequenceSet,
        /// Items.
        attributes: Vec<FetchAttribute>,
    },
    /// `UID STORE`
    UidStore {
        /// UIDs.
        set: SequenceSet,
        /// Add, remove or replace.
        action: StoreAction,
        /// Flags.
        flags: Flags,
    },
    /// `UID COPY`
    UidCopy {
        /// UIDs.
        set: SequenceSet,
        /// Destination.
        mailbox: String,
    },
    /// `UID MOVE`
    UidMove {
        /// UIDs.
        set: SequenceSet,
        /// Destination.
        mailbox: String,
    },
    /// `UID EXPUNGE` (UIDPLUS)
    UidExpunge(SequenceSet),
    /// `EXPUNGE`
    Expunge,
    /// `CLOSE`
    Close,
    /// `APPEND` header; the message follows after the continuation.
    Append {
        /// Target mailbox.
        mailbox: String,
        /// Initial flags.
        flags: Flags,
        /// Literal size.
        size: usize,
    },
    /// `IDLE`
    Idle,
}

impl Command {
    /// Verb, for logs. Never contains arguments.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::List { .. } => "LIST",
            Self::Select(_) => "SELECT",
            Self::Examine(_) => "EXAMINE",
            Self::Status { .. } => "STATUS",
            Self::Create(_) => "CREATE",
            Self::UidSearch(_) => "UID SEARCH",
            Self::UidFetch { .. } => "UID FETCH",
            Self::UidStore { .. } => "UID STORE",
            Self::UidCopy { .. } => "UID COPY",
            Self::UidMove { .. } => "UID MOVE",
            Self::UidExpunge(_) => "UID EXPUNGE",
            Self::Expunge => "EXPUNGE",
            Self::Close => "CLOSE",
            Self::Append { .. } => "APPEND",
            Self::Idle => "IDLE",
        }
    }

    /// Serializes with `tag`, CRLF included.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut out = format!("{tag} ");
        match self {
            Self::Login { username, password } => {
                out.push_str("LOGIN ");
                push_astring(&mut out, username);
                out.push(' ');
                push_astring(&mut out, password);
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                out.push_str("AUTHENTICATE ");
                out.push_str(mechanism.name());
                if let Some(ir) = initial_response {
                    out.push(' ');
                    out.push_str(if ir.is_empty() { "=" } else { ir });
                }
            }
            Self::List { reference, pattern } => {
                out.push_str("LIST ");
                push_astring(&mut out, reference);
                out.push(' ');
                push_astring(&mut out, pattern);
            }
            Self::Select(mailbox) | Self::Examine(mailbox) | Self::Create(mailbox) => {
                out.push_str(self.name());
                out.push(' ');
                push_astring(&mut out, mailbox);
            }
            Self::Status {
                mailbox,
                attributes,
            } => {
                out.push_str("STATUS ");
                push_astring(&mut out, mailbox);
                let names: Vec<&str> = attributes.iter().map(|a| a.as_str()).collect();
                out.push_str(&format!(" ({})", names.join(" ")));
            }
            Self::UidSearch(keys) => {
                out.push_str("UID SEARCH");
                for key in keys {
                    out.push(' ');
                    key.write(&mut out);
                }
            }
            Self::UidFetch { set, attributes } => {
                out.push_str(&format!("UID FETCH {set} ("));
                for (i, attribute) in attributes.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    attribute.write(&mut out);
                }
                out.push(')');
            }
            Self::UidStore { set, action, flags } => {
                out.push_str(&format!("UID STORE {set} {} {}", action.as_str(), flags.to_list()));
            }
            Self::UidCopy { set, mailbox } | Self::UidMove { set, mailbox } => {
                out.push_str(&format!("{} {set} ", self.name()));
                push_astring(&mut out, mailbox);
            }
            Self::UidExpunge(set) => out.push_str(&format!("UID EXPUNGE {set}")),
            Self::Append {
                mailbox,
                flags,
                size,
            } => {
                out.push_str("APPEND ");
                push_astring(&mut out, mailbox);
                if !flags.is_empty() {
                    out.push(' ');
                    out.push_str(&flags.to_list());
                }
                out.push_str(&format!(" {{{size}}}"));
            }
            Self::Capability
            | Self::Noop
            | Self::Logout
            | Self::StartTls
            | Self::Expunge
            | Self::Close
            | Self::Idle => out.push_str(self.name()),
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}

/// Writes `s` as an atom when safe, otherwise as a quoted string.
fn push_astring(out: &mut String, s: &str) {
    let atom_safe = !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic() && !matches!(b, b'(' | b')' | b'{' | b'"' | b'\\' | b']')
        });
    if atom_safe {
        out.push_str(s);
        return;
    }
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
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
    use crate::types::Flag;

    fn wire(command: &Command) -> String {
        String::from_utf8(command.serialize("A0001")).unwrap()
    }

    #[test]
    fn test_login_quotes_when_needed() {
        let cmd = Command::Login {
            username: "alice@example.com".into(),
            password: "p a\"ss".into(),
        };
        assert_eq!(wire(&cmd), "A0001 LOGIN alice@example.com \"p a\\\"ss\"\r\n");
    }

    #[test]
    fn test_authenticate_forms() {
        let with_ir = Command::Authenticate {
            mechanism: Mechanism::Plain,
            initial_response: Some("AGEAYg==".into()),
        };
        assert_eq!(wire(&with_ir), "A0001 AUTHENTICATE PLAIN AGEAYg==\r\n");

        let bare = Command::Authenticate {
            mechanism: Mechanism::CramMd5,
            initial_response: None,
        };
        assert_eq!(wire(&bare), "A0001 AUTHENTICATE CRAM-MD5\r\n");
    }

    #[test]
    fn test_list_and_select() {
        let list = Command::List {
            reference: String::new(),
            pattern: "*".into(),
        };
        assert_eq!(wire(&list), "A0001 LIST \"\" *\r\n");
        assert_eq!(
            wire(&Command::Examine("Sent Items".into())),
            "A0001 EXAMINE \"Sent Items\"\r\n"
        );
    }

    #[test]
    fn test_uid_commands() {
        let set = SequenceSet::from_numbers([3, 4, 5, 9]).unwrap();
        let fetch = Command::UidFetch {
            set: set.clone(),
            attributes: vec![
                FetchAttribute::Uid,
                FetchAttribute::Flags,
                FetchAttribute::BodyPeek("HEADER".into()),
            ],
        };
        assert_eq!(wire(&fetch), "A0001 UID FETCH 3:5,9 (UID FLAGS BODY.PEEK[HEADER])\r\n");

        let store = Command::UidStore {
            set: set.clone(),
            action: StoreAction::Add,
            flags: [Flag::Deleted].into_iter().collect(),
        };
        assert_eq!(wire(&store), "A0001 UID STORE 3:5,9 +FLAGS.SILENT (\\Deleted)\r\n");

        let copy = Command::UidMove {
            set,
            mailbox: "Trash".into(),
        };
        assert_eq!(wire(&copy), "A0001 UID MOVE 3:5,9 Trash\r\n");
    }

    #[test]
    fn test_search_keys() {
        let search = Command::UidSearch(vec![
            SearchKey::Sequence(SequenceSet::range(76, 100).unwrap()),
            SearchKey::NotDeleted,
            SearchKey::Since(NaiveDate::from_ymd_opt(2024, 2, 7).unwrap()),
        ]);
        assert_eq!(wire(&search), "A0001 UID SEARCH 76:100 NOT DELETED SINCE 7-Feb-2024\r\n");
    }

    #[test]
    fn test_append_header() {
        let append = Command::Append {
            mailbox: "Drafts".into(),
            flags: [Flag::Seen, Flag::Draft].into_iter().collect(),
            size: 310,
        };
        assert_eq!(wire(&append), "A0001 APPEND Drafts (\\Seen \\Draft) {310}\r\n");
    }
}
