//! POP3 command builders.

use postern_sasl::Mechanism;

/// A POP3 command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CAPA` (RFC 2449)
    Capa,
    /// `STLS` (RFC 2595)
    Stls,
    /// `USER <name>`
    User(String),
    /// `PASS <password>`
    Pass(String),
    /// `APOP <name> <digest>`
    Apop {
        /// Mailbox name.
        username: String,
        /// Hex MD5 of timestamp and secret.
        digest: String,
    },
    /// `AUTH <mechanism> [initial-response]` (RFC 5034)
    Auth {
        /// Mechanism.
        mechanism: Mechanism,
        /// Base64 initial response.
        initial_response: Option<String>,
    },
    /// `STAT`
    Stat,
    /// `LIST [msg]`
    List(Option<u32>),
    /// `UIDL [msg]`
    Uidl(Option<u32>),
    /// `RETR <msg>`
    Retr(u32),
    /// `TOP <msg> <lines>`
    Top {
        /// Message number.
        message: u32,
        /// Body lines after the header.
        lines: u32,
    },
    /// `DELE <msg>`
    Dele(u32),
    /// `NOOP`
    Noop,
    /// `RSET`
    Rset,
    /// `QUIT`
    Quit,
}

impl Command {
    /// Verb, for logs. Never contains arguments.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capa => "CAPA",
            Self::Stls => "STLS",
            Self::User(_) => "USER",
            Self::Pass(_) => "PASS",
            Self::Apop { .. } => "APOP",
            Self::Auth { .. } => "AUTH",
            Self::Stat => "STAT",
            Self::List(_) => "LIST",
            Self::Uidl(_) => "UIDL",
            Self::Retr(_) => "RETR",
            Self::Top { .. } => "TOP",
            Self::Dele(_) => "DELE",
            Self::Noop => "NOOP",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        }
    }

    /// Returns true if the reply is multi-line when positive.
    #[must_use]
    pub const fn is_multiline(&self) -> bool {
        matches!(
            self,
            Self::Capa | Self::List(None) | Self::Uidl(None) | Self::Retr(_) | Self::Top { .. }
        )
    }

    /// Serializes the command, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::User(name) => format!("USER {name}"),
            Self::Pass(password) => format!("PASS {password}"),
            Self::Apop { username, digest } => format!("APOP {username} {digest}"),
            Self::Auth {
                mechanism,
                initial_response: Some(ir),
            } => format!("AUTH {} {}", mechanism.name(), if ir.is_empty() { "=" } else { ir }),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => format!("AUTH {}", mechanism.name()),
            Self::List(Some(n)) => format!("LIST {n}"),
            Self::Uidl(Some(n)) => format!("UIDL {n}"),
            Self::Retr(n) => format!("RETR {n}"),
            Self::Top { message, lines } => format!("TOP {message} {lines}"),
            Self::Dele(n) => format!("DELE {n}"),
            Self::Capa
            | Self::Stls
            | Self::Stat
            | Self::List(None)
            | Self::Uidl(None)
            | Self::Noop
            | Self::Rset
            | Self::Quit => self.name().to_string(),
        };
        let mut out = line.into_bytes();
        out.extend_from_slice(b"\r\n");
        out
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

    fn wire(command: &Command) -> String {
        String::from_utf8(command.serialize()).unwrap()
    }

    #[test]
    fn test_serialize_with_arguments() {
        assert_eq!(wire(&Command::User("mrose".into())), "USER mrose\r\n");
        assert_eq!(wire(&Command::Top { message: 3, lines: 0 }), "TOP 3 0\r\n");
        assert_eq!(wire(&Command::List(Some(2))), "LIST 2\r\n");
        assert_eq!(wire(&Command::Uidl(None)), "UIDL\r\n");
        assert_eq!(
            wire(&Command::Apop {
                username: "mrose".into(),
                digest: "c4c9334bac560ecc979e58001b3e22fb".into(),
            }),
            "APOP mrose c4c9334bac560ecc979e58001b3e22fb\r\n"
        );
    }

    #[test]
    fn test_serialize_auth() {
        let bare = Command::Auth {
            mechanism: Mechanism::Plain,
            initial_response: None,
        };
        assert_eq!(wire(&bare), "AUTH PLAIN\r\n");

        let external = Command::Auth {
            mechanism: Mechanism::External,
            initial_response: Some(String::new()),
        };
        assert_eq!(wire(&external), "AUTH EXTERNAL =\r\n");
    }

    #[test]
    fn test_multiline_commands() {
        assert!(Command::Capa.is_multiline());
        assert!(Command::Uidl(None).is_multiline());
        assert!(!Command::Uidl(Some(1)).is_multiline());
        assert!(Command::Retr(1).is_multiline());
        assert!(!Command::Stat.is_multiline());
    }

    #[test]
    fn test_name_hides_arguments() {
        assert_eq!(Command::Pass("hunter2".into()).name(), "PASS");
    }
}
