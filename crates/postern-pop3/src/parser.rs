//! POP3 reply parsing.
//!
//! Single-line replies start with `+OK` or `-ERR`. During `AUTH` the server
//! may instead send a `+ ` continuation carrying a base64 challenge.

#![allow(clippy::missing_errors_doc)]

use crate::types::{ListEntry, Stat, UidlEntry};
use crate::{Error, Result};

/// A parsed status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK <text>`
    Ok(String),
    /// `-ERR <text>`
    Err(String),
    /// `+ <challenge>` during SASL.
    Continue(String),
}

impl Reply {
    /// Converts a negative reply into [`Error::Server`].
    pub fn ok(self) -> Result<String> {
        match self {
            Self::Ok(text) => Ok(text),
            Self::Err(text) => Err(Error::Server(text)),
            Self::Continue(_) => Err(Error::Protocol("unexpected continuation".into())),
        }
    }
}

/// Parses a status line, without its CRLF.
pub fn parse_reply(line: &str) -> Result<Reply> {
    if let Some(rest) = strip_prefix_ignore_case(line, "+OK") {
        return Ok(Reply::Ok(rest.trim_start().to_string()));
    }
    if let Some(rest) = strip_prefix_ignore_case(line, "-ERR") {
        return Ok(Reply::Err(rest.trim_start().to_string()));
    }
    if line == "+" {
        return Ok(Reply::Continue(String::new()));
    }
    if let Some(rest) = line.strip_prefix("+ ") {
        return Ok(Reply::Continue(rest.trim().to_string()));
    }
    Err(Error::Protocol(format!("unrecognized reply: {line}")))
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &line[prefix.len()..];
    // "+OKAY" is not "+OK".
    (rest.is_empty() || rest.starts_with(' ')).then_some(rest)
}

/// Extracts the APOP timestamp (`<...>`, brackets included) from a greeting.
#[must_use]
pub fn apop_timestamp(greeting: &str) -> Option<&str> {
    let start = greeting.find('<')?;
    let len = greeting[start..].find('>')?;
    Some(&greeting[start..=start + len])
}

/// Parses the text of a `+OK` reply to `STAT`.
pub fn parse_stat(text: &str) -> Result<Stat> {
    let mut words = text.split_ascii_whitespace();
    let count = number(words.next(), text)?;
    let size = number(words.next(), text)?;
    Ok(Stat { count, size })
}

/// Parses one `LIST` line, from a listing or a single-message reply.
pub fn parse_list_line(line: &str) -> Result<ListEntry> {
    let mut words = line.split_ascii_whitespace();
    let number = number(words.next(), line)?;
    let size = self::number(words.next(), line)?;
    Ok(ListEntry { number, size })
}

/// Parses one `UIDL` line, from a listing or a single-message reply.
pub fn parse_uidl_line(line: &str) -> Result<UidlEntry> {
    let mut words = line.split_ascii_whitespace();
    let number = number(words.next(), line)?;
    let uid = words
        .next()
        .ok_or_else(|| Error::Protocol(format!("missing unique id: {line}")))?;
    Ok(UidlEntry {
        number,
        uid: uid.to_string(),
    })
}

fn number<T: std::str::FromStr>(word: Option<&str>, line: &str) -> Result<T> {
    word.and_then(|w| w.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("malformed listing: {line}")))
}

/// Removes the byte-stuffing from one line of a multi-line reply.
///
/// Returns `None` for the terminating `.` line.
#[must_use]
pub fn unstuff(line: &[u8]) -> Option<&[u8]> {
    match line {
        b"." => None,
        [b'.', rest @ ..] => Some(rest),
        other => Some(other),
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
    fn test_parse_status_lines() {
        assert_eq!(parse_reply("+OK 2 320").unwrap(), Reply::Ok("2 320".into()));
        assert_eq!(parse_reply("+ok").unwrap(), Reply::Ok(String::new()));
        assert_eq!(
            parse_reply("-ERR no such message").unwrap(),
            Reply::Err("no such message".into())
        );
        assert_eq!(parse_reply("+ PDE4OT4=").unwrap(), Reply::Continue("PDE4OT4=".into()));
        assert_eq!(parse_reply("+").unwrap(), Reply::Continue(String::new()));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_reply("* OK IMAP4rev1").is_err());
        assert!(parse_reply("+OKAY").is_err());
        assert!(parse_reply("").is_err());
    }

    #[test]
    fn test_apop_timestamp() {
        let greeting = "POP3 server ready <1896.697170952@dbc.mtview.ca.us>";
        assert_eq!(apop_timestamp(greeting), Some("<1896.697170952@dbc.mtview.ca.us>"));
        assert_eq!(apop_timestamp("POP3 server ready"), None);
        assert_eq!(apop_timestamp("broken <timestamp"), None);
    }

    #[test]
    fn test_parse_listings() {
        assert_eq!(parse_stat("2 320").unwrap(), Stat { count: 2, size: 320 });
        assert_eq!(
            parse_list_line("1 120").unwrap(),
            ListEntry { number: 1, size: 120 }
        );
        let uidl = parse_uidl_line("2 QhdPYR:00WBw1Ph7x7").unwrap();
        assert_eq!(uidl.number, 2);
        assert_eq!(uidl.uid, "QhdPYR:00WBw1Ph7x7");
        assert!(parse_uidl_line("2").is_err());
        assert!(parse_stat("many").is_err());
    }

    #[test]
    fn test_unstuff() {
        assert_eq!(unstuff(b"."), None);
        assert_eq!(unstuff(b"..hidden"), Some(&b".hidden"[..]));
        assert_eq!(unstuff(b"plain"), Some(&b"plain"[..]));
        assert_eq!(unstuff(b""), Some(&b""[..]));
    }
}
