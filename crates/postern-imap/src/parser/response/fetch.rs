//! `FETCH` data items.

use chrono::{DateTime, FixedOffset};

use super::helpers::{flag_list, uid};
use crate::parser::lexer::{Lexer, Token};
use crate::types::{Flags, Uid};
use crate::Result;

/// One item of a `FETCH` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// `UID`
    Uid(Uid),
    /// `FLAGS`
    Flags(Flags),
    /// `INTERNALDATE`
    InternalDate(DateTime<FixedOffset>),
    /// `RFC822.SIZE`
    Size(u32),
    /// `BODY[section]<origin>`, also used for `RFC822`, `RFC822.HEADER` and
    /// `RFC822.TEXT`.
    Body {
        /// Section spec, upper-cased; empty for the whole message.
        section: String,
        /// Partial fetch origin.
        origin: Option<u32>,
        /// Payload, or `None` for `NIL`.
        data: Option<Vec<u8>>,
    },
}

/// Parses the parenthesized item list after `FETCH `.
pub fn fetch_items(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(&Token::LParen)?;
    let mut items = Vec::new();
    loop {
        let name = match lexer.next_token()? {
            Token::RParen => return Ok(items),
            Token::Space => continue,
            Token::Atom(name) => name.to_ascii_uppercase(),
            other => return Err(lexer.error(format!("unexpected {other:?} in FETCH"))),
        };

        match name.as_str() {
            "UID" => {
                lexer.expect_space()?;
                items.push(FetchItem::Uid(uid(lexer)?));
            }
            "FLAGS" => {
                lexer.expect_space()?;
                items.push(FetchItem::Flags(flag_list(lexer)?));
            }
            "RFC822.SIZE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Size(lexer.number()?));
            }
            "INTERNALDATE" => {
                lexer.expect_space()?;
                let text = lexer.astring()?;
                let date = parse_internal_date(&text)
                    .ok_or_else(|| lexer.error(format!("bad INTERNALDATE {text:?}")))?;
                items.push(FetchItem::InternalDate(date));
            }
            "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
                lexer.expect_space()?;
                let section = name.strip_prefix("RFC822").unwrap_or_default();
                items.push(FetchItem::Body {
                    section: section.trim_start_matches('.').to_string(),
                    origin: None,
                    data: lexer.nstring()?,
                });
            }
            "BODY" | "BINARY" if lexer.peek() == Some(b'[') => {
                let section = section_spec(lexer)?;
                let origin = match lexer.peek() {
                    Some(b'<') => Some(origin(lexer)?),
                    _ => None,
                };
                lexer.expect_space()?;
                items.push(FetchItem::Body {
                    section,
                    origin,
                    data: lexer.nstring()?,
                });
            }
            _ => {
                // ENVELOPE, BODYSTRUCTURE, MODSEQ and anything newer.
                lexer.expect_space()?;
                skip_value(lexer)?;
            }
        }
    }
}

fn section_spec(lexer: &mut Lexer<'_>) -> Result<String> {
    lexer.expect(&Token::LBracket)?;
    let mut parts = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RBracket => break,
            Token::Atom(a) => parts.push(a.to_ascii_uppercase()),
            Token::Number(n) => parts.push(n.to_string()),
            Token::Quoted(q) => parts.push(q.to_ascii_uppercase()),
            Token::Space => parts.push(" ".to_string()),
            Token::LParen => parts.push("(".to_string()),
            Token::RParen => parts.push(")".to_string()),
            other => return Err(lexer.error(format!("unexpected {other:?} in section"))),
        }
    }
    Ok(parts.concat())
}

fn origin(lexer: &mut Lexer<'_>) -> Result<u32> {
    match lexer.next_token()? {
        Token::Atom(a) => a
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| lexer.error("bad partial origin")),
        other => Err(lexer.error(format!("expected origin, got {other:?}"))),
    }
}

/// Consumes one value of any shape.
fn skip_value(lexer: &mut Lexer<'_>) -> Result<()> {
    let mut depth = 0usize;
    loop {
        match lexer.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen if depth > 0 => depth -= 1,
            Token::Crlf | Token::Eof | Token::RParen => {
                return Err(lexer.error("unbalanced FETCH value"));
            }
            _ => {}
        }
        if depth == 0 && lexer.peek() != Some(b'[') {
            return Ok(());
        }
    }
}

/// Parses `17-Jul-1996 02:44:25 -0700`. The day may be space-padded.
#[must_use]
pub fn parse_internal_date(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(text.trim_start(), "%d-%b-%Y %H:%M:%S %z").ok()
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
    use chrono::{Datelike, Timelike};

    use super::*;
    use crate::types::Flag;

    #[test]
    fn test_sync_items() {
        let input = br#"(UID 4827 FLAGS (\Seen $Forwarded) INTERNALDATE " 7-Feb-2024 09:15:00 +0100" RFC822.SIZE 3028)"#;
        let items = fetch_items(&mut Lexer::new(input)).unwrap();
        assert_eq!(items[0], FetchItem::Uid(Uid::new(4827).unwrap()));
        let FetchItem::Flags(flags) = &items[1] else {
            panic!("expected flags");
        };
        assert!(flags.contains(&Flag::Seen));
        assert!(flags.contains(&Flag::Keyword("$Forwarded".into())));
        let FetchItem::InternalDate(date) = items[2] else {
            panic!("expected date");
        };
        assert_eq!((date.day(), date.hour()), (7, 9));
        assert_eq!(items[3], FetchItem::Size(3028));
    }

    #[test]
    fn test_body_section_literal() {
        let input = b"(UID 9 BODY[HEADER] {13}\r\nSubject: hi\r\n)";
        let items = fetch_items(&mut Lexer::new(input)).unwrap();
        assert_eq!(
            items[1],
            FetchItem::Body {
                section: "HEADER".into(),
                origin: None,
                data: Some(b"Subject: hi\r\n".to_vec()),
            }
        );
    }

    #[test]
    fn test_partial_and_fields_section() {
        let input = b"(BODY[HEADER.FIELDS (FROM)]<0> \"From: a\")";
        let items = fetch_items(&mut Lexer::new(input)).unwrap();
        let FetchItem::Body { section, origin, .. } = &items[0] else {
            panic!("expected body");
        };
        assert_eq!(section, "HEADER.FIELDS (FROM)");
        assert_eq!(*origin, Some(0));
    }

    #[test]
    fn test_unknown_items_are_skipped() {
        let input = b"(MODSEQ (12345) ENVELOPE (\"d\" NIL ((NIL NIL \"a\" \"b\")) NIL) UID 3)";
        let items = fetch_items(&mut Lexer::new(input)).unwrap();
        assert_eq!(items, vec![FetchItem::Uid(Uid::new(3).unwrap())]);
    }
}
