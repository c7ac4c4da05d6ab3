//! Response parser.
//!
//! Input is one complete response as returned by
//! [`FramedStream::read_response`](crate::connection::FramedStream::read_response),
//! with every literal already inlined.

#![allow(clippy::missing_errors_doc)]

mod fetch;
mod helpers;

pub use fetch::{FetchItem, parse_internal_date};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{Capability, Flags, ListEntry, ResponseCode, Status, StatusData};
use crate::Result;

/// Status, optional code and human-readable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Status word.
    pub status: Status,
    /// Bracketed response code.
    pub code: Option<ResponseCode>,
    /// Remaining text.
    pub text: String,
}

/// A parsed server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Completion of a tagged command.
    Tagged {
        /// Tag of the command.
        tag: String,
        /// Outcome.
        condition: Condition,
    },
    /// Untagged data or status.
    Untagged(UntaggedResponse),
    /// `+` continuation request with its text (a base64 challenge during
    /// AUTHENTICATE).
    Continuation(String),
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `OK`, `NO`, `BAD`, `PREAUTH` or `BYE`.
    Condition(Condition),
    /// `CAPABILITY`
    Capability(Vec<Capability>),
    /// `LIST`
    List(ListEntry),
    /// `LSUB`
    Lsub(ListEntry),
    /// `FLAGS`
    Flags(Flags),
    /// `<n> EXISTS`
    Exists(u32),
    /// `<n> RECENT`
    Recent(u32),
    /// `<n> EXPUNGE`
    Expunge(u32),
    /// `<n> FETCH (...)`
    Fetch {
        /// Sequence number.
        seq: u32,
        /// Data items.
        items: Vec<FetchItem>,
    },
    /// `SEARCH`
    Search(Vec<u32>),
    /// `STATUS`
    Status(StatusData),
    /// Recognized framing, unknown keyword (`NAMESPACE`, `ENABLED`, ...).
    Other(String),
}

/// Sans-I/O response parser.
#[derive(Debug)]
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete response.
    ///
    /// Malformed input is an [`Error::Parse`](crate::Error::Parse), never an
    /// I/O error.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);
        match lexer.next_token()? {
            Token::Asterisk => {
                lexer.expect_space()?;
                untagged(&mut lexer).map(Response::Untagged)
            }
            Token::Plus => {
                lexer.skip_spaces();
                Ok(Response::Continuation(lexer.rest_of_line()))
            }
            Token::Atom(tag) => {
                let tag = tag.to_string();
                lexer.expect_space()?;
                let status = match lexer.next_token()? {
                    Token::Atom(word) => status_word(word),
                    _ => None,
                }
                .ok_or_else(|| lexer.error("expected OK, NO or BAD"))?;
                let condition = condition(&mut lexer, status)?;
                Ok(Response::Tagged { tag, condition })
            }
            other => Err(lexer.error(format!("expected '*', '+' or tag, got {other:?}"))),
        }
    }
}

fn status_word(word: &str) -> Option<Status> {
    match word.to_ascii_uppercase().as_str() {
        "OK" => Some(Status::Ok),
        "NO" => Some(Status::No),
        "BAD" => Some(Status::Bad),
        "PREAUTH" => Some(Status::PreAuth),
        "BYE" => Some(Status::Bye),
        _ => None,
    }
}

fn condition(lexer: &mut Lexer<'_>, status: Status) -> Result<Condition> {
    lexer.skip_spaces();
    let code = if lexer.peek() == Some(b'[') {
        Some(helpers::response_code(lexer)?)
    } else {
        None
    };
    lexer.skip_spaces();
    Ok(Condition {
        status,
        code,
        text: lexer.rest_of_line(),
    })
}

fn untagged(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    match lexer.next_token()? {
        Token::Number(n) => {
            lexer.expect_space()?;
            let keyword = match lexer.next_token()? {
                Token::Atom(k) => k.to_ascii_uppercase(),
                other => return Err(lexer.error(format!("expected keyword, got {other:?}"))),
            };
            match keyword.as_str() {
                "EXISTS" => Ok(UntaggedResponse::Exists(n)),
                "RECENT" => Ok(UntaggedResponse::Recent(n)),
                "EXPUNGE" => Ok(UntaggedResponse::Expunge(n)),
                "FETCH" => {
                    lexer.expect_space()?;
                    Ok(UntaggedResponse::Fetch {
                        seq: n,
                        items: fetch::fetch_items(lexer)?,
                    })
                }
                _ => Ok(UntaggedResponse::Other(keyword)),
            }
        }
        Token::Atom(word) => {
            if let Some(status) = status_word(word) {
                return condition(lexer, status).map(UntaggedResponse::Condition);
            }
            match word.to_ascii_uppercase().as_str() {
                "CAPABILITY" => helpers::capability_list(lexer).map(UntaggedResponse::Capability),
                "FLAGS" => {
                    lexer.expect_space()?;
                    helpers::flag_list(lexer).map(UntaggedResponse::Flags)
                }
                "LIST" => {
                    lexer.expect_space()?;
                    helpers::list_entry(lexer).map(UntaggedResponse::List)
                }
                "LSUB" => {
                    lexer.expect_space()?;
                    helpers::list_entry(lexer).map(UntaggedResponse::Lsub)
                }
                "SEARCH" => helpers::search_results(lexer).map(UntaggedResponse::Search),
                "STATUS" => {
                    lexer.expect_space()?;
                    helpers::status_data(lexer).map(UntaggedResponse::Status)
                }
                other => Ok(UntaggedResponse::Other(other.to_string())),
            }
        }
        other => Err(lexer.error(format!("unexpected {other:?} after '*'"))),
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
    use crate::types::{Flag, MailboxAttribute, SequenceSet, Uid, UidValidity};

    fn untagged_of(input: &[u8]) -> UntaggedResponse {
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(u) => u,
            other => panic!("expected untagged, got {other:?}"),
        }
    }

    fn code_of(input: &[u8]) -> Option<ResponseCode> {
        match ResponseParser::parse(input).unwrap() {
            Response::Tagged { condition, .. }
            | Response::Untagged(UntaggedResponse::Condition(condition)) => condition.code,
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn test_tagged_ok_with_text() {
        let response = ResponseParser::parse(b"A0003 OK [READ-WRITE] SELECT completed\r\n").unwrap();
        assert_eq!(
            response,
            Response::Tagged {
                tag: "A0003".into(),
                condition: Condition {
                    status: Status::Ok,
                    code: Some(ResponseCode::ReadWrite),
                    text: "SELECT completed".into(),
                },
            }
        );
    }

    #[test]
    fn test_tagged_no_without_text() {
        let Response::Tagged { condition, .. } = ResponseParser::parse(b"A1 NO\r\n").unwrap() else {
            panic!("expected tagged");
        };
        assert_eq!(condition.status, Status::No);
        assert!(condition.text.is_empty());
    }

    #[test]
    fn test_greeting_with_capabilities() {
        let code = code_of(b"* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=PLAIN STARTTLS] ready\r\n");
        let Some(ResponseCode::Capability(caps)) = code else {
            panic!("expected capabilities");
        };
        assert_eq!(caps.len(), 4);
        assert!(caps.contains(&Capability::SaslIr));
    }

    #[test]
    fn test_select_codes() {
        assert_eq!(
            code_of(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n"),
            Some(ResponseCode::UidValidity(UidValidity::new(3857529045).unwrap()))
        );
        assert_eq!(
            code_of(b"* OK [UIDNEXT 4392] Predicted next UID\r\n"),
            Some(ResponseCode::UidNext(Uid::new(4392).unwrap()))
        );
        let Some(ResponseCode::PermanentFlags(flags)) =
            code_of(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n")
        else {
            panic!("expected permanent flags");
        };
        assert!(flags.contains(&Flag::Deleted));
        assert!(flags.contains(&Flag::Keyword("\\*".into())));
    }

    #[test]
    fn test_uidplus_codes() {
        assert_eq!(
            code_of(b"A3 OK [APPENDUID 38505 3955] APPEND completed\r\n"),
            Some(ResponseCode::AppendUid {
                uid_validity: UidValidity::new(38505).unwrap(),
                uid: Uid::new(3955).unwrap(),
            })
        );
        let Some(ResponseCode::CopyUid(copy)) =
            code_of(b"A4 OK [COPYUID 38505 304,319:320 3956:3958] Done\r\n")
        else {
            panic!("expected COPYUID");
        };
        assert_eq!(copy.source, SequenceSet::parse("304,319:320").unwrap());
        assert_eq!(copy.mapping().get(&319), Some(&3957));
    }

    #[test]
    fn test_unknown_code_is_kept() {
        assert_eq!(
            code_of(b"A5 NO [OVERQUOTA 12] Quota exceeded\r\n"),
            Some(ResponseCode::Other("OVERQUOTA".into()))
        );
    }

    #[test]
    fn test_list_and_lsub() {
        let UntaggedResponse::List(entry) =
            untagged_of(b"* LIST (\\HasNoChildren \\Sent) \"/\" \"Sent Items\"\r\n")
        else {
            panic!("expected LIST");
        };
        assert_eq!(entry.name, "Sent Items");
        assert_eq!(entry.delimiter, Some('/'));
        assert_eq!(entry.special_use(), Some(&MailboxAttribute::Sent));

        let UntaggedResponse::Lsub(entry) = untagged_of(b"* LSUB () NIL INBOX\r\n") else {
            panic!("expected LSUB");
        };
        assert_eq!(entry.delimiter, None);
        assert!(entry.is_inbox());
    }

    #[test]
    fn test_list_with_literal_name() {
        let UntaggedResponse::List(entry) = untagged_of(b"* LIST () \".\" {8}\r\nMy \"Box\"\r\n") else {
            panic!("expected LIST");
        };
        assert_eq!(entry.name, "My \"Box\"");
    }

    #[test]
    fn test_counts() {
        assert_eq!(untagged_of(b"* 172 EXISTS\r\n"), UntaggedResponse::Exists(172));
        assert_eq!(untagged_of(b"* 1 RECENT\r\n"), UntaggedResponse::Recent(1));
        assert_eq!(untagged_of(b"* 44 EXPUNGE\r\n"), UntaggedResponse::Expunge(44));
    }

    #[test]
    fn test_search_and_status() {
        assert_eq!(
            untagged_of(b"* SEARCH 2 84 882\r\n"),
            UntaggedResponse::Search(vec![2, 84, 882])
        );
        assert_eq!(untagged_of(b"* SEARCH\r\n"), UntaggedResponse::Search(vec![]));

        let UntaggedResponse::Status(status) =
            untagged_of(b"* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)\r\n")
        else {
            panic!("expected STATUS");
        };
        assert_eq!(status.mailbox, "blurdybloop");
        assert_eq!(status.messages, Some(231));
        assert_eq!(status.uid_next, Uid::new(44292));
    }

    #[test]
    fn test_flags_and_fetch() {
        let UntaggedResponse::Flags(flags) =
            untagged_of(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
        else {
            panic!("expected FLAGS");
        };
        assert_eq!(flags.len(), 5);

        let UntaggedResponse::Fetch { seq, items } =
            untagged_of(b"* 12 FETCH (FLAGS (\\Seen) UID 4827)\r\n")
        else {
            panic!("expected FETCH");
        };
        assert_eq!(seq, 12);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_continuation() {
        assert_eq!(
            ResponseParser::parse(b"+ PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2U+\r\n").unwrap(),
            Response::Continuation("PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2U+".into())
        );
        assert_eq!(
            ResponseParser::parse(b"+\r\n").unwrap(),
            Response::Continuation(String::new())
        );
    }

    #[test]
    fn test_malformed_is_parse_error() {
        let err = ResponseParser::parse(b"* LIST (\\Noselect\r\n").unwrap_err();
        assert!(matches!(err, crate::Error::Parse { .. }));
        assert!(ResponseParser::parse(b"A1 MAYBE done\r\n").is_err());
    }
}
