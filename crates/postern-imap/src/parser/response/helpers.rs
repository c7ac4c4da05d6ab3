//! Grammar pieces shared by several response kinds.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, CopyUid, Flag, Flags, ListEntry, MailboxAttribute, ResponseCode, SequenceSet,
    StatusData, Uid, UidValidity,
};
use crate::Result;

/// Parses `[CODE ...]`. The cursor must be on the `[`.
pub fn response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(&Token::LBracket)?;
    let name = match lexer.next_token()? {
        Token::Atom(name) => name.to_ascii_uppercase(),
        other => return Err(lexer.error(format!("expected response code, got {other:?}"))),
    };

    let code = match name.as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "AUTHENTICATIONFAILED" => ResponseCode::AuthenticationFailed,
        "CAPABILITY" => ResponseCode::Capability(capability_list(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(flag_list(lexer)?)
        }
        "UIDNEXT" => {
            lexer.expect_space()?;
            ResponseCode::UidNext(uid(lexer)?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            ResponseCode::UidValidity(uid_validity(lexer)?)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            ResponseCode::Unseen(lexer.number()?)
        }
        "APPENDUID" => {
            lexer.expect_space()?;
            let uid_validity = uid_validity(lexer)?;
            lexer.expect_space()?;
            ResponseCode::AppendUid {
                uid_validity,
                uid: uid(lexer)?,
            }
        }
        "COPYUID" => {
            lexer.expect_space()?;
            let uid_validity = uid_validity(lexer)?;
            lexer.expect_space()?;
            let source = sequence_set(lexer)?;
            lexer.expect_space()?;
            let destination = sequence_set(lexer)?;
            ResponseCode::CopyUid(CopyUid {
                uid_validity,
                source,
                destination,
            })
        }
        _ => {
            lexer.skip_to_bracket_end();
            ResponseCode::Other(name)
        }
    };

    lexer.skip_to_bracket_end();
    lexer.expect(&Token::RBracket)?;
    Ok(code)
}

/// Space-separated capability atoms up to the end of line or `]`.
pub fn capability_list(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.expect_space()?;
        match lexer.next_token()? {
            Token::Atom(atom) => caps.push(Capability::parse(atom)),
            // Trailing space before CRLF.
            Token::Crlf | Token::Eof => break,
            other => return Err(lexer.error(format!("unexpected {other:?} in capabilities"))),
        }
    }
    Ok(caps)
}

/// `(\Seen \Answered)`
pub fn flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(&Token::LParen)?;
    let mut flags = Flags::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => return Ok(flags),
            Token::Space => {}
            Token::Atom(atom) => flags.insert(Flag::parse(atom)),
            other => return Err(lexer.error(format!("unexpected {other:?} in flag list"))),
        }
    }
}

/// `(\HasNoChildren) "/" INBOX`
pub fn list_entry(lexer: &mut Lexer<'_>) -> Result<ListEntry> {
    lexer.expect(&Token::LParen)?;
    let mut attributes = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(atom) => attributes.push(MailboxAttribute::parse(atom)),
            other => return Err(lexer.error(format!("unexpected {other:?} in LIST attributes"))),
        }
    }
    lexer.expect_space()?;

    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::Quoted(d) => d.chars().next(),
        other => return Err(lexer.error(format!("expected delimiter, got {other:?}"))),
    };
    lexer.expect_space()?;
    let name = lexer.astring()?;

    Ok(ListEntry {
        attributes,
        delimiter,
        name,
    })
}

/// `blurdybloop (MESSAGES 231 UIDNEXT 44292)`
pub fn status_data(lexer: &mut Lexer<'_>) -> Result<StatusData> {
    let mut data = StatusData {
        mailbox: lexer.astring()?,
        ..StatusData::default()
    };
    lexer.skip_spaces();
    lexer.expect(&Token::LParen)?;
    loop {
        let name = match lexer.next_token()? {
            Token::RParen => return Ok(data),
            Token::Space => continue,
            Token::Atom(name) => name.to_ascii_uppercase(),
            other => return Err(lexer.error(format!("unexpected {other:?} in STATUS"))),
        };
        lexer.expect_space()?;
        // HIGHESTMODSEQ may exceed u32; keep it as an atom and ignore it.
        let value = match lexer.next_token()? {
            Token::Number(n) => n,
            Token::Atom(_) => continue,
            other => return Err(lexer.error(format!("expected STATUS value, got {other:?}"))),
        };
        match name.as_str() {
            "MESSAGES" => data.messages = Some(value),
            "UIDNEXT" => data.uid_next = Uid::new(value),
            "UIDVALIDITY" => data.uid_validity = UidValidity::new(value),
            "UNSEEN" => data.unseen = Some(value),
            _ => {}
        }
    }
}

/// Numbers after `SEARCH`, ignoring a trailing `(MODSEQ n)`.
pub fn search_results(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut numbers = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::Number(n) => numbers.push(n),
            Token::Space => {}
            Token::Crlf | Token::Eof => return Ok(numbers),
            Token::LParen => {
                lexer.rest_of_line();
                return Ok(numbers);
            }
            other => return Err(lexer.error(format!("unexpected {other:?} in SEARCH"))),
        }
    }
}

/// Non-zero UID.
pub fn uid(lexer: &mut Lexer<'_>) -> Result<Uid> {
    let n = lexer.number()?;
    Uid::new(n).ok_or_else(|| lexer.error("UID 0"))
}

fn uid_validity(lexer: &mut Lexer<'_>) -> Result<UidValidity> {
    let n = lexer.number()?;
    UidValidity::new(n).ok_or_else(|| lexer.error("UIDVALIDITY 0"))
}

fn sequence_set(lexer: &mut Lexer<'_>) -> Result<SequenceSet> {
    let parsed = match lexer.next_token()? {
        Token::Number(n) => SequenceSet::range(n, n),
        Token::Atom(text) => SequenceSet::parse(text),
        _ => None,
    };
    parsed.ok_or_else(|| lexer.error("bad sequence set"))
}
