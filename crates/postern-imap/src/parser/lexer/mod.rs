//! Tokenizer over one complete response, literals included.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::Token;

use crate::{Error, Result};

/// Cursor over response bytes.
#[derive(Debug)]
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Starts at the beginning of `input`.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Byte offset of the cursor.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Next byte, not consumed.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// True once every byte has been consumed.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    /// Builds a parse error at the cursor.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    /// Consumes and returns the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        let single = match byte {
            b' ' => Some(Token::Space),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b'*' => Some(Token::Asterisk),
            b'+' => Some(Token::Plus),
            _ => None,
        };
        if let Some(token) = single {
            self.bump();
            return Ok(token);
        }

        match byte {
            b'\r' if self.input.get(self.pos + 1) == Some(&b'\n') => {
                self.pos += 2;
                Ok(Token::Crlf)
            }
            b'\n' => {
                // Bare LF from sloppy servers.
                self.bump();
                Ok(Token::Crlf)
            }
            b'"' => self.quoted(),
            b'{' => self.literal(),
            b if is_atom_char(b) => Ok(self.atom()),
            other => Err(self.error(format!("unexpected byte 0x{other:02x}"))),
        }
    }

    fn atom(&mut self) -> Token<'a> {
        let start = self.pos;
        while self.peek().is_some_and(is_atom_char) {
            self.bump();
        }
        // `\*` in PERMANENTFLAGS
        if self.pos - start == 1 && self.input[start] == b'\\' && self.peek() == Some(b'*') {
            self.bump();
        }

        let raw = &self.input[start..self.pos];
        // Atom bytes are ASCII by construction.
        let text = std::str::from_utf8(raw).unwrap_or_default();

        if raw.iter().all(u8::is_ascii_digit) {
            if let Ok(n) = text.parse() {
                return Token::Number(n);
            }
        } else if text.eq_ignore_ascii_case("NIL") {
            return Token::Nil;
        }
        Token::Atom(text)
    }

    fn quoted(&mut self) -> Result<Token<'a>> {
        self.bump();
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\r' | b'\n') => return Err(self.error("unterminated quoted string")),
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    bytes.push(escaped);
                    self.bump();
                }
                Some(b) => {
                    bytes.push(b);
                    self.bump();
                }
            }
        }
        Ok(Token::Quoted(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn literal(&mut self) -> Result<Token<'a>> {
        self.bump();
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        let len: usize = std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("bad literal length"))?;
        if self.peek() == Some(b'+') {
            self.bump();
        }
        if self.peek() != Some(b'}') {
            return Err(self.error("expected '}'"));
        }
        self.bump();
        if self.next_token()? != Token::Crlf {
            return Err(self.error("expected CRLF after literal length"));
        }

        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| self.error(format!("literal of {len} bytes is truncated")))?;
        let data = &self.input[self.pos..end];
        self.pos = end;
        Ok(Token::Literal(data))
    }

    /// Consumes `expected` or fails.
    pub fn expect(&mut self, expected: &Token<'_>) -> Result<()> {
        let got = self.next_token()?;
        if &got == expected {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, got {got:?}")))
        }
    }

    /// Consumes one space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(&Token::Space)
    }

    /// Skips any run of spaces.
    pub fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.bump();
        }
    }

    /// Reads a number.
    pub fn number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            other => Err(self.error(format!("expected number, got {other:?}"))),
        }
    }

    /// Reads an atom, quoted string, literal or number as text.
    pub fn astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Quoted(s) => Ok(s),
            Token::Literal(data) => Ok(String::from_utf8_lossy(data).into_owned()),
            Token::Number(n) => Ok(n.to_string()),
            // A mailbox literally named "NIL".
            Token::Nil => Ok("NIL".to_string()),
            other => Err(self.error(format!("expected string, got {other:?}"))),
        }
    }

    /// Reads a string or `NIL` as raw bytes.
    pub fn nstring(&mut self) -> Result<Option<Vec<u8>>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::Quoted(s) => Ok(Some(s.into_bytes())),
            Token::Literal(data) => Ok(Some(data.to_vec())),
            other => Err(self.error(format!("expected nstring, got {other:?}"))),
        }
    }

    /// Takes the rest of the line as text and consumes the line ending.
    pub fn rest_of_line(&mut self) -> String {
        let rest = &self.input[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(rest.len());
        self.pos += end;
        while matches!(self.peek(), Some(b'\r' | b'\n')) {
            self.bump();
        }
        String::from_utf8_lossy(&rest[..end]).into_owned()
    }

    /// Skips to just before the next `]` on this line.
    pub fn skip_to_bracket_end(&mut self) {
        while let Some(b) = self.peek() {
            if b == b']' || b == b'\r' || b == b'\n' {
                break;
            }
            self.bump();
        }
    }
}

/// `ATOM-CHAR` plus `\` so that flags lex as one atom.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    b > 0x20
        && b < 0x7f
        && !matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'[' | b']')
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
    use proptest::prelude::*;

    use super::*;

    fn tokens(input: &[u8]) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_untagged_status_line() {
        assert_eq!(
            tokens(b"* 23 EXISTS\r\n"),
            vec![
                Token::Asterisk,
                Token::Space,
                Token::Number(23),
                Token::Space,
                Token::Atom("EXISTS"),
                Token::Crlf,
            ]
        );
    }

    #[test]
    fn test_flags_and_wildcard_flag() {
        assert_eq!(
            tokens(b"(\\Seen \\*)"),
            vec![
                Token::LParen,
                Token::Atom("\\Seen"),
                Token::Space,
                Token::Atom("\\*"),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_quoted_with_escapes() {
        assert_eq!(
            tokens(br#""a \"b\" \\c""#),
            vec![Token::Quoted("a \"b\" \\c".to_string())]
        );
    }

    #[test]
    fn test_literal_payload() {
        assert_eq!(
            tokens(b"{5}\r\nhello)"),
            vec![Token::Literal(b"hello"), Token::RParen]
        );
        assert!(Lexer::new(b"{9}\r\nshort").next_token().is_err());
    }

    #[test]
    fn test_nil_and_body_section() {
        assert_eq!(
            tokens(b"nil BODY[HEADER]"),
            vec![
                Token::Nil,
                Token::Space,
                Token::Atom("BODY"),
                Token::LBracket,
                Token::Atom("HEADER"),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_huge_number_stays_atom() {
        assert_eq!(tokens(b"99999999999"), vec![Token::Atom("99999999999")]);
    }

    proptest! {
        #[test]
        fn prop_lexer_never_panics(input in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut lexer = Lexer::new(&input);
            for _ in 0..512 {
                match lexer.next_token() {
                    Ok(Token::Eof) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        }

        #[test]
        fn prop_quoted_round_trip(text in "[ -!#-\\[\\]-~]{0,40}") {
            let wire = format!("\"{text}\"");
            let mut lexer = Lexer::new(wire.as_bytes());
            prop_assert_eq!(lexer.next_token().unwrap(), Token::Quoted(text));
        }
    }
}
