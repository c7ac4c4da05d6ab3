//! Lexer output.

/// One lexical unit of a server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Bare atom, including flag atoms such as `\Seen`.
    Atom(&'a str),
    /// Quoted string with escapes resolved.
    Quoted(String),
    /// `{n}` literal payload.
    Literal(&'a [u8]),
    /// Atom made only of digits.
    Number(u32),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// A single space.
    Space,
    /// `*`
    Asterisk,
    /// `+`
    Plus,
    /// `NIL`, any case.
    Nil,
    /// End of line.
    Crlf,
    /// End of input.
    Eof,
}
