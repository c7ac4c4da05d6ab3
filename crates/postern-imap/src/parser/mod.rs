//! Sans-I/O response parsing.
//!
//! The [`Lexer`] splits a response into tokens; [`ResponseParser`] builds
//! typed responses from them. Nothing here touches a socket.
//!
//! ```
//! use postern_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 3 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(3)));
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{
    Condition, FetchItem, Response, ResponseParser, UntaggedResponse, parse_internal_date,
};
