use std::{
    collections::HashMap,
    fmt::{self, Debug, Display, Formatter},
};

use lazy_static::lazy_static;

use crate::{
    lang::source_buffer::{SourceBuffer, SourceLocation},
    runtime::error::{self, ErrorKind, ScriptError},
};

/// One of the language's built-in operators or structural keywords.  Every entry corresponds to a
/// single reserved word in the source text, and the reserved table is the only way to produce one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Mod,

    Less,
    More,
    Equal,
    NotEqual,

    And,
    Or,
    Invert,

    Emit,
    Key,

    Dup,
    Drop,
    Swap,
    Over,
    Rot,

    ToR,
    RFrom,
    RFetch,

    Store,
    Fetch,
    CStore,
    CFetch,
    Alloc,
    Free,

    DotS,
    Bye,

    Colon,
    Semicolon,

    If,
    Then,
    Else,

    Begin,
    Until,
    While,
    Repeat,
    Again,
}

lazy_static! {
    /// The fixed table of reserved words.  Lookups are case-sensitive and any whitespace
    /// delimited text not found here becomes either a number or a user word.
    static ref RESERVED_WORDS: HashMap<&'static str, Operator> = HashMap::from([
        ("+", Operator::Add),
        ("-", Operator::Sub),
        ("*", Operator::Mul),
        ("/", Operator::Div),
        ("rem", Operator::Rem),
        ("mod", Operator::Mod),

        ("<", Operator::Less),
        (">", Operator::More),
        ("=", Operator::Equal),
        ("<>", Operator::NotEqual),

        ("and", Operator::And),
        ("or", Operator::Or),
        ("invert", Operator::Invert),

        ("emit", Operator::Emit),
        ("key", Operator::Key),

        ("dup", Operator::Dup),
        ("drop", Operator::Drop),
        ("swap", Operator::Swap),
        ("over", Operator::Over),
        ("rot", Operator::Rot),

        (">r", Operator::ToR),
        ("r>", Operator::RFrom),
        ("r@", Operator::RFetch),

        ("!", Operator::Store),
        ("@", Operator::Fetch),
        ("c!", Operator::CStore),
        ("c@", Operator::CFetch),
        ("alloc", Operator::Alloc),
        ("free", Operator::Free),

        (".s", Operator::DotS),
        ("bye", Operator::Bye),

        (":", Operator::Colon),
        (";", Operator::Semicolon),

        ("if", Operator::If),
        ("then", Operator::Then),
        ("else", Operator::Else),

        ("begin", Operator::Begin),
        ("until", Operator::Until),
        ("while", Operator::While),
        ("repeat", Operator::Repeat),
        ("again", Operator::Again),
    ]);
}

/// A token is a simple unit of the language.  It can be a number literal, a string literal, a user
/// word, or one of the reserved operators.
///
/// The token also holds the location in the original source code where it was found.
#[derive(Clone, PartialEq, Eq)]
pub enum Token {
    /// A 64-bit signed integer literal, written either as decimal digits or as a quoted
    /// character.
    Number(SourceLocation, i64),

    /// A double quoted string literal holding the raw bytes of its text.
    String(SourceLocation, Vec<u8>),

    /// A word in the language to be looked up in the dictionary and executed.
    Word(SourceLocation, String),

    /// One of the reserved operators or structural keywords.
    Operator(SourceLocation, Operator),
}

/// Make sure that the tokens are nicely printable for debugging purposes.
impl Display for Token {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Token::Number(_, number) => write!(f, "{}", number),
            Token::String(_, bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            Token::Word(_, word) => write!(f, "{}", word),
            Token::Operator(_, operator) => write!(f, "{:?}", operator),
        }
    }
}

/// Debug printing includes the location the token came from.
impl Debug for Token {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.location(), self)
    }
}

impl Token {
    /// Get the token's location in the original source text.
    pub fn location(&self) -> &SourceLocation {
        match self {
            Token::Number(location, _) => location,
            Token::String(location, _) => location,
            Token::Word(location, _) => location,
            Token::Operator(location, _) => location,
        }
    }
}

/// Check if the given byte is considered whitespace.  End of input also terminates tokens, but is
/// handled separately by the callers.
fn is_whitespace(byte: u8) -> bool {
    byte == b' ' || byte == b'\t' || byte == b'\r' || byte == b'\n'
}

/// Process an escape sequence within a character or string literal.  The backslash itself has
/// already been consumed.  A recognized escape is translated, any other byte passes through
/// unchanged.  Hitting the end of the input directly after a backslash is an error.
fn process_escape(buffer: &mut SourceBuffer) -> error::Result<u8> {
    match buffer.next_byte()? {
        Some(b'n') => Ok(b'\n'),
        Some(b'r') => Ok(b'\r'),
        Some(b't') => Ok(b'\t'),
        Some(b'b') => Ok(0x08),
        Some(byte) => Ok(byte),
        None => Err(ScriptError::new(
            ErrorKind::UnexpectedEof,
            Some(buffer.location().clone()),
        )),
    }
}

/// Process a character literal.  The opening single quote has already been consumed.  Exactly one
/// byte of content is read, possibly through an escape, and the closing quote is required.
fn process_char(location: SourceLocation, buffer: &mut SourceBuffer) -> error::Result<Token> {
    let value = match buffer.next_byte()? {
        Some(b'\\') => process_escape(buffer)?,
        Some(byte) => byte,
        None => {
            return Err(ScriptError::new(
                ErrorKind::UnexpectedEof,
                Some(buffer.location().clone()),
            ));
        }
    };

    match buffer.next_byte()? {
        Some(b'\'') => Ok(Token::Number(location, value as i64)),
        _ => Err(ScriptError::new(
            ErrorKind::ExpectedSingleQuote,
            Some(buffer.location().clone()),
        )),
    }
}

/// Process a string literal.  The opening double quote has already been consumed.  Bytes are
/// accumulated, with escape processing, until the closing quote.  Hitting the end of the input
/// before the closing quote is an error.
fn process_string(location: SourceLocation, buffer: &mut SourceBuffer) -> error::Result<Token> {
    let mut bytes = Vec::new();

    loop {
        match buffer.next_byte()? {
            Some(b'"') => return Ok(Token::String(location, bytes)),
            Some(b'\\') => bytes.push(process_escape(buffer)?),
            Some(byte) => bytes.push(byte),
            None => {
                return Err(ScriptError::new(
                    ErrorKind::UnexpectedEof,
                    Some(buffer.location().clone()),
                ));
            }
        }
    }
}

/// Attempt to read the accumulated text as a signed decimal integer literal: an optional leading
/// sign, then one or more decimal digits and nothing else.  The magnitude is accumulated left to
/// right in base 10 with wrapping 64-bit arithmetic, so an overflowing literal wraps rather than
/// aborting the host.
fn parse_number(text: &[u8]) -> Option<i64> {
    let (sign, digits) = match text {
        [b'-', rest @ ..] => (-1, rest),
        [b'+', rest @ ..] => (1, rest),
        _ => (1, text),
    };

    if digits.is_empty() {
        return None;
    }

    let mut magnitude: i64 = 0;

    for &byte in digits {
        if !byte.is_ascii_digit() {
            return None;
        }

        magnitude = magnitude
            .wrapping_mul(10)
            .wrapping_add((byte - b'0') as i64);
    }

    Some(magnitude.wrapping_mul(sign))
}

/// Classify a fully accumulated word.  Number literals win first, then the reserved table, and
/// anything left over is a user word.  Classification always sees the whole word, so "-5" is a
/// number while "-foo" is a word.
fn classify_word(location: SourceLocation, text: Vec<u8>) -> Token {
    if let Some(number) = parse_number(&text) {
        return Token::Number(location, number);
    }

    let text = String::from_utf8_lossy(&text).into_owned();

    if let Some(&operator) = RESERVED_WORDS.get(text.as_str()) {
        Token::Operator(location, operator)
    } else {
        Token::Word(location, text)
    }
}

/// Pull the next token out of the source buffer, or None once the stream is exhausted.  The
/// tokenizer holds no state of its own between calls; the single terminating whitespace byte of
/// each word is consumed along with it.
pub fn next_token(buffer: &mut SourceBuffer) -> error::Result<Option<Token>> {
    // Skip over any whitespace in front of the token.
    let first = loop {
        match buffer.next_byte()? {
            Some(byte) if is_whitespace(byte) => continue,
            Some(byte) => break byte,
            None => return Ok(None),
        }
    };

    let location = buffer.location().clone();

    match first {
        b'\'' => Ok(Some(process_char(location, buffer)?)),
        b'"' => Ok(Some(process_string(location, buffer)?)),
        _ => {
            // This is a word or a number, tbd once the whole text is in hand.
            let mut text = vec![first];

            loop {
                match buffer.next_byte()? {
                    Some(byte) if is_whitespace(byte) => break,
                    Some(byte) => text.push(byte),
                    None => break,
                }
            }

            Ok(Some(classify_word(location, text)))
        }
    }
}
