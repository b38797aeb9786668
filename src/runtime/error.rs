use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
};

use crate::lang::source_buffer::SourceLocation;

pub type Result<T> = std::result::Result<T, ScriptError>;

/// The chain of user word invocations that was active when an error occurred.  The innermost word
/// is the last entry.
pub type CallStack = Vec<String>;

/// The closed set of failures the front end and the runtime can report.  Every one of them is
/// fatal; no error is surfaced to program code or recovered locally.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    /// The input ended inside a literal or while a composite construct was still open.
    UnexpectedEof,

    /// A character literal was missing its closing single quote.
    ExpectedSingleQuote,

    /// A closer token appeared where a top-level expression was expected.  Carries the closer's
    /// source text.
    UnexpectedCloser(&'static str),

    /// A colon was not followed by a word name.
    ExpectedWord,

    /// A colon appeared inside an open definition body.
    NestedColon,

    /// A word was invoked that is not in the dictionary.
    UnknownWord(String),

    /// A definition re-used a name already in the dictionary.
    Redefinition(String),

    /// A pop was attempted on an empty stack.
    StackUnderflow,

    /// An allocation was requested with a non-positive size.
    InvalidAlloc(i64),

    /// A free was requested for an address that is not a live allocation.
    InvalidFree(i64),

    /// A division or remainder had a zero divisor.
    DivideByZero,

    /// Live heap allocations remained at session shutdown.
    LeakAtShutdown(usize),

    /// The return stack was not empty when it had to be.
    ReturnStackImbalance,

    /// A source or sink failed underneath the session.
    Io(String),
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ErrorKind::UnexpectedEof => write!(f, "unexpected end of input"),
            ErrorKind::ExpectedSingleQuote => {
                write!(f, "expected closing ' in character literal")
            }
            ErrorKind::UnexpectedCloser(text) => write!(f, "unexpected {}", text),
            ErrorKind::ExpectedWord => write!(f, "expected a word name after :"),
            ErrorKind::NestedColon => write!(f, "definitions can not be nested"),
            ErrorKind::UnknownWord(name) => write!(f, "unknown word: {}", name),
            ErrorKind::Redefinition(name) => write!(f, "word already defined: {}", name),
            ErrorKind::StackUnderflow => write!(f, "stack underflow"),
            ErrorKind::InvalidAlloc(size) => {
                write!(f, "alloc size must be positive, got {}", size)
            }
            ErrorKind::InvalidFree(address) => {
                write!(f, "free of unallocated address {}", address)
            }
            ErrorKind::DivideByZero => write!(f, "division by zero"),
            ErrorKind::LeakAtShutdown(count) => {
                write!(f, "{} heap allocation(s) leaked at shutdown", count)
            }
            ErrorKind::ReturnStackImbalance => write!(f, "return stack not empty"),
            ErrorKind::Io(message) => write!(f, "I/O error: {}", message),
        }
    }
}

/// Any error that occurs while tokenizing, parsing, evaluating, or transpiling a program.
#[derive(Clone)]
pub struct ScriptError {
    /// What went wrong.
    kind: ErrorKind,

    /// The location in the source code the error occurred, if available.
    location: Option<SourceLocation>,

    /// The user word invocations that were active at the time of the error, if any.
    call_stack: Option<CallStack>,
}

impl Error for ScriptError {}

/// Pretty print the error for the user, including the source location and word call stack when
/// they are available.
impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}", location, self.kind)?,
            None => write!(f, "{}", self.kind)?,
        }

        if let Some(call_stack) = &self.call_stack {
            if !call_stack.is_empty() {
                write!(f, "\n\nCall stack\n")?;

                for word in call_stack.iter().rev() {
                    writeln!(f, "  {}", word)?;
                }
            }
        }

        Ok(())
    }
}

/// Keep the Debug output identical to the Display output.  This way `main` returning a ScriptError
/// still prints the friendly report.
impl Debug for ScriptError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl ScriptError {
    /// Create a new ScriptError.
    pub fn new(kind: ErrorKind, location: Option<SourceLocation>) -> ScriptError {
        ScriptError {
            kind,
            location,
            call_stack: None,
        }
    }

    /// Create a new ScriptError that records the word invocations active at the time.
    pub fn new_with_calls(kind: ErrorKind, call_stack: CallStack) -> ScriptError {
        ScriptError {
            kind,
            location: None,
            call_stack: Some(call_stack),
        }
    }

    /// Attach the word invocations that were active when the error surfaced.
    pub fn with_call_stack(mut self, call_stack: CallStack) -> ScriptError {
        self.call_stack = Some(call_stack);
        self
    }

    /// What went wrong.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// If available, the location in the source code the error occurred.
    pub fn location(&self) -> &Option<SourceLocation> {
        &self.location
    }
}

/// Allow for the conversion of a std::io::Error into a ScriptError.
impl From<std::io::Error> for ScriptError {
    fn from(error: std::io::Error) -> ScriptError {
        ScriptError::new(ErrorKind::Io(error.to_string()), None)
    }
}
