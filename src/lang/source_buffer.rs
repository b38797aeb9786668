use std::{
    fmt::{self, Display, Formatter},
    io::Read,
};

use crate::runtime::error;

/// The location in the source code where a token was found.  This structure is used throughout the
/// front end to keep track of where important things were found in the source code.  It is used
/// extensively in the error reporting.
///
/// This is a read-only structure.  Use the field accessor methods to get the values.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SourceLocation {
    /// Either the path to the file or a description of the source code.  For example code read
    /// from the standard input will have a tag of "\<stdin\>".
    path: String,

    /// The 1 based line number in the source code.
    line: usize,

    /// The 1 based column number in the source code.
    column: usize,
}

/// Used for error reporting to show where in the source code an error originated.
impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.path, self.line, self.column)
    }
}

impl SourceLocation {
    /// Create a new SourceLocation at the beginning of the given source.
    pub fn new_from_path(path: &str) -> Self {
        SourceLocation {
            path: path.to_owned(),
            line: 1,
            column: 1,
        }
    }

    /// The path to the source code or a meaningful description of the source code.
    pub fn path(&self) -> &String {
        &self.path
    }

    /// The 1 based line number in the source code.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The 1 based column number in the source code.
    pub fn column(&self) -> usize {
        self.column
    }
}

/// A buffer for pulling bytes out of a source code stream.  This is used by the tokenizer to
/// extract meaningful tokens from the source code.  The buffer acts as a forward only iterator
/// over the bytes of the stream, no lookahead is kept.  As bytes are consumed the location of the
/// cursor in that source is maintained, allowing the tokenizer to record where tokens begin.
///
/// Because the underlying reader can be the process standard input, bytes are pulled one at a time
/// and only when asked for.  Interactive sessions stay interactive that way.
pub struct SourceBuffer<'a> {
    /// The stream of source bytes being processed.
    reader: &'a mut dyn Read,

    /// The location of the most recently consumed byte.
    location: SourceLocation,

    /// The location the next byte will be read from.
    next_location: SourceLocation,
}

impl<'a> SourceBuffer<'a> {
    /// Create a new SourceBuffer with the path to, or meaningful tag for the source code and the
    /// byte stream itself.
    pub fn new(path: &str, reader: &'a mut dyn Read) -> Self {
        SourceBuffer {
            reader,
            location: SourceLocation::new_from_path(path),
            next_location: SourceLocation::new_from_path(path),
        }
    }

    /// The location of the most recently consumed byte in the source code.
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Get and consume the next byte of the source code.  Returns None once the stream is
    /// exhausted.
    pub fn next_byte(&mut self) -> error::Result<Option<u8>> {
        let mut byte = [0u8; 1];

        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error.into()),
            }
        }

        self.location = self.next_location.clone();
        self.increment_location(byte[0]);

        Ok(Some(byte[0]))
    }

    /// Advance the cursor location based on the byte just consumed.  Advance one column for
    /// regular bytes.  Reset the column to 1 and increment the line for new line bytes.
    fn increment_location(&mut self, byte: u8) {
        if byte == b'\n' {
            self.next_location.line += 1;
            self.next_location.column = 1;
        } else {
            self.next_location.column += 1;
        }
    }
}
