/// Module for managing the original source code.
pub mod source_buffer;

/// Module for turning the source code into a stream of tokens for further processing.
pub mod tokenizing;

/// Module for parsing the token stream into a tree of expressions.  One top-level expression is
/// produced per call, with control flow properly nested within it.
pub mod parsing;
