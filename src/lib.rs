//! Interpreter and source-to-C++ transpiler for a small stack-oriented
//! concatenative language in the Forth tradition.
//!
//! A program is a stream of whitespace separated tokens.  Execution runs
//! against two stacks of 64-bit signed cells, a dictionary of user defined
//! words, and a manually managed heap.  The same parsed expression tree
//! drives both the tree-walking evaluator and the C++ emitting transpiler.

/// Module for managing source text and turning it into expressions.
pub mod lang;

/// Module for the runtime, its data structures, the evaluator, and the
/// transpiler back end.
pub mod runtime;
