/// The stack of 64-bit signed cells used for both the parameter and the return stack.
pub mod stack;

/// The dictionary of user defined words known to the evaluator.
pub mod dictionary;

/// The set of live heap allocations owned by the evaluator, addressed through 64-bit integers.
pub mod heap;
