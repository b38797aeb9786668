use std::{
    io::{Read, Write},
    mem,
};

use crate::{
    lang::{
        parsing::{self, Expression},
        source_buffer::SourceBuffer,
    },
    runtime::{
        data_structures::{dictionary::Dictionary, heap::Heap, stack::Stack},
        error::{self, CallStack, ErrorKind, ScriptError},
    },
};

/// How an evaluation step finished.  `Bye` unwinds every enclosing loop and word call so that the
/// driver can terminate the session immediately, skipping the shutdown validation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flow {
    /// Keep going with the next expression.
    Continue,

    /// The program executed `bye`; end the session gracefully.
    Bye,
}

/// A cell is true iff its bit pattern is non-zero.
fn cell_is_true(cell: i64) -> bool {
    cell != 0
}

/// The canonical flags pushed by the comparison operators: all bits set for true, zero for false.
fn cell_from_bool(flag: bool) -> i64 {
    if flag {
        !0
    } else {
        0
    }
}

/// The tree-walking evaluator.  It owns the session state the language exposes: the parameter and
/// return stacks, the word dictionary, and the live heap allocations.  The byte source for `key`
/// and the sink for `emit` and `.s` are borrowed from the driver so that tests can substitute
/// in-memory streams.
pub struct Evaluator<'a> {
    /// The main value stack operated on by arithmetic, comparisons, I/O, and stack shuffles.
    parameter_stack: Stack,

    /// The auxiliary stack used by the program via `>r r> r@`.  Every user word call runs against
    /// its own fresh instance.
    return_stack: Stack,

    /// The user defined words of the session.
    dictionary: Dictionary,

    /// The live heap allocations of the session.
    heap: Heap,

    /// The chain of user words currently executing, for error reports.
    call_stack: CallStack,

    /// Where `key` reads its bytes from.
    input: &'a mut dyn Read,

    /// Where `emit` and `.s` write their bytes to.
    output: &'a mut dyn Write,
}

impl<'a> Evaluator<'a> {
    /// Create a new evaluator with empty stacks, an empty dictionary, and no live allocations.
    pub fn new(input: &'a mut dyn Read, output: &'a mut dyn Write) -> Evaluator<'a> {
        Evaluator {
            parameter_stack: Stack::new(),
            return_stack: Stack::new(),
            dictionary: Dictionary::new(),
            heap: Heap::new(),
            call_stack: CallStack::new(),
            input,
            output,
        }
    }

    /// The current parameter stack.
    pub fn parameter_stack(&self) -> &Stack {
        &self.parameter_stack
    }

    /// The current return stack.
    pub fn return_stack(&self) -> &Stack {
        &self.return_stack
    }

    /// The current word dictionary.
    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// The current set of live heap allocations.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Push a cell onto the parameter stack.  Useful for seeding a session from the host.
    pub fn push(&mut self, cell: i64) {
        self.parameter_stack.push(cell);
    }

    /// Parse and evaluate top-level expressions from the buffer until the stream is exhausted or
    /// the program executes `bye`.
    pub fn eval_buffer(&mut self, buffer: &mut SourceBuffer) -> error::Result<Flow> {
        while let Some(expression) = parsing::parse_expression(buffer)? {
            if self.eval_expression(&expression)? == Flow::Bye {
                return Ok(Flow::Bye);
            }
        }

        Ok(Flow::Continue)
    }

    /// Evaluate a complete in-memory source text.  The path parameter represents the source in
    /// error reporting.
    pub fn eval_source(&mut self, path: &str, source: &str) -> error::Result<Flow> {
        let mut reader = std::io::Cursor::new(source.as_bytes().to_vec());
        let mut buffer = SourceBuffer::new(path, &mut reader);

        self.eval_buffer(&mut buffer)
    }

    /// Validate the shutdown invariants of a session that drained its input without `bye`: every
    /// allocation must have been freed and the return stack must be empty.
    pub fn finish(&self) -> error::Result<()> {
        if !self.heap.is_empty() {
            return Err(ScriptError::new(
                ErrorKind::LeakAtShutdown(self.heap.len()),
                None,
            ));
        }

        if !self.return_stack.is_empty() {
            return Err(ScriptError::new(ErrorKind::ReturnStackImbalance, None));
        }

        Ok(())
    }

    /// Create a failure that records the word invocations active right now.
    fn fail<T>(&self, kind: ErrorKind) -> error::Result<T> {
        Err(ScriptError::new_with_calls(kind, self.call_stack.clone()))
    }

    /// Attach the active word invocations to an error raised by one of the data structures.
    fn attach_calls(&self, error: ScriptError) -> ScriptError {
        error.with_call_stack(self.call_stack.clone())
    }

    /// Pop the top cell of the parameter stack.
    fn pop(&mut self) -> error::Result<i64> {
        self.parameter_stack
            .pop()
            .map_err(|error| self.attach_calls(error))
    }

    /// Pop the top cell of the return stack.
    fn pop_return(&mut self) -> error::Result<i64> {
        self.return_stack
            .pop()
            .map_err(|error| self.attach_calls(error))
    }

    /// Pop the divisor and dividend for one of the division operators, rejecting a zero divisor.
    fn pop_division_operands(&mut self) -> error::Result<(i64, i64)> {
        let b = self.pop()?;
        let a = self.pop()?;

        if b == 0 {
            return self.fail(ErrorKind::DivideByZero);
        }

        Ok((a, b))
    }

    /// Write bytes to the output sink and flush them through, so interactive sessions see the
    /// output before the next blocking read.
    fn write_output(&mut self, bytes: &[u8]) -> error::Result<()> {
        self.output.write_all(bytes)?;
        self.output.flush()?;

        Ok(())
    }

    /// Evaluate the expressions of a body in order.  A `bye` anywhere inside cuts the body short.
    fn eval_body(&mut self, body: &[Expression]) -> error::Result<Flow> {
        for expression in body {
            if self.eval_expression(expression)? == Flow::Bye {
                return Ok(Flow::Bye);
            }
        }

        Ok(Flow::Continue)
    }

    /// Invoke a user word.  The word runs against its own fresh return stack, which must be empty
    /// again by the time the word finishes.  The caller's return stack is restored afterwards, so
    /// each word acts as a self-contained routine.
    fn invoke_word(&mut self, name: &str) -> error::Result<Flow> {
        let body = match self.dictionary.get(name) {
            Some(body) => body,
            None => return self.fail(ErrorKind::UnknownWord(name.to_string())),
        };

        self.call_stack.push(name.to_string());
        let saved_return_stack = mem::take(&mut self.return_stack);

        let flow = self.eval_body(&body)?;

        if flow == Flow::Continue && !self.return_stack.is_empty() {
            return self.fail(ErrorKind::ReturnStackImbalance);
        }

        self.return_stack = saved_return_stack;
        let _ = self.call_stack.pop();

        Ok(flow)
    }

    /// Evaluate a single expression against the session state.  Dispatch is exhaustive over the
    /// closed expression set; every side effect lands in program order.
    pub fn eval_expression(&mut self, expression: &Expression) -> error::Result<Flow> {
        match expression {
            Expression::Number(number) => {
                self.parameter_stack.push(*number);
            }

            Expression::String(bytes) => {
                let address = self
                    .heap
                    .alloc_bytes(bytes)
                    .map_err(|error| self.attach_calls(error))?;

                self.parameter_stack.push(address);
                self.parameter_stack.push(bytes.len() as i64);
            }

            Expression::Word(name) => return self.invoke_word(name),

            Expression::Add => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(a.wrapping_add(b));
            }

            Expression::Sub => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(a.wrapping_sub(b));
            }

            Expression::Mul => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(a.wrapping_mul(b));
            }

            Expression::Div => {
                let (a, b) = self.pop_division_operands()?;
                self.parameter_stack.push(a.wrapping_div(b));
            }

            Expression::Rem => {
                let (a, b) = self.pop_division_operands()?;
                self.parameter_stack.push(a.wrapping_rem(b));
            }

            Expression::Mod => {
                // The non-negative remainder, as opposed to rem which truncates toward zero.
                let (a, b) = self.pop_division_operands()?;
                let remainder = a.wrapping_rem(b).wrapping_add(b).wrapping_rem(b);
                self.parameter_stack.push(remainder);
            }

            Expression::Less => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(cell_from_bool(a < b));
            }

            Expression::More => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(cell_from_bool(a > b));
            }

            Expression::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(cell_from_bool(a == b));
            }

            Expression::NotEqual => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(cell_from_bool(a != b));
            }

            Expression::And => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(a & b);
            }

            Expression::Or => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(a | b);
            }

            Expression::Invert => {
                let a = self.pop()?;
                self.parameter_stack.push(!a);
            }

            Expression::Emit => {
                let value = self.pop()?;
                self.write_output(&[value as u8])?;
            }

            Expression::Key => {
                let mut byte = [0u8; 1];

                let count = loop {
                    match self.input.read(&mut byte) {
                        Ok(count) => break count,
                        Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(error) => return Err(self.attach_calls(error.into())),
                    }
                };

                // End of input reads as -1, just like the character source.
                let cell = if count == 0 { -1 } else { byte[0] as i64 };
                self.parameter_stack.push(cell);
            }

            Expression::Dup => {
                let a = self.pop()?;
                self.parameter_stack.push(a);
                self.parameter_stack.push(a);
            }

            Expression::Drop => {
                let _ = self.pop()?;
            }

            Expression::Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(b);
                self.parameter_stack.push(a);
            }

            Expression::Over => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(a);
                self.parameter_stack.push(b);
                self.parameter_stack.push(a);
            }

            Expression::Rot => {
                let c = self.pop()?;
                let b = self.pop()?;
                let a = self.pop()?;
                self.parameter_stack.push(b);
                self.parameter_stack.push(c);
                self.parameter_stack.push(a);
            }

            Expression::ToR => {
                let a = self.pop()?;
                self.return_stack.push(a);
            }

            Expression::RFrom => {
                let a = self.pop_return()?;
                self.parameter_stack.push(a);
            }

            Expression::RFetch => {
                let a = self.pop_return()?;
                self.return_stack.push(a);
                self.parameter_stack.push(a);
            }

            Expression::Store => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.heap.store(b, a);
            }

            Expression::Fetch => {
                let b = self.pop()?;
                let value = self.heap.fetch(b);
                self.parameter_stack.push(value);
            }

            Expression::CStore => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.heap.store_byte(b, a);
            }

            Expression::CFetch => {
                let b = self.pop()?;
                let value = self.heap.fetch_byte(b);
                self.parameter_stack.push(value);
            }

            Expression::Alloc => {
                let size = self.pop()?;
                let address = self
                    .heap
                    .alloc(size)
                    .map_err(|error| self.attach_calls(error))?;

                self.parameter_stack.push(address);
            }

            Expression::Free => {
                let address = self.pop()?;

                self.heap
                    .free(address)
                    .map_err(|error| self.attach_calls(error))?;
            }

            Expression::DotS => {
                let report = format!("{}", self.parameter_stack);
                self.write_output(report.as_bytes())?;
            }

            Expression::Bye => return Ok(Flow::Bye),

            Expression::Define { name, body } => {
                self.dictionary
                    .define(name.clone(), body.clone())
                    .map_err(|error| self.attach_calls(error))?;
            }

            Expression::IfThen { body } => {
                if cell_is_true(self.pop()?) {
                    return self.eval_body(body);
                }
            }

            Expression::IfElseThen { if_body, else_body } => {
                let taken = if cell_is_true(self.pop()?) {
                    if_body
                } else {
                    else_body
                };

                return self.eval_body(taken);
            }

            Expression::BeginUntil { body } => loop {
                if self.eval_body(body)? == Flow::Bye {
                    return Ok(Flow::Bye);
                }

                if cell_is_true(self.pop()?) {
                    break;
                }
            },

            Expression::BeginWhileRepeat {
                cond_body,
                loop_body,
            } => loop {
                if self.eval_body(cond_body)? == Flow::Bye {
                    return Ok(Flow::Bye);
                }

                if !cell_is_true(self.pop()?) {
                    break;
                }

                if self.eval_body(loop_body)? == Flow::Bye {
                    return Ok(Flow::Bye);
                }
            },

            Expression::BeginAgain { body } => loop {
                // Only bye, or a fatal error, gets out of here.
                if self.eval_body(body)? == Flow::Bye {
                    return Ok(Flow::Bye);
                }
            },
        }

        Ok(Flow::Continue)
    }
}
