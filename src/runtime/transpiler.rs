use std::{collections::HashMap, io::Write, mem};

use crate::{
    lang::{
        parsing::{self, Body, Expression},
        source_buffer::SourceBuffer,
    },
    runtime::error::{self, ErrorKind, ScriptError},
};

/// The fixed C++ prologue of every emitted program: the runtime stack type with the `.s` dump,
/// the two stack instances, and the cell/bool helpers.  Everything the fragments below refer to
/// lives here; the emitted program never refers back to the interpreter.
const PROLOGUE: &str = "\
// Generated program.
#include <cstdint>
#include <cstdio>
#include <cstdlib>
#include <vector>

class Stack {
public:
  void push(std::int64_t cell) { data.push_back(cell); }
  std::int64_t pop() {
    const std::int64_t cell = data.back();
    data.pop_back();
    return cell;
  }
  void debug() {
    std::printf(\"<%zu> \", data.size());
    for (const std::int64_t cell : data) {
      std::printf(\"%lld \", static_cast<long long>(cell));
    }
  }

private:
  std::vector<std::int64_t> data;
};

Stack parameter_stack;
Stack return_stack;

std::int64_t cell_from_bool(bool flag) { return flag ? ~0 : 0; }
bool cell_is_true(std::int64_t cell) { return cell != 0; }
";

/// A fragment that pops two operands and pushes a combination of them back.  Most of the binary
/// operators only differ in that one combining expression.
fn binary_fragment(label: &str, combined: &str) -> String {
    format!(
        "// {}\n\
         {{\n\
         const std::int64_t b = parameter_stack.pop();\n\
         const std::int64_t a = parameter_stack.pop();\n\
         parameter_stack.push({});\n\
         }}\n",
        label, combined
    )
}

/// The transpiler back end.  It shares the parser's expression tree with the evaluator but, for
/// each expression, appends equivalent C++ statements to a growing main buffer.  Word definitions
/// instead become functions: a forward declaration, a definition, and a dictionary entry that
/// maps the word name onto the emitted function's integer suffix.
#[derive(Default)]
pub struct Transpiler {
    /// Forward declarations of the emitted word functions.
    declarations: String,

    /// Function bodies of the emitted word functions.
    definitions: String,

    /// Straight-line code for the program entry point.
    main_section: String,

    /// The integer suffix of the emitted function for each defined word.
    dictionary: HashMap<String, usize>,

    /// The suffix handed to the next definition.
    next_word_index: usize,
}

impl Transpiler {
    /// Create a new transpiler with empty buffers and an empty dictionary.
    pub fn new() -> Transpiler {
        Transpiler::default()
    }

    /// Check if a word has been compiled.
    pub fn contains(&self, name: &str) -> bool {
        self.dictionary.contains_key(name)
    }

    /// Parse and compile top-level expressions from the buffer until the stream is exhausted.
    /// Non-definition expressions accumulate in the main buffer; definitions land in the
    /// declaration and definition buffers.
    pub fn compile_buffer(&mut self, buffer: &mut SourceBuffer) -> error::Result<()> {
        let mut main_section = mem::take(&mut self.main_section);

        let result = (|| {
            while let Some(expression) = parsing::parse_expression(buffer)? {
                self.compile_expression(&expression, &mut main_section)?;
            }

            Ok(())
        })();

        self.main_section = main_section;
        result
    }

    /// Compile a complete in-memory source text.  The path parameter represents the source in
    /// error reporting.
    pub fn compile_source(&mut self, path: &str, source: &str) -> error::Result<()> {
        let mut reader = std::io::Cursor::new(source.as_bytes().to_vec());
        let mut buffer = SourceBuffer::new(path, &mut reader);

        self.compile_buffer(&mut buffer)
    }

    /// Concatenate the prologue, the declarations, the definitions, and the main function around
    /// the accumulated buffers, and send the finished program to the sink.
    pub fn write(&self, destination: &mut dyn Write) -> error::Result<()> {
        destination.write_all(PROLOGUE.as_bytes())?;
        destination.write_all(self.declarations.as_bytes())?;
        destination.write_all(self.definitions.as_bytes())?;
        destination.write_all(b"int main() {\n")?;
        destination.write_all(self.main_section.as_bytes())?;
        destination.write_all(b"return 0;\n}\n")?;
        destination.flush()?;

        Ok(())
    }

    /// Compile the expressions of a body in order into the destination buffer.
    fn compile_body(&mut self, body: &Body, destination: &mut String) -> error::Result<()> {
        for expression in body {
            self.compile_expression(expression, destination)?;
        }

        Ok(())
    }

    /// Compile a word definition.  The word's index is allocated and published before its body is
    /// compiled so that recursive calls resolve to the function being emitted.
    fn compile_define(&mut self, name: &str, body: &Body) -> error::Result<()> {
        if self.dictionary.contains_key(name) {
            return Err(ScriptError::new(
                ErrorKind::Redefinition(name.to_string()),
                None,
            ));
        }

        let index = self.next_word_index;
        self.next_word_index += 1;
        let _ = self.dictionary.insert(name.to_string(), index);

        self.declarations
            .push_str(&format!("// Declare {}\nvoid word_{}();\n", name, index));

        let mut definition = format!("// Define {}\nvoid word_{}() {{\n", name, index);
        self.compile_body(body, &mut definition)?;
        definition.push_str("}\n");

        self.definitions.push_str(&definition);
        Ok(())
    }

    /// Append the C++ equivalent of one expression to the destination buffer.  The fragments
    /// mirror the evaluator's semantics construct for construct.
    fn compile_expression(
        &mut self,
        expression: &Expression,
        destination: &mut String,
    ) -> error::Result<()> {
        match expression {
            Expression::Number(number) => {
                destination.push_str(&format!(
                    "// Number\nparameter_stack.push(INT64_C({}));\n",
                    number
                ));
            }

            Expression::String(bytes) => {
                // The bytes are emitted one assignment at a time, so the literal survives the
                // trip through C++ source unescaped.
                destination.push_str(&format!(
                    "// String\n{{\nstd::uint8_t *const addr = new std::uint8_t[{}];\n",
                    bytes.len().max(1)
                ));

                for (index, byte) in bytes.iter().enumerate() {
                    destination.push_str(&format!("addr[{}] = {};\n", index, byte));
                }

                destination.push_str(&format!(
                    "parameter_stack.push(reinterpret_cast<std::int64_t>(addr));\n\
                     parameter_stack.push({});\n\
                     }}\n",
                    bytes.len()
                ));
            }

            Expression::Word(name) => match self.dictionary.get(name) {
                Some(index) => {
                    destination.push_str(&format!("// Word {}\nword_{}();\n", name, index));
                }
                None => {
                    return Err(ScriptError::new(
                        ErrorKind::UnknownWord(name.clone()),
                        None,
                    ));
                }
            },

            Expression::Add => destination.push_str(&binary_fragment("Add", "a + b")),
            Expression::Sub => destination.push_str(&binary_fragment("Sub", "a - b")),
            Expression::Mul => destination.push_str(&binary_fragment("Mul", "a * b")),
            Expression::Div => destination.push_str(&binary_fragment("Div", "a / b")),
            Expression::Rem => destination.push_str(&binary_fragment("Rem", "a % b")),
            Expression::Mod => destination.push_str(&binary_fragment("Mod", "(a % b + b) % b")),

            Expression::Less => {
                destination.push_str(&binary_fragment("Less", "cell_from_bool(a < b)"));
            }
            Expression::More => {
                destination.push_str(&binary_fragment("More", "cell_from_bool(a > b)"));
            }
            Expression::Equal => {
                destination.push_str(&binary_fragment("Equal", "cell_from_bool(a == b)"));
            }
            Expression::NotEqual => {
                destination.push_str(&binary_fragment("NotEqual", "cell_from_bool(a != b)"));
            }

            Expression::And => destination.push_str(&binary_fragment("And", "a & b")),
            Expression::Or => destination.push_str(&binary_fragment("Or", "a | b")),

            Expression::Invert => {
                destination.push_str("// Invert\nparameter_stack.push(~parameter_stack.pop());\n");
            }

            Expression::Emit => {
                destination.push_str(
                    "// Emit\n\
                     std::putchar(static_cast<unsigned char>(parameter_stack.pop()));\n",
                );
            }

            Expression::Key => {
                destination.push_str("// Key\nparameter_stack.push(std::getchar());\n");
            }

            Expression::Dup => {
                destination.push_str(
                    "// Dup\n\
                     {\n\
                     const std::int64_t a = parameter_stack.pop();\n\
                     parameter_stack.push(a);\n\
                     parameter_stack.push(a);\n\
                     }\n",
                );
            }

            Expression::Drop => {
                destination.push_str("// Drop\nparameter_stack.pop();\n");
            }

            Expression::Swap => {
                destination.push_str(
                    "// Swap\n\
                     {\n\
                     const std::int64_t b = parameter_stack.pop();\n\
                     const std::int64_t a = parameter_stack.pop();\n\
                     parameter_stack.push(b);\n\
                     parameter_stack.push(a);\n\
                     }\n",
                );
            }

            Expression::Over => {
                destination.push_str(
                    "// Over\n\
                     {\n\
                     const std::int64_t b = parameter_stack.pop();\n\
                     const std::int64_t a = parameter_stack.pop();\n\
                     parameter_stack.push(a);\n\
                     parameter_stack.push(b);\n\
                     parameter_stack.push(a);\n\
                     }\n",
                );
            }

            Expression::Rot => {
                destination.push_str(
                    "// Rot\n\
                     {\n\
                     const std::int64_t c = parameter_stack.pop();\n\
                     const std::int64_t b = parameter_stack.pop();\n\
                     const std::int64_t a = parameter_stack.pop();\n\
                     parameter_stack.push(b);\n\
                     parameter_stack.push(c);\n\
                     parameter_stack.push(a);\n\
                     }\n",
                );
            }

            Expression::ToR => {
                destination.push_str("// ToR\nreturn_stack.push(parameter_stack.pop());\n");
            }

            Expression::RFrom => {
                destination.push_str("// RFrom\nparameter_stack.push(return_stack.pop());\n");
            }

            Expression::RFetch => {
                destination.push_str(
                    "// RFetch\n\
                     {\n\
                     const std::int64_t a = return_stack.pop();\n\
                     return_stack.push(a);\n\
                     parameter_stack.push(a);\n\
                     }\n",
                );
            }

            Expression::Store => {
                destination.push_str(
                    "// Store\n\
                     {\n\
                     const std::int64_t b = parameter_stack.pop();\n\
                     const std::int64_t a = parameter_stack.pop();\n\
                     *reinterpret_cast<std::int64_t *>(b) = a;\n\
                     }\n",
                );
            }

            Expression::Fetch => {
                destination.push_str(
                    "// Fetch\n\
                     parameter_stack.push(\
                     *reinterpret_cast<std::int64_t *>(parameter_stack.pop()));\n",
                );
            }

            Expression::CStore => {
                destination.push_str(
                    "// CStore\n\
                     {\n\
                     const std::int64_t b = parameter_stack.pop();\n\
                     const std::int64_t a = parameter_stack.pop();\n\
                     *reinterpret_cast<std::uint8_t *>(b) = static_cast<std::uint8_t>(a);\n\
                     }\n",
                );
            }

            Expression::CFetch => {
                destination.push_str(
                    "// CFetch\n\
                     parameter_stack.push(\
                     *reinterpret_cast<std::uint8_t *>(parameter_stack.pop()));\n",
                );
            }

            Expression::Alloc => {
                destination.push_str(
                    "// Alloc\n\
                     {\n\
                     const std::int64_t size = parameter_stack.pop();\n\
                     std::uint8_t *const addr = new std::uint8_t[size];\n\
                     parameter_stack.push(reinterpret_cast<std::int64_t>(addr));\n\
                     }\n",
                );
            }

            Expression::Free => {
                destination.push_str(
                    "// Free\n\
                     delete[] reinterpret_cast<std::uint8_t *>(parameter_stack.pop());\n",
                );
            }

            Expression::DotS => {
                destination.push_str("// DotS\nparameter_stack.debug();\n");
            }

            Expression::Bye => {
                destination.push_str("// Bye\nstd::exit(EXIT_SUCCESS);\n");
            }

            Expression::Define { name, body } => self.compile_define(name, body)?,

            Expression::IfThen { body } => {
                destination.push_str("// IfThen\nif (cell_is_true(parameter_stack.pop())) {\n");
                self.compile_body(body, destination)?;
                destination.push_str("}\n");
            }

            Expression::IfElseThen { if_body, else_body } => {
                destination
                    .push_str("// IfElseThen\nif (cell_is_true(parameter_stack.pop())) {\n");
                self.compile_body(if_body, destination)?;
                destination.push_str("} else {\n");
                self.compile_body(else_body, destination)?;
                destination.push_str("}\n");
            }

            Expression::BeginUntil { body } => {
                destination.push_str("// BeginUntil\ndo {\n");
                self.compile_body(body, destination)?;
                destination.push_str("} while (!cell_is_true(parameter_stack.pop()));\n");
            }

            Expression::BeginWhileRepeat {
                cond_body,
                loop_body,
            } => {
                destination.push_str("// BeginWhileRepeat\n");
                self.compile_body(cond_body, destination)?;
                destination.push_str("while (cell_is_true(parameter_stack.pop())) {\n");
                self.compile_body(loop_body, destination)?;
                self.compile_body(cond_body, destination)?;
                destination.push_str("}\n");
            }

            Expression::BeginAgain { body } => {
                destination.push_str("// BeginAgain\nwhile (true) {\n");
                self.compile_body(body, destination)?;
                destination.push_str("}\n");
            }
        }

        Ok(())
    }
}
