use std::io::Cursor;

use test_case::test_case;

use storth::runtime::{
    error::{ErrorKind, Result},
    evaluator::{Evaluator, Flow},
};

/// Everything observable about a finished session: how evaluation ended, the shutdown check, the
/// final parameter stack, and the bytes written to the output sink.
struct Session {
    flow: Result<Flow>,
    finish: Result<()>,
    stack: Vec<i64>,
    output: Vec<u8>,
}

fn run_session(source: &str, input: &[u8], init_stack: &[i64]) -> Session {
    let mut input_reader = Cursor::new(input.to_vec());
    let mut output = Vec::new();

    let (flow, finish, stack) = {
        let mut evaluator = Evaluator::new(&mut input_reader, &mut output);

        for &cell in init_stack {
            evaluator.push(cell);
        }

        let flow = evaluator.eval_source("<test>", source);
        let finish = evaluator.finish();
        let stack = evaluator.parameter_stack().cells().to_vec();

        (flow, finish, stack)
    };

    Session {
        flow,
        finish,
        stack,
        output,
    }
}

fn eval_and_stack(source: &str, init_stack: &[i64]) -> Result<Vec<i64>> {
    let session = run_session(source, b"", init_stack);

    session.flow.map(|_| session.stack)
}

fn eval_and_output(source: &str, input: &[u8]) -> Result<Vec<u8>> {
    let session = run_session(source, input, &[]);

    session.flow.map(|_| session.output)
}

// --- Literals ---

#[test_case("0", &[], &[0]; "zero")]
#[test_case("42", &[], &[42]; "number")]
#[test_case("-5", &[], &[-5]; "negative number")]
#[test_case("'A'", &[], &[65]; "char literal")]
#[test_case("1 2 3", &[], &[1, 2, 3]; "numbers in order")]
fn literals(source: &str, init: &[i64], expected: &[i64]) {
    assert_eq!(eval_and_stack(source, init).unwrap(), expected);
}

// --- Arithmetic ---

#[test_case("+", &[2, 2], &[4]; "simple add")]
#[test_case("-", &[5, 2], &[3]; "simple sub")]
#[test_case("*", &[3, 4], &[12]; "simple mul")]
#[test_case("/", &[12, 3], &[4]; "simple div")]
#[test_case("/", &[-7, 2], &[-3]; "div truncates toward zero")]
#[test_case("rem", &[13, 5], &[3]; "rem of positives")]
#[test_case("rem", &[-13, 5], &[-3]; "rem keeps the dividend sign")]
#[test_case("mod", &[13, 5], &[3]; "mod of positives")]
#[test_case("mod", &[-13, 5], &[2]; "mod is non-negative")]
#[test_case("invert", &[0], &[-1]; "invert zero")]
#[test_case("invert", &[-1], &[0]; "invert all bits")]
#[test_case("and", &[6, 3], &[2]; "bitwise and")]
#[test_case("or", &[6, 3], &[7]; "bitwise or")]
fn arithmetic(source: &str, init: &[i64], expected: &[i64]) {
    assert_eq!(eval_and_stack(source, init).unwrap(), expected);
}

#[test]
fn add_wraps_instead_of_aborting() {
    let result = eval_and_stack("1 +", &[i64::MAX]).unwrap();

    assert_eq!(result, vec![i64::MIN]);
}

// --- Comparisons ---

#[test_case("<", &[3, 4], &[-1]; "less is true")]
#[test_case("<", &[4, 3], &[0]; "less is false")]
#[test_case(">", &[4, 3], &[-1]; "more is true")]
#[test_case(">", &[3, 4], &[0]; "more is false")]
#[test_case("=", &[5, 5], &[-1]; "equal is true")]
#[test_case("=", &[5, 6], &[0]; "equal is false")]
#[test_case("<>", &[5, 6], &[-1]; "not equal is true")]
#[test_case("<>", &[5, 5], &[0]; "not equal is false")]
fn comparisons(source: &str, init: &[i64], expected: &[i64]) {
    assert_eq!(eval_and_stack(source, init).unwrap(), expected);
}

// --- Stack shuffles ---

#[test_case("dup", &[42], &[42, 42]; "dup")]
#[test_case("drop", &[1, 2], &[1]; "drop")]
#[test_case("swap", &[1, 2], &[2, 1]; "swap")]
#[test_case("over", &[1, 2], &[1, 2, 1]; "over")]
#[test_case("rot", &[1, 2, 3], &[2, 3, 1]; "rot")]
fn stack_shuffles(source: &str, init: &[i64], expected: &[i64]) {
    assert_eq!(eval_and_stack(source, init).unwrap(), expected);
}

#[test]
fn dup_then_drop_restores_the_stack() {
    assert_eq!(eval_and_stack("dup drop", &[7, 9]).unwrap(), vec![7, 9]);
}

// --- Return stack ---

#[test_case("1 >r 2 r> +", &[3]; "to r and back")]
#[test_case("1 >r r@ r> +", &[2]; "r fetch copies without removing")]
#[test_case("1 >r 2 >r r> r>", &[2, 1]; "return stack is lifo")]
fn return_stack_transfer(source: &str, expected: &[i64]) {
    let session = run_session(source, b"", &[]);

    assert_eq!(session.flow.unwrap(), Flow::Continue);
    assert_eq!(session.stack, expected);
    session.finish.unwrap();
}

// --- Definitions and words ---

#[test]
fn defined_word_executes_its_body() {
    let result = eval_and_stack(": square dup * ; 5 square", &[]).unwrap();

    assert_eq!(result, vec![25]);
}

#[test]
fn definitions_see_earlier_definitions() {
    let result = eval_and_stack(": double 2 * ; : quad double double ; 3 quad", &[]).unwrap();

    assert_eq!(result, vec![12]);
}

#[test]
fn words_can_recurse() {
    let result = eval_and_stack(
        ": countdown dup 0 > if dup 1 - countdown then ; 3 countdown",
        &[],
    )
    .unwrap();

    assert_eq!(result, vec![3, 2, 1, 0]);
}

#[test]
fn each_word_call_gets_a_fresh_return_stack() {
    // The outer word's value stays on its own return stack frame while the inner word runs.
    let result = eval_and_stack(
        ": inner 10 >r r> drop ; : outer 1 >r inner r> ; outer",
        &[],
    )
    .unwrap();

    assert_eq!(result, vec![1]);
}

#[test]
fn unknown_word_is_fatal() {
    let error = eval_and_stack("nope", &[]).unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::UnknownWord(name) if name == "nope"));
}

#[test]
fn redefinition_is_fatal() {
    let error = eval_and_stack(": a 1 ; : a 2 ;", &[]).unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::Redefinition(name) if name == "a"));
}

#[test]
fn word_leaving_values_on_its_return_stack_is_fatal() {
    let error = eval_and_stack(": w 1 >r ; w", &[]).unwrap_err();

    assert_eq!(*error.kind(), ErrorKind::ReturnStackImbalance);
}

// --- Control flow ---

#[test_case("1 if 42 then", &[42]; "if takes the branch")]
#[test_case("0 if 42 then", &[]; "if skips the branch")]
#[test_case("7 if 42 then", &[42]; "any non-zero is true")]
#[test_case("1 if 1 else 2 then", &[1]; "else takes the if branch")]
#[test_case("0 if 1 else 2 then", &[2]; "else takes the else branch")]
#[test_case("5 begin dup 0 > while 1 - repeat", &[0]; "while loop runs to done")]
#[test_case("0 begin dup 0 > while 1 - repeat", &[0]; "while loop can run zero times")]
#[test_case("0 begin 1 + dup 3 = until", &[3]; "until loop runs the body first")]
fn control_flow(source: &str, expected: &[i64]) {
    assert_eq!(eval_and_stack(source, &[]).unwrap(), expected);
}

// --- Errors ---

#[test_case("+", &[]; "add on empty stack")]
#[test_case("+", &[1]; "add on one value")]
#[test_case("drop", &[]; "drop on empty stack")]
#[test_case("r>", &[]; "r from on empty return stack")]
fn stack_underflow_is_fatal(source: &str, init: &[i64]) {
    let error = eval_and_stack(source, init).unwrap_err();

    assert_eq!(*error.kind(), ErrorKind::StackUnderflow);
}

#[test_case("/"; "div by zero")]
#[test_case("rem"; "rem by zero")]
#[test_case("mod"; "mod by zero")]
fn zero_divisor_is_fatal(source: &str) {
    let error = eval_and_stack(source, &[1, 0]).unwrap_err();

    assert_eq!(*error.kind(), ErrorKind::DivideByZero);
}

// --- I/O ---

#[test]
fn emit_writes_the_low_byte() {
    // 321 & 0xff == 65.
    assert_eq!(eval_and_output("321 emit", b"").unwrap(), b"A");
}

#[test]
fn key_reads_bytes_then_minus_one() {
    let result = eval_and_stack_with_input("key key key", b"AB");

    assert_eq!(result.unwrap(), vec![65, 66, -1]);
}

fn eval_and_stack_with_input(source: &str, input: &[u8]) -> Result<Vec<i64>> {
    let session = run_session(source, input, &[]);

    session.flow.map(|_| session.stack)
}

#[test]
fn dot_s_reports_without_consuming() {
    let session = run_session("1 2 .s", b"", &[]);

    session.flow.unwrap();
    assert_eq!(session.output, b"<2> 1 2 ");
    assert_eq!(session.stack, vec![1, 2]);
}

// --- Strings and the heap ---

#[test]
fn string_literal_pushes_address_and_length() {
    let session = run_session("\"AB\" drop dup c@ emit dup 1 + c@ emit free", b"", &[]);

    session.flow.unwrap();
    assert_eq!(session.output, b"AB");
    session.finish.unwrap();
}

#[test]
fn alloc_store_fetch_free_round_trips() {
    let session = run_session("8 alloc dup -42 swap ! dup @ swap free", b"", &[]);

    session.flow.unwrap();
    assert_eq!(session.stack, vec![-42]);
    session.finish.unwrap();
}

#[test]
fn byte_fetch_is_zero_extended() {
    let session = run_session("1 alloc dup 255 swap c! dup c@ swap free", b"", &[]);

    session.flow.unwrap();
    assert_eq!(session.stack, vec![255]);
    session.finish.unwrap();
}

#[test_case("0 alloc"; "zero alloc")]
#[test_case("-8 alloc"; "negative alloc")]
fn non_positive_alloc_is_fatal(source: &str) {
    let error = eval_and_stack(source, &[]).unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::InvalidAlloc(_)));
}

#[test]
fn free_of_unallocated_address_is_fatal() {
    let error = eval_and_stack("12345 free", &[]).unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::InvalidFree(_)));
}

#[test]
fn double_free_is_fatal() {
    let error = eval_and_stack("8 alloc dup free free", &[]).unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::InvalidFree(_)));
}

// --- Shutdown invariants ---

#[test]
fn leaked_allocation_fails_the_shutdown_check() {
    let session = run_session("8 alloc drop", b"", &[]);

    session.flow.unwrap();
    let error = session.finish.unwrap_err();

    assert_eq!(*error.kind(), ErrorKind::LeakAtShutdown(1));
}

#[test]
fn value_left_on_the_return_stack_fails_the_shutdown_check() {
    let session = run_session("1 >r", b"", &[]);

    session.flow.unwrap();
    let error = session.finish.unwrap_err();

    assert_eq!(*error.kind(), ErrorKind::ReturnStackImbalance);
}

#[test]
fn clean_session_passes_the_shutdown_check() {
    let session = run_session("8 alloc free 1 >r r> drop", b"", &[]);

    session.flow.unwrap();
    session.finish.unwrap();
}

// --- Bye ---

#[test]
fn bye_stops_evaluation_immediately() {
    let session = run_session("1 2 bye 3", b"", &[]);

    assert_eq!(session.flow.unwrap(), Flow::Bye);
    assert_eq!(session.stack, vec![1, 2]);
}

#[test]
fn bye_unwinds_out_of_words_and_loops() {
    let session = run_session(": quit bye ; 0 begin 1 + dup 3 = if quit then again", b"", &[]);

    assert_eq!(session.flow.unwrap(), Flow::Bye);
    assert_eq!(session.stack, vec![3]);
}

#[test]
fn bye_skips_the_return_stack_check_of_the_word_it_unwinds() {
    let session = run_session(": quit 1 >r bye ; quit", b"", &[]);

    assert_eq!(session.flow.unwrap(), Flow::Bye);
}

// --- Prelude ---

#[test]
fn prelude_prints_numbers_and_strings() {
    let prelude = include_str!("../core.forth");
    let source = format!("{}\n42 . -7 . \"hi\" print cr", prelude);
    let session = run_session(&source, b"", &[]);

    session.flow.unwrap();
    assert_eq!(session.output, b"42 -7 hi\n");
    session.finish.unwrap();
}

#[test]
fn prelude_stack_words() {
    let prelude = include_str!("../core.forth");
    let source = format!("{}\n-5 abs 3 7 max 3 7 min", prelude);
    let session = run_session(&source, b"", &[]);

    session.flow.unwrap();
    assert_eq!(session.stack, vec![5, 7, 3]);
    session.finish.unwrap();
}

// --- End-to-end scenarios ---

#[test]
fn scenario_add_and_emit() {
    assert_eq!(eval_and_output("1 2 + emit", b"").unwrap(), &[0x03]);
}

#[test]
fn scenario_square_word() {
    assert_eq!(
        eval_and_output(": square dup * ; 5 square emit", b"").unwrap(),
        &[25]
    );
}

#[test_case("0 if 'A' emit else 'B' emit then", b"B"; "false takes else")]
#[test_case("1 if 'A' emit else 'B' emit then", b"A"; "true takes if")]
fn scenario_if_else(source: &str, expected: &[u8]) {
    assert_eq!(eval_and_output(source, b"").unwrap(), expected);
}

#[test]
fn scenario_count_loop() {
    let output =
        eval_and_output(": count 0 begin dup emit 1 + dup 3 = until drop ; count", b"").unwrap();

    assert_eq!(output, &[0, 1, 2]);
}

#[test]
fn scenario_alloc_store_emit_free() {
    let session = run_session("8 alloc dup 65 swap c! dup c@ emit free", b"", &[]);

    session.flow.unwrap();
    assert_eq!(session.output, b"A");
    session.finish.unwrap();
}

#[test]
fn scenario_return_stack_round_trip() {
    let session = run_session("1 >r 2 r> + emit", b"", &[]);

    session.flow.unwrap();
    assert_eq!(session.output, &[3]);
    session.finish.unwrap();
}
