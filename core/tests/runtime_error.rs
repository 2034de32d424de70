//! Integration tests for WAT programs that compile cleanly but fail once
//! the emulator runs them.

use wat::error::RuntimeError;
use wat::{compile, compile_and_run, CompileOrRuntimeError, NullIncludes};

fn expect_runtime_error(src: &str) -> RuntimeError {
    match compile_and_run(src, "t.wat", &NullIncludes, vec![]) {
        Err(CompileOrRuntimeError::Runtime(e)) => e,
        Err(CompileOrRuntimeError::Compile(e)) => {
            panic!("expected a runtime error, got a compile error instead: {}", e)
        }
        Ok(_) => panic!("expected a runtime error, but the program ran to completion"),
    }
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let err = expect_runtime_error(
        "func main(): void { var x: int = 1 / 0; }",
    );
    assert!(matches!(err, RuntimeError::DivideByZero));
}

#[test]
fn modulo_by_zero_is_a_runtime_error() {
    let err = expect_runtime_error(
        "func main(): void { var x: int = 1 % 0; }",
    );
    assert!(matches!(err, RuntimeError::DivideByZero));
}

#[test]
fn infinite_loop_exceeds_the_cycle_limit() {
    let err = expect_runtime_error(
        "func main(): void { while (true) { } }",
    );
    assert!(matches!(err, RuntimeError::TooManyCycles));
}

#[test]
fn unbounded_recursion_is_a_runtime_error() {
    // Every call frame grows the stack, so unbounded recursion either runs
    // the stack pointer off the bottom of the memory image or, if the
    // frames are small enough to avoid that, eventually trips the cycle
    // limit instead. Either is a legitimate way for this program to fail.
    let err = expect_runtime_error(
        "func loop(n: int): int { return loop(n + 1); } \
         func main(): void { var r: int = loop(0); }",
    );
    assert!(matches!(
        err,
        RuntimeError::TooManyCycles | RuntimeError::OutOfBoundsAccess { .. }
    ));
}

#[test]
fn a_clean_program_does_not_raise_a_runtime_error() {
    let result = compile("func main(): void { return; }", "t.wat", &NullIncludes);
    assert!(result.is_ok());
}
