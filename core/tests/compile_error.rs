//! Integration tests for WAT that expect a compile-time failure (syntax,
//! symbol, type, or assembly error). Every program here should fail before
//! the emulator ever runs.

use wat::{compile, Error, NullIncludes};

fn expect_error(src: &str) -> Error {
    compile(src, "t.wat", &NullIncludes).unwrap_err()
}

#[test]
fn missing_main_is_a_compile_error() {
    let err = expect_error("func helper(): void { }");
    assert!(matches!(err, Error::Compile(_)));
}

#[test]
fn undeclared_struct_left_unfilled_is_a_compile_error() {
    let err = expect_error(
        "struct Point;
         func main(): void { var p: *Point; }",
    );
    assert!(matches!(err, Error::Type(_)));
}

#[test]
fn unterminated_function_signature_is_a_syntax_error() {
    let err = expect_error("func main(");
    assert!(matches!(err, Error::Syntax(_)));
}

#[test]
fn duplicate_global_is_a_symbol_error() {
    let err = expect_error("var x: int; var x: int; func main(): void { }");
    assert!(matches!(err, Error::Symbol(_)));
}

#[test]
fn duplicate_local_is_a_symbol_error() {
    let err = expect_error(
        "func main(): void { var x: int; var x: int; }",
    );
    assert!(matches!(err, Error::Symbol(_)));
}

#[test]
fn duplicate_function_is_a_symbol_error() {
    let err = expect_error(
        "func f(): void { } func f(): void { } func main(): void { }",
    );
    assert!(matches!(err, Error::Symbol(_)));
}

#[test]
fn assigning_mismatched_types_is_a_type_error() {
    let err = expect_error("func main(): void { var x: int; x = true; }");
    assert!(matches!(err, Error::Type(_)));
}

#[test]
fn non_void_pointer_assignment_is_still_a_type_error() {
    // *void -> *T is allowed (void-pointer weakening), but *T -> *U (two
    // distinct non-void pointer types) is not.
    let err = expect_error(
        "func main(): void { \
            var p: *int; var c: *char; \
            p = c; \
         }",
    );
    assert!(matches!(err, Error::Type(_)));
}

#[test]
fn if_condition_must_be_bool() {
    let err = expect_error("func main(): void { if (1) { } }");
    assert!(matches!(err, Error::Type(_)));
}

#[test]
fn wrong_argument_count_is_a_type_error() {
    let err = expect_error(
        "func f(a: int): void { } func main(): void { f(); }",
    );
    assert!(matches!(err, Error::Type(_)));
}

#[test]
fn return_outside_function_return_type_mismatch() {
    let err = expect_error(
        "func f(): int { return; } func main(): void { }",
    );
    assert!(matches!(err, Error::Type(_)));
}

#[test]
fn calling_an_undefined_function_is_a_type_error() {
    let err = expect_error("func main(): void { nonexistent(); }");
    assert!(matches!(err, Error::Type(_)));
}

#[test]
fn referencing_an_undeclared_variable_is_a_type_error() {
    let err = expect_error("func main(): void { var y: int = x; }");
    assert!(matches!(err, Error::Type(_)));
}

#[test]
fn bad_inline_assembly_register_is_a_compile_error() {
    let err = expect_error(
        r#"func main(): void { asm { add $1, $2, $40 } }"#,
    );
    assert!(matches!(err, Error::Compile(_)));
}

#[test]
fn missing_include_is_a_syntax_error() {
    let err = expect_error("#include \"nope.wat\"\nfunc main(): void { }");
    assert!(matches!(err, Error::Syntax(_)));
}
