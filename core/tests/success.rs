//! Integration tests for WAT that expect successful compilation and
//! execution. Output is observed the same way a real program would: through
//! the memory-mapped `putc`/`getc` addresses, never through register or
//! memory internals the language gives no other way to read.

use std::collections::HashMap;
use wat::parser::IncludeResolver;
use wat::{compile_and_run, NullIncludes, RunOutcome};

fn execute_expect_success(source: &str, input: &[u8]) -> RunOutcome {
    compile_and_run(source, "t.wat", &NullIncludes, input.to_vec())
        .unwrap_or_else(|e| panic!("expected success, got: {}", e))
}

#[test]
fn arithmetic_expression() {
    let source = r#"
        func main(): void {
            var out: *int;
            out = cast(*int) 0xFFFF000C;
            *out = 2 + 3 * 4;
        }
    "#;
    let outcome = execute_expect_success(source, &[]);
    assert_eq!(outcome.output, vec![14]);
}

#[test]
fn string_assignment_and_putc_loop() {
    let source = r#"
        func main(): void {
            var s: *char;
            s = "hi";
            var out: *char;
            out = cast(*char) 0xFFFF000C;
            var i: int = 0;
            while (*cast(*char)(s + i) != 0) {
                *out = *cast(*char)(s + i);
                i = i + 1;
            }
        }
    "#;
    let outcome = execute_expect_success(source, &[]);
    assert_eq!(outcome.output, b"hi");
}

#[test]
fn recursive_factorial_printed_digit_by_digit() {
    let source = r#"
        func fact(n: int): int {
            if (n <= 1) { return 1; }
            return n * fact(n - 1);
        }
        func print_digits(n: int): void {
            if (n >= 10) {
                print_digits(n / 10);
            }
            var out: *char;
            out = cast(*char) 0xFFFF000C;
            *out = cast(char) (n % 10 + 48);
        }
        func main(): void {
            print_digits(fact(5));
        }
    "#;
    let outcome = execute_expect_success(source, &[]);
    assert_eq!(outcome.output, b"120");
}

#[test]
fn getc_bytes_printed_in_reverse() {
    let source = r#"
        func main(): void {
            var in_addr: *int;
            in_addr = cast(*int) 0xFFFF0004;
            var out_addr: *int;
            out_addr = cast(*int) 0xFFFF000C;
            var buf: *int;
            buf = [0, 0, 0];
            var i: int = 0;
            while (i < 3) {
                *cast(*int)(buf + i) = *in_addr;
                i = i + 1;
            }
            i = 2;
            while (i >= 0) {
                *out_addr = *cast(*int)(buf + i);
                i = i - 1;
            }
        }
    "#;
    let outcome = execute_expect_success(source, b"abc");
    assert_eq!(outcome.output, b"cba");
}

#[test]
fn pointer_store_through_a_cast_address() {
    let source = r#"
        func main(): void {
            var x: int;
            x = 0;
            var p: *int;
            p = cast(*int) &x;
            *p = 7;
            var out: *int;
            out = cast(*int) 0xFFFF000C;
            *out = x;
        }
    "#;
    let outcome = execute_expect_success(source, &[]);
    assert_eq!(outcome.output, vec![7]);
}

struct MapResolver(HashMap<&'static str, &'static str>);

impl IncludeResolver for MapResolver {
    fn resolve(&self, path: &str) -> Result<String, String> {
        self.0
            .get(path)
            .map(|s| s.to_string())
            .ok_or_else(|| format!("no such file `{}`", path))
    }
}

#[test]
fn include_cycle_compiles_without_looping() {
    let mut files = HashMap::new();
    files.insert("a.wat", "#include \"b.wat\"\nvar from_a: int;\n");
    files.insert("b.wat", "#include \"a.wat\"\nvar from_b: int;\n");
    let resolver = MapResolver(files);
    let source = "#include \"a.wat\"\nfunc main(): void { return; }";

    let result = compile_and_run(source, "t.wat", &resolver, vec![]);
    assert!(result.is_ok());
}
