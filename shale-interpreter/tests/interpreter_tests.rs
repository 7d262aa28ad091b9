use shale_interpreter::error::{ErrorKind, RuntimeError};
use shale_interpreter::runtime::Runtime;
use shale_interpreter::value::Value;

fn run(source: &str) -> (Runtime, Result<(), RuntimeError>) {
    let program = shale_parser::parse(source).expect("parsing failed");
    let mut rt = Runtime::new();
    rt.capture_output();
    let result = rt.run_program(&program);
    (rt, result)
}

/// Run a program and return everything it printed.
fn output(source: &str) -> String {
    let (mut rt, result) = run(source);
    if let Err(err) = result {
        panic!("unexpected error: {}", err);
    }
    rt.take_output()
}

/// Run a program and return the error it must raise.
fn error_of(source: &str) -> RuntimeError {
    let (_, result) = run(source);
    result.expect_err("expected the program to fail")
}

/// Run a program ending in an expression statement and return its value.
fn result_of(source: &str) -> Value {
    let (rt, result) = run(source);
    if let Err(err) = result {
        panic!("unexpected error: {}", err);
    }
    rt.last_value.expect("expected a result value")
}

#[test]
fn simple_multi_assign() {
    assert_eq!(output("a, b, c = 1, 2, 3\nprint(a + b + c)"), "6\n");
}

#[test]
fn destructure_from_array() {
    assert_eq!(output("x, y = [10, 20]\nprint(x)\nprint(y)"), "10\n20\n");
}

#[test]
fn pack_into_tuple() {
    assert_eq!(output("t = 1, 2, 3\nprint(len(t))\nprint(t[2])"), "3\n3\n");
}

#[test]
fn pairwise_assign_and_swap() {
    assert_eq!(output("a, b = 1, 2\na, b = b, a\nprint(a)\nprint(b)"), "2\n1\n");
}

#[test]
fn identity_assignment_keeps_bindings() {
    assert_eq!(output("a, b = 1, \"x\"\na, b = a, b\nprint(a)\nprint(b)"), "1\nx\n");
}

#[test]
fn destructure_mismatch_message() {
    let err = error_of("a, b = [1, 2, 3]");
    assert_eq!(err.kind, ErrorKind::IncompatibleType);
    assert_eq!(
        err.message,
        "unpack values size different from left values (expected 2, got 3)"
    );
}

#[test]
fn different_sizes_of_tuples() {
    let err = error_of("a, b = 1, 2, 3");
    assert_eq!(err.kind, ErrorKind::IncompatibleType);
    assert_eq!(err.message, "different size of tuples");
}

#[test]
fn structural_destructure_targets() {
    assert_eq!(output("[a, b] = (1, 2)\nprint(a + b)"), "3\n");
    assert_eq!(output("(a, b) = [4, 5]\nprint(a * b)"), "20\n");
}

#[test]
fn compound_assignments() {
    assert_eq!(output("x = 10\nx += 5\nx *= 2\nprint(x)"), "30\n");
    assert_eq!(output("x = 12\nx %= 5\nprint(x)"), "2\n");
    assert_eq!(output("x = 1\nx <<= 4\nprint(x)"), "16\n");
}

#[test]
fn compound_indexed_update() {
    assert_eq!(output("a = [1, 2, 3]\na[1] += 10\nprint(a[1])"), "12\n");
}

#[test]
fn compound_attribute_update() {
    let source = "
class Counter {
    func __init__(this) { this.total = 0 }
}
c = Counter()
c.total += 41
c.total += 1
print(c.total)
";
    assert_eq!(output(source), "42\n");
}

#[test]
fn compound_on_unbound_name_fails() {
    let err = error_of("missing += 1");
    assert_eq!(err.kind, ErrorKind::SymbolNotFound);
}

#[test]
fn closure_capture_counts() {
    let source = "
func mk() {
    n = 0
    func inc() {
        n = n + 1
        return n
    }
    return inc
}
f = mk()
print(f())
print(f())
print(f())
";
    assert_eq!(output(source), "1\n2\n3\n");
}

#[test]
fn closures_share_their_cells() {
    let source = "
func mk() {
    n = 100
    get = func() { return n }
    bump = func() { n = n + 1 }
    return (get, bump)
}
g, b = mk()
b()
b()
print(g())
";
    assert_eq!(output(source), "102\n");
}

#[test]
fn top_level_locals_are_hidden_from_functions() {
    let err = error_of("hidden = 1\nfunc peek() { return hidden }\nprint(peek())");
    assert_eq!(err.kind, ErrorKind::SymbolNotFound);
}

#[test]
fn global_assignment_is_visible_and_writable() {
    let source = "
global count = 0
func bump() { count = count + 1 }
bump()
bump()
print(count)
";
    assert_eq!(output(source), "2\n");
}

#[test]
fn short_circuit_returns_operand() {
    assert_eq!(output("print(0 or \"x\")"), "x\n");
    assert_eq!(output("print(1 and \"y\")"), "y\n");
    assert_eq!(output("print(nil and 1)"), "nil\n");
    // The right side must not be evaluated at all.
    assert_eq!(output("print(1 or missing)"), "1\n");
}

#[test]
fn arithmetic_and_coercion() {
    assert_eq!(output("print(7 / 2)"), "3\n");
    assert_eq!(output("print(7.0 / 2)"), "3.5\n");
    assert_eq!(output("print(2 ** 10)"), "1024\n");
    assert_eq!(output("print(7 % 3)"), "1\n");
    assert_eq!(output("print(6 & 3, 6 | 3, 6 ^ 3)"), "2 7 5\n");
}

#[test]
fn division_by_zero() {
    assert_eq!(error_of("print(1 / 0)").kind, ErrorKind::ZeroDiv);
    assert_eq!(error_of("print(1 % 0)").kind, ErrorKind::ZeroDiv);
}

#[test]
fn int_string_round_trip() {
    assert!(matches!(result_of("int(\"42\")"), Value::Integer(42)));
    assert_eq!(output("print(str(42))"), "42\n");
    assert_eq!(output("print(int(str(42)) + 0)"), "42\n");
}

#[test]
fn string_ops() {
    assert_eq!(output("print(\"foo\" + \"bar\")"), "foobar\n");
    assert_eq!(output("print(\"ab\" * 3)"), "ababab\n");
    assert_eq!(output("print(\"hello\".upper())"), "HELLO\n");
    assert_eq!(output("print(\"a,b,c\".split(\",\")[1])"), "b\n");
    assert_eq!(output("print(len(\"hello\"))"), "5\n");
    assert_eq!(output("print(\"hello\"[1])"), "e\n");
    assert_eq!(output("print(\"hello\"[1:4])"), "ell\n");
}

#[test]
fn array_methods_and_slices() {
    assert_eq!(output("a = [3, 1, 2]\na.sort()\nprint(a)"), "[1, 2, 3]\n");
    assert_eq!(output("a = [1, 2]\na.append(3)\nprint(a)"), "[1, 2, 3]\n");
    assert_eq!(output("a = [1, 2, 3, 4]\nprint(a[1:3])"), "[2, 3]\n");
    assert_eq!(output("a = [1, 2, 3, 4]\nprint(a[:2])"), "[1, 2]\n");
    assert_eq!(output("a = [1, 2, 3, 4]\nprint(a[-1])"), "4\n");
    assert_eq!(output("a = [\"b\", \"c\"]\nprint(a.join(\"-\"))"), "b-c\n");
}

#[test]
fn out_of_range_indexing() {
    assert_eq!(error_of("a = [1]\nprint(a[3])").kind, ErrorKind::OutOfRange);
}

#[test]
fn map_and_set_values() {
    assert_eq!(
        output("m = {\"a\": 1, \"b\": 2}\nprint(m[\"b\"])\nprint(m.keys())"),
        "2\n[a, b]\n"
    );
    assert_eq!(
        output("m = {}\nm[\"k\"] = 10\nm[\"k\"] += 1\nprint(m[\"k\"])"),
        "11\n"
    );
    assert_eq!(output("s = %{1, 2, 2, 3}\nprint(len(s))"), "3\n");
    assert_eq!(
        output("s = %{1, 2} | %{2, 3}\nprint(len(s))"),
        "3\n"
    );
}

#[test]
fn missing_map_key() {
    assert_eq!(
        error_of("m = {\"a\": 1}\nprint(m[\"b\"])").kind,
        ErrorKind::KeyNotFound
    );
}

#[test]
fn unhashable_map_key() {
    assert_eq!(
        error_of("m = {}\nm[[1, 2]] = 3").kind,
        ErrorKind::IncompatibleType
    );
}

#[test]
fn map_iteration_destructures_entries() {
    let source = "
m = {\"a\": 1, \"b\": 2}
for k, v in m {
    print(k, v)
}
";
    assert_eq!(output(source), "a 1\nb 2\n");
}

#[test]
fn while_with_break_and_continue() {
    let source = "
i = 0
while true {
    i = i + 1
    if i == 3 { continue }
    if i > 5 { break }
    print(i)
}
";
    assert_eq!(output(source), "1\n2\n4\n5\n");
}

#[test]
fn for_over_range() {
    assert_eq!(output("for i in range(3) { print(i) }"), "0\n1\n2\n");
    assert_eq!(output("for i in range(4, 0, -2) { print(i) }"), "4\n2\n");
}

#[test]
fn for_over_non_iterable() {
    let err = error_of("for x in 5 { print(x) }");
    assert_eq!(err.kind, ErrorKind::IncompatibleType);
}

#[test]
fn for_loop_tuple_pattern_mismatch() {
    let err = error_of("for a, b in [1, 2] { print(a) }");
    assert_eq!(err.kind, ErrorKind::IncompatibleType);
}

#[test]
fn switch_statement() {
    let source = "
func pick(x) {
    switch x {
        case 1, 2 { return \"low\" }
        case 3 { return \"mid\" }
        default { return \"high\" }
    }
}
print(pick(1))
print(pick(3))
print(pick(9))
";
    assert_eq!(output(source), "low\nmid\nhigh\n");
}

#[test]
fn try_catch_and_throw() {
    let source = "
try {
    throw \"boom\"
    print(\"unreached\")
} catch err {
    print(\"caught:\", err)
}
print(\"after\")
";
    assert_eq!(output(source), "caught: boom\nafter\n");
}

#[test]
fn try_catches_runtime_errors() {
    let source = "
try {
    x = 1 / 0
} catch err {
    print(err)
}
";
    assert_eq!(output(source), "division by zero\n");
}

#[test]
fn uncaught_throw_unwinds() {
    let err = error_of("throw \"boom\"");
    assert_eq!(err.kind, ErrorKind::Custom);
    assert!(matches!(err.payload, Some(Value::String(_))));
}

#[test]
fn error_trace_records_positions() {
    let err = error_of("x = 1\ny = missing");
    assert_eq!(err.kind, ErrorKind::SymbolNotFound);
    assert!(!err.trace.is_empty());
    assert_eq!(err.trace[0].line, 2);
}

#[test]
fn classes_and_methods() {
    let source = "
class Point {
    func __init__(this, x, y) {
        this.x = x
        this.y = y
    }
    func norm2(this) {
        return this.x * this.x + this.y * this.y
    }
}
p = Point(3, 4)
print(p.norm2())
print(p.x)
";
    assert_eq!(output(source), "25\n3\n");
}

#[test]
fn class_inheritance_and_attrs() {
    let source = "
class Animal {
    kind = \"animal\"
    func speak(this) { return \"...\" }
}
class Dog(Animal) {
    func speak(this) { return \"woof\" }
}
d = Dog()
print(d.speak())
print(d.kind)
";
    assert_eq!(output(source), "woof\nanimal\n");
}

#[test]
fn operator_and_protocol_methods() {
    let source = "
class Vec {
    func __init__(this, x) { this.x = x }
    func __add__(this, other) { return Vec(this.x + other.x) }
    func __eq__(this, other) { return this.x == other.x }
    func __str__(this) { return \"Vec(\" + str(this.x) + \")\" }
}
a = Vec(1)
b = Vec(2)
print(a + b)
print(a == Vec(1))
";
    assert_eq!(output(source), "Vec(3)\ntrue\n");
}

#[test]
fn callable_instances() {
    let source = "
class Adder {
    func __init__(this, n) { this.n = n }
    func __call__(this, x) { return x + this.n }
}
add5 = Adder(5)
print(add5(37))
";
    assert_eq!(output(source), "42\n");
}

#[test]
fn custom_iteration_protocol() {
    let source = "
class Down {
    func __init__(this, n) { this.n = n }
    func __has_next__(this) { return this.n > 0 }
    func __next__(this) {
        this.n = this.n - 1
        return this.n + 1
    }
}
for x in Down(3) { print(x) }
";
    assert_eq!(output(source), "3\n2\n1\n");
}

#[test]
fn has_next_must_answer_bool() {
    let source = "
class Bad {
    func __has_next__(this) { return 1 }
    func __next__(this) { return 1 }
}
for x in Bad() { print(x) }
";
    let err = error_of(source);
    assert_eq!(err.kind, ErrorKind::IncompatibleType);
    assert_eq!(err.message, "expect bool from __has_next__");
}

#[test]
fn unknown_attribute() {
    let source = "
class Empty { }
e = Empty()
print(e.missing)
";
    assert_eq!(error_of(source).kind, ErrorKind::IncompatibleType);
}

#[test]
fn function_defaults_and_variadic() {
    let source = "
func greet(name, greeting = \"hello\") {
    return greeting + \" \" + name
}
print(greet(\"world\"))
print(greet(\"moon\", \"bye\"))
func gather(first, rest...) {
    return len(rest)
}
print(gather(1))
print(gather(1, 2, 3))
";
    assert_eq!(output(source), "hello world\nbye moon\n0\n2\n");
}

#[test]
fn wrong_arity_reports_func_params() {
    let err = error_of("func f(a, b) { return a }\nf(1)");
    assert_eq!(err.kind, ErrorKind::FuncParams);
    let err = error_of("func f(a) { return a }\nf(1, 2)");
    assert_eq!(err.kind, ErrorKind::FuncParams);
}

#[test]
fn lambdas_are_values() {
    let source = "
double = func(x) { return x * 2 }
print(double(21))
apply = func(f, x) { return f(x) }
print(apply(double, 5))
";
    assert_eq!(output(source), "42\n10\n");
}

#[test]
fn returning_nothing_yields_nil() {
    assert_eq!(output("func f() { return }\nprint(f())"), "nil\n");
    assert_eq!(output("func g() { x = 1 }\nprint(g())"), "nil\n");
}

#[test]
fn block_scopes_do_not_leak_at_top_level() {
    let err = error_of("if true { inner = 1 }\nprint(inner)");
    assert_eq!(err.kind, ErrorKind::SymbolNotFound);
}

#[test]
fn function_bodies_use_function_scoping() {
    let source = "
func f() {
    if true { x = 1 }
    return x
}
print(f())
";
    assert_eq!(output(source), "1\n");
}

#[test]
fn type_objects_and_type_of() {
    assert_eq!(output("print(type(42))"), "[type int]\n");
    assert_eq!(output("print(type(\"s\") == str)"), "true\n");
    assert_eq!(output("print(bool([]))"), "false\n");
    assert_eq!(output("print(array(\"abc\"))"), "[a, b, c]\n");
    assert_eq!(output("print(tuple([1, 2]))"), "(1, 2)\n");
}

#[test]
fn assert_failures() {
    let err = error_of("assert(1 == 2, \"math is broken\")");
    assert_eq!(err.kind, ErrorKind::Assert);
    assert_eq!(err.message, "math is broken");
    assert_eq!(output("assert(true)\nprint(\"ok\")"), "ok\n");
}

#[test]
fn import_exposes_module_bindings() {
    let dir = std::env::temp_dir().join("shale-import-test");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("util.shl"),
        "global answer = 42\nfunc double(x) { return x * 2 }\n",
    )
    .unwrap();

    let program = shale_parser::parse(
        "import \"util.shl\" as util\nprint(util.answer)\nprint(util.double(21))",
    )
    .unwrap();
    let mut rt = Runtime::new();
    rt.capture_output();
    rt.base_dir = dir;
    rt.run_program(&program).unwrap();
    assert_eq!(rt.take_output(), "42\n42\n");
}

#[test]
fn missing_import_is_an_import_error() {
    let err = error_of("import \"no/such/module.shl\" as nope");
    assert_eq!(err.kind, ErrorKind::ImportError);
}

#[test]
fn iterators_keep_their_source_alive() {
    let source = "
a = [1, 2, 3]
for x in a {
    a = nil
    print(x)
}
";
    assert_eq!(output(source), "1\n2\n3\n");
}
