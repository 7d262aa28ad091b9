//! Tests for the external-command subsystem. They shell out to the usual
//! coreutils, so they are unix-only.
#![cfg(unix)]

use shale_interpreter::error::RuntimeError;
use shale_interpreter::runtime::Runtime;

fn run(source: &str) -> (Runtime, Result<(), RuntimeError>) {
    let program = shale_parser::parse(source).expect("parsing failed");
    let mut rt = Runtime::new();
    rt.capture_output();
    let result = rt.run_program(&program);
    (rt, result)
}

fn output(source: &str) -> String {
    let (mut rt, result) = run(source);
    if let Err(err) = result {
        panic!("unexpected error: {}", err);
    }
    rt.take_output()
}

#[test]
fn capture_stdout_exactly() {
    // No newline is added to what the pipe carried.
    assert_eq!(output("r = $(printf abc)\nprint(r.out() == \"abc\")"), "true\n");
    assert_eq!(output("r = $(echo hi)\nprint(r.out() == \"hi\\n\")"), "true\n");
}

#[test]
fn cmd_status_and_truthiness() {
    assert_eq!(output("r = $(true)\nprint(r.status())"), "0\n");
    assert_eq!(output("r = $(false)\nprint(r.status() != 0)"), "true\n");
    assert_eq!(output("if $(true) { print(\"yes\") }"), "yes\n");
    assert_eq!(output("if $(false) { } else { print(\"no\") }"), "no\n");
}

#[test]
fn pipeline_words_iteration() {
    let source = "
r = $(echo \"a b c\" | tr \" \" \"\\n\")
for w in r {
    print(w)
}
";
    assert_eq!(output(source), "a\nb\nc\n");
}

#[test]
fn cmd_iteration_coalesces_delimiters() {
    assert_eq!(
        output("r = $(printf \"a  b\\n\\nc\\n\")\nfor w in r { print(w) }"),
        "a\nb\nc\n"
    );
}

#[test]
fn custom_delimiter() {
    let source = "
r = $(printf \"a:b:c\").delim(\":\")
for w in r {
    print(w)
}
";
    assert_eq!(output(source), "a\nb\nc\n");
}

#[test]
fn array_coercion_splits_words() {
    assert_eq!(
        output("r = $(echo \"x y\")\na = array(r)\nprint(len(a))\nprint(a[1])"),
        "2\ny\n"
    );
}

#[test]
fn command_statement_sets_exit_status() {
    let (rt, result) = run("sh -c \"exit 0\"");
    result.unwrap();
    assert_eq!(rt.exit_code(), 0);
    assert!(rt.last_stmt_was_cmd);

    let (rt, result) = run("sh -c \"exit 7\"");
    result.unwrap();
    assert_eq!(rt.exit_code(), 7);

    // A non-command statement after the command resets the exit code.
    let (rt, result) = run("sh -c \"exit 7\"\nx = 1");
    result.unwrap();
    assert_eq!(rt.exit_code(), 0);
}

#[test]
fn and_or_combinators() {
    assert_eq!(output("r = $(false || echo fallback)\nprint(r.out())"), "fallback\n\n");
    assert_eq!(output("r = $(true && echo ran)\nprint(r.status())"), "0\n");
    // `&&` after a failure skips the right side, keeping its status.
    assert_eq!(output("r = $(false && echo skipped)\nprint(r.status() != 0)"), "true\n");
}

#[test]
fn variable_interpolation_in_words() {
    assert_eq!(
        output("name = \"world\"\nr = $(echo hello-$name)\nprint(r.out())"),
        "hello-world\n\n"
    );
    assert_eq!(
        output("n = 3\nr = $(echo ${n + 1})\nprint(r.out())"),
        "4\n\n"
    );
}

#[test]
fn nested_substitution_in_words() {
    assert_eq!(
        output("r = $(echo outer-$(echo inner))\nprint(r.out())"),
        "outer-inner\n\n"
    );
}

#[test]
fn output_redirection_and_input_redirection() {
    let path = std::env::temp_dir().join("shale-redirect-test.txt");
    let path = path.to_string_lossy().into_owned();
    let source = format!(
        "echo first > {path}\necho second >> {path}\nr = $(cat < {path})\nprint(r.out())",
        path = path
    );
    assert_eq!(output(&source), "first\nsecond\n\n");
    let _ = std::fs::remove_file(path);
}

#[test]
fn stderr_capture_and_merge() {
    // Stderr is captured separately by default.
    let source = "r = $(sh -c \"echo oops >&2\")\nprint(r.out() == \"\")\nprint(r.err())";
    assert_eq!(output(source), "true\noops\n\n");

    // With 2>&1 it lands in the captured stdout.
    let source = "r = $(sh -c \"echo oops >&2\" 2>&1)\nprint(r.out())";
    assert_eq!(output(source), "oops\n\n");
}

#[test]
fn missing_command_gives_127() {
    let (rt, result) = run("r = $(definitely-not-a-command-shale)\nprint(r.status())");
    result.unwrap();
    let mut rt = rt;
    assert_eq!(rt.take_output(), "127\n");
}

#[test]
fn background_returns_immediately() {
    let (rt, result) = run("sleep 5 &");
    result.unwrap();
    assert_eq!(rt.exit_code(), 0);
}

#[test]
fn bare_unbound_name_runs_a_command() {
    // Unknown bare name: retried as a command, which is not found either.
    let (rt, result) = run("qwertyuiop_no_such_cmd");
    result.unwrap();
    assert!(rt.last_stmt_was_cmd);
    assert_eq!(rt.exit_code(), 127);

    // A bound name is still just an expression.
    let (rt, result) = run("ls = 42\nls");
    result.unwrap();
    assert!(!rt.last_stmt_was_cmd);
    assert!(matches!(
        rt.last_value,
        Some(shale_interpreter::value::Value::Integer(42))
    ));
}

#[test]
fn aliases_expand_before_lookup() {
    assert_eq!(
        output("alias shout = echo loud\nr = $(shout noise)\nprint(r.out())"),
        "loud noise\n\n"
    );
}

#[test]
fn declared_commands_run_in_process() {
    let source = "
cmd greet {
    print(\"hi \" + args[0])
}
greet world
";
    assert_eq!(output(source), "hi world\n");
}

#[test]
fn declared_command_status_comes_from_return() {
    let source = "
cmd failing {
    return 3
}
failing
";
    let (rt, result) = run(source);
    result.unwrap();
    assert_eq!(rt.exit_code(), 3);
}

#[test]
fn quoted_words_do_not_glob() {
    assert_eq!(output("r = $(echo \"*\")\nprint(r.out())"), "*\n\n");
}

#[test]
fn glob_expansion_matches_files() {
    let dir = std::env::temp_dir().join("shale-glob-test");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("one.sgl"), "").unwrap();
    std::fs::write(dir.join("two.sgl"), "").unwrap();
    let source = format!(
        "r = $(echo {}/*.sgl)\nprint(len(array(r)))",
        dir.to_string_lossy()
    );
    assert_eq!(output(&source), "2\n");
}
