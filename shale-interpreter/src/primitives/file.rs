use crate::error::EvalResult;
use crate::expect_args;
use crate::runtime::Runtime;
use crate::value::{BuiltinFn, Value};

fn read(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("file>>read", args, [Value::File(file) => file]);
    let contents = file.borrow_mut().read_all()?;
    Ok(Value::string(contents))
}

fn lines(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("file>>lines", args, [Value::File(file) => file]);
    let lines = file.borrow_mut().read_lines()?;
    Ok(Value::array(lines.into_iter().map(Value::string).collect()))
}

fn write(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("file>>write", args, [
        Value::File(file) => file,
        Value::String(text) => text,
    ]);
    file.borrow_mut().write(&text)?;
    Ok(Value::Nil)
}

fn writeln(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("file>>writeln", args, [
        Value::File(file) => file,
        Value::String(text) => text,
    ]);
    file.borrow_mut().write(&format!("{}\n", text))?;
    Ok(Value::Nil)
}

fn close(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("file>>close", args, [Value::File(file) => file]);
    file.borrow_mut().close();
    Ok(Value::Nil)
}

pub static INSTANCE_METHODS: &[(&str, BuiltinFn)] = &[
    ("read", read),
    ("lines", lines),
    ("write", write),
    ("writeln", writeln),
    ("close", close),
];
