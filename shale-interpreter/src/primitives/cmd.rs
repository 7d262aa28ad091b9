use crate::error::EvalResult;
use crate::expect_args;
use crate::runtime::Runtime;
use crate::value::{BuiltinFn, Value};

fn out(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("cmdobj>>out", args, [Value::Cmd(cmd) => cmd]);
    let stdout = cmd.borrow().stdout.clone();
    Ok(Value::string(stdout))
}

fn err(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("cmdobj>>err", args, [Value::Cmd(cmd) => cmd]);
    let stderr = cmd.borrow().stderr.clone();
    Ok(Value::string(stderr))
}

fn status(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("cmdobj>>status", args, [Value::Cmd(cmd) => cmd]);
    let status = cmd.borrow().status;
    Ok(Value::Integer(status as i64))
}

/// With an argument, set the word delimiter and return the receiver for
/// chaining; without, return the current delimiter.
fn delim(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    if args.len() >= 2 {
        expect_args!("cmdobj>>delim", args, [
            Value::Cmd(cmd) => cmd,
            Value::String(delim) => delim,
        ]);
        cmd.borrow_mut().delim = delim.as_ref().clone();
        return Ok(Value::Cmd(cmd));
    }
    expect_args!("cmdobj>>delim", args, [Value::Cmd(cmd) => cmd]);
    let delim = cmd.borrow().delim.clone();
    Ok(Value::string(delim))
}

pub static INSTANCE_METHODS: &[(&str, BuiltinFn)] = &[
    ("out", out),
    ("err", err),
    ("status", status),
    ("delim", delim),
];
