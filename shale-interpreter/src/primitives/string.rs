use crate::error::EvalResult;
use crate::expect_args;
use crate::runtime::Runtime;
use crate::value::{BuiltinFn, Value};

fn len(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>len", args, [Value::String(text) => text]);
    Ok(Value::Integer(text.chars().count() as i64))
}

fn split(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    let (text, delim) = match args.len() {
        1 => {
            expect_args!("string>>split", args, [Value::String(text) => text]);
            (text, None)
        }
        _ => {
            expect_args!(
                "string>>split",
                args,
                [Value::String(text) => text, Value::String(delim) => delim]
            );
            (text, Some(delim))
        }
    };
    let parts: Vec<Value> = match delim {
        None => text
            .split_whitespace()
            .map(|part| Value::string(part.to_string()))
            .collect(),
        Some(delim) => text
            .split(delim.as_str())
            .map(|part| Value::string(part.to_string()))
            .collect(),
    };
    Ok(Value::array(parts))
}

fn trim(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>trim", args, [Value::String(text) => text]);
    Ok(Value::string(text.trim().to_string()))
}

fn upper(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>upper", args, [Value::String(text) => text]);
    Ok(Value::string(text.to_uppercase()))
}

fn lower(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>lower", args, [Value::String(text) => text]);
    Ok(Value::string(text.to_lowercase()))
}

fn replace(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>replace", args, [
        Value::String(text) => text,
        Value::String(from) => from,
        Value::String(to) => to,
    ]);
    Ok(Value::string(text.replace(from.as_str(), to.as_str())))
}

fn contains(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>contains", args, [
        Value::String(text) => text,
        Value::String(needle) => needle,
    ]);
    Ok(Value::Boolean(text.contains(needle.as_str())))
}

fn starts_with(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>starts_with", args, [
        Value::String(text) => text,
        Value::String(prefix) => prefix,
    ]);
    Ok(Value::Boolean(text.starts_with(prefix.as_str())))
}

fn ends_with(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>ends_with", args, [
        Value::String(text) => text,
        Value::String(suffix) => suffix,
    ]);
    Ok(Value::Boolean(text.ends_with(suffix.as_str())))
}

fn find(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>find", args, [
        Value::String(text) => text,
        Value::String(needle) => needle,
    ]);
    // The answer is in characters, the way subscripts count.
    let found = match text.find(needle.as_str()) {
        Some(byte_idx) => text[..byte_idx].chars().count() as i64,
        None => -1,
    };
    Ok(Value::Integer(found))
}

fn count(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("string>>count", args, [
        Value::String(text) => text,
        Value::String(needle) => needle,
    ]);
    if needle.is_empty() {
        return Ok(Value::Integer(0));
    }
    Ok(Value::Integer(text.matches(needle.as_str()).count() as i64))
}

pub static INSTANCE_METHODS: &[(&str, BuiltinFn)] = &[
    ("len", len),
    ("size", len),
    ("split", split),
    ("trim", trim),
    ("upper", upper),
    ("lower", lower),
    ("replace", replace),
    ("contains", contains),
    ("starts_with", starts_with),
    ("ends_with", ends_with),
    ("find", find),
    ("count", count),
];
