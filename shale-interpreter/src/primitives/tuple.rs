use crate::error::EvalResult;
use crate::expect_args;
use crate::runtime::Runtime;
use crate::value::{value_eq, BuiltinFn, Value};

fn len(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("tuple>>len", args, [Value::Tuple(items) => items]);
    Ok(Value::Integer(items.len() as i64))
}

fn count(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("tuple>>count", args, [Value::Tuple(items) => items, value => value]);
    let count = items.iter().filter(|item| value_eq(item, &value)).count();
    Ok(Value::Integer(count as i64))
}

fn index(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("tuple>>index", args, [Value::Tuple(items) => items, value => value]);
    let found = items
        .iter()
        .position(|item| value_eq(item, &value))
        .map(|idx| idx as i64)
        .unwrap_or(-1);
    Ok(Value::Integer(found))
}

pub static INSTANCE_METHODS: &[(&str, BuiltinFn)] =
    &[("len", len), ("count", count), ("index", index)];
