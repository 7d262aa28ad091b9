use crate::error::EvalResult;
use crate::expect_args;
use crate::runtime::Runtime;
use crate::value::{BuiltinFn, Value};

fn len(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("range>>len", args, [Value::Range(range) => range]);
    Ok(Value::Integer(range.len()))
}

pub static INSTANCE_METHODS: &[(&str, BuiltinFn)] = &[("len", len)];
