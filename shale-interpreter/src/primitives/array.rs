use shale_core::pos::Pos;

use crate::dispatch;
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::expect_args;
use crate::iterator;
use crate::runtime::Runtime;
use crate::value::{value_eq, BuiltinFn, Value};

fn len(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>len", args, [Value::Array(items) => items]);
    let len = items.borrow().len() as i64;
    Ok(Value::Integer(len))
}

fn append(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>append", args, [Value::Array(items) => items, value => value]);
    items.borrow_mut().push(value);
    Ok(Value::Nil)
}

fn pop(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>pop", args, [Value::Array(items) => items]);
    let popped = items.borrow_mut().pop();
    popped.ok_or_else(|| {
        RuntimeError::bare(ErrorKind::OutOfRange, "'array>>pop': array is empty")
    })
}

fn insert(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>insert", args, [
        Value::Array(items) => items,
        Value::Integer(idx) => idx,
        value => value,
    ]);
    let mut items = items.borrow_mut();
    let len = items.len() as i64;
    if idx < 0 || idx > len {
        return Err(RuntimeError::bare(
            ErrorKind::OutOfRange,
            format!("'array>>insert': index {} out of range", idx),
        ));
    }
    items.insert(idx as usize, value);
    Ok(Value::Nil)
}

fn remove(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>remove", args, [
        Value::Array(items) => items,
        Value::Integer(idx) => idx,
    ]);
    let mut items = items.borrow_mut();
    let len = items.len() as i64;
    let idx = if idx < 0 { idx + len } else { idx };
    if idx < 0 || idx >= len {
        return Err(RuntimeError::bare(
            ErrorKind::OutOfRange,
            format!("'array>>remove': index {} out of range", idx),
        ));
    }
    Ok(items.remove(idx as usize))
}

fn index(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>index", args, [Value::Array(items) => items, value => value]);
    let found = items
        .borrow()
        .iter()
        .position(|item| value_eq(item, &value))
        .map(|idx| idx as i64)
        .unwrap_or(-1);
    Ok(Value::Integer(found))
}

fn join(rt: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>join", args, [
        Value::Array(items) => items,
        Value::String(sep) => sep,
    ]);
    let items = items.borrow().clone();
    let parts: Vec<String> = items
        .iter()
        .map(|item| dispatch::obj_string(rt, item, Pos::default()))
        .collect::<EvalResult<_>>()?;
    Ok(Value::string(parts.join(&sep)))
}

fn reverse(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>reverse", args, [Value::Array(items) => items]);
    items.borrow_mut().reverse();
    Ok(Value::Nil)
}

fn sort(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>sort", args, [Value::Array(items) => items]);
    let mut sorted = items.borrow().clone();
    let mut comparable = true;
    sorted.sort_by(|a, b| match dispatch::compare(a, b) {
        Some(ordering) => ordering,
        None => {
            comparable = false;
            std::cmp::Ordering::Equal
        }
    });
    if !comparable {
        return Err(RuntimeError::bare(
            ErrorKind::IncompatibleType,
            "'array>>sort': elements are not comparable",
        ));
    }
    *items.borrow_mut() = sorted;
    Ok(Value::Nil)
}

fn extend(rt: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>extend", args, [Value::Array(items) => items, value => value]);
    let more = iterator::collect_values(rt, &value, Pos::default())?;
    items.borrow_mut().extend(more);
    Ok(Value::Nil)
}

fn clear(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("array>>clear", args, [Value::Array(items) => items]);
    items.borrow_mut().clear();
    Ok(Value::Nil)
}

pub static INSTANCE_METHODS: &[(&str, BuiltinFn)] = &[
    ("len", len),
    ("append", append),
    ("push", append),
    ("pop", pop),
    ("insert", insert),
    ("remove", remove),
    ("index", index),
    ("join", join),
    ("reverse", reverse),
    ("sort", sort),
    ("extend", extend),
    ("clear", clear),
];
