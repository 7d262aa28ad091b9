use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::expect_args;
use crate::runtime::Runtime;
use crate::value::{BuiltinFn, Key, Value};

fn len(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("map>>len", args, [Value::Map(map) => map]);
    let len = map.borrow().len() as i64;
    Ok(Value::Integer(len))
}

fn keys(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("map>>keys", args, [Value::Map(map) => map]);
    let keys: Vec<Value> = map.borrow().keys().map(|key| key.value.clone()).collect();
    Ok(Value::array(keys))
}

fn values(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("map>>values", args, [Value::Map(map) => map]);
    let values: Vec<Value> = map.borrow().values().cloned().collect();
    Ok(Value::array(values))
}

fn exists(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("map>>exists", args, [Value::Map(map) => map, value => value]);
    let key = Key::new(value)?;
    let exists = map.borrow().contains_key(&key);
    Ok(Value::Boolean(exists))
}

fn get(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    if args.len() < 2 || args.len() > 3 {
        return Err(RuntimeError::bare(
            ErrorKind::FuncParams,
            "'map>>get': takes 1 or 2 arguments",
        ));
    }
    let mut args = args.into_iter();
    let map = match args.next() {
        Some(Value::Map(map)) => map,
        _ => {
            return Err(RuntimeError::bare(
                ErrorKind::IncompatibleType,
                "'map>>get': wrong type of arguments",
            ))
        }
    };
    let key = Key::new(args.next().expect("argument count checked"))?;
    let default = args.next().unwrap_or(Value::Nil);
    let result = map.borrow().get(&key).cloned().unwrap_or(default);
    Ok(result)
}

fn remove(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("map>>remove", args, [Value::Map(map) => map, value => value]);
    let key = Key::new(value)?;
    let removed = map.borrow_mut().shift_remove(&key).is_some();
    Ok(Value::Boolean(removed))
}

fn clear(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("map>>clear", args, [Value::Map(map) => map]);
    map.borrow_mut().clear();
    Ok(Value::Nil)
}

pub static INSTANCE_METHODS: &[(&str, BuiltinFn)] = &[
    ("len", len),
    ("keys", keys),
    ("values", values),
    ("exists", exists),
    ("get", get),
    ("remove", remove),
    ("clear", clear),
];
