use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::error::EvalResult;
use crate::expect_args;
use crate::runtime::Runtime;
use crate::value::{BuiltinFn, Key, Value};

fn len(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("set>>len", args, [Value::Set(set) => set]);
    let len = set.borrow().len() as i64;
    Ok(Value::Integer(len))
}

fn add(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("set>>add", args, [Value::Set(set) => set, value => value]);
    set.borrow_mut().insert(Key::new(value)?);
    Ok(Value::Nil)
}

fn remove(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("set>>remove", args, [Value::Set(set) => set, value => value]);
    let key = Key::new(value)?;
    let removed = set.borrow_mut().shift_remove(&key);
    Ok(Value::Boolean(removed))
}

fn exists(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("set>>exists", args, [Value::Set(set) => set, value => value]);
    let key = Key::new(value)?;
    let contains = set.borrow().contains(&key);
    Ok(Value::Boolean(contains))
}

fn union(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("set>>union", args, [Value::Set(set) => set, Value::Set(other) => other]);
    let result: IndexSet<Key> = set.borrow().union(&other.borrow()).cloned().collect();
    Ok(Value::Set(Rc::new(RefCell::new(result))))
}

fn intersection(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    expect_args!("set>>intersection", args, [Value::Set(set) => set, Value::Set(other) => other]);
    let result: IndexSet<Key> = set.borrow().intersection(&other.borrow()).cloned().collect();
    Ok(Value::Set(Rc::new(RefCell::new(result))))
}

pub static INSTANCE_METHODS: &[(&str, BuiltinFn)] = &[
    ("len", len),
    ("add", add),
    ("remove", remove),
    ("exists", exists),
    ("union", union),
    ("intersection", intersection),
];
