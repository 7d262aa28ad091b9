use std::cell::RefCell;
use std::rc::Rc;

use shale_core::pos::Pos;

use crate::dispatch;
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::instance::Instance;
use crate::runtime::Runtime;
use crate::value::{Value, RangeValue};
use crate::ShaleRef;

/// The state of an iterator value.
///
/// Collection iterators keep a strong reference to their source so it stays
/// alive for as long as the iteration does.
#[derive(Debug)]
pub enum IterState {
    /// Iteration over a live array.
    Array {
        source: ShaleRef<Vec<Value>>,
        pos: usize,
    },
    /// Iteration over a tuple.
    Tuple { source: Rc<Vec<Value>>, pos: usize },
    /// Iteration over a snapshot of values (map entries, set items, string
    /// characters, file lines).
    Sequence { items: Vec<Value>, pos: usize },
    /// Iteration over a numeric range.
    Range { next: i64, end: i64, step: i64 },
    /// Iteration over the words of a command's captured output, split off
    /// at iterator-creation time.
    Words { items: Vec<String>, pos: usize },
    /// Iteration driven by an object's `__next__` / `__has_next__` methods.
    Object { object: ShaleRef<Instance> },
}

/// Split captured output into words: trim delimiter characters at both ends,
/// split on any of them, and coalesce consecutive delimiters.
pub fn split_words(text: &str, delim: &str) -> Vec<String> {
    let is_delim = |ch: char| delim.contains(ch);
    text.trim_matches(is_delim)
        .split(is_delim)
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Obtain an iterator over a value, failing for non-iterable types.
pub fn iter_value(rt: &mut Runtime, value: &Value, pos: Pos) -> EvalResult<Value> {
    let state = match value {
        Value::Array(source) => IterState::Array {
            source: source.clone(),
            pos: 0,
        },
        Value::Tuple(source) => IterState::Tuple {
            source: source.clone(),
            pos: 0,
        },
        Value::Map(map) => IterState::Sequence {
            items: map
                .borrow()
                .iter()
                .map(|(key, value)| Value::tuple(vec![key.value.clone(), value.clone()]))
                .collect(),
            pos: 0,
        },
        Value::Set(set) => IterState::Sequence {
            items: set.borrow().iter().map(|key| key.value.clone()).collect(),
            pos: 0,
        },
        Value::String(text) => IterState::Sequence {
            items: text.chars().map(|ch| Value::string(ch.to_string())).collect(),
            pos: 0,
        },
        Value::Range(RangeValue { start, end, step }) => IterState::Range {
            next: *start,
            end: *end,
            step: if *step == 0 { 1 } else { *step },
        },
        Value::Cmd(cmd) => {
            let cmd = cmd.borrow();
            IterState::Words {
                items: split_words(&cmd.stdout, &cmd.delim),
                pos: 0,
            }
        }
        Value::File(file) => IterState::Sequence {
            items: file
                .borrow_mut()
                .read_lines()
                .map_err(|err| err.annotate(pos))?
                .into_iter()
                .map(Value::string)
                .collect(),
            pos: 0,
        },
        Value::Iter(_) => return Ok(value.clone()),
        Value::Instance(object) => {
            let has_iter = object
                .borrow()
                .class()
                .map_err(|err| err.annotate(pos))?
                .borrow()
                .lookup_method("__iter__")
                .is_some();
            if has_iter {
                let iter = dispatch::call_dunder(rt, value, "__iter__", vec![], pos)?;
                match iter {
                    Value::Iter(_) => return Ok(iter),
                    Value::Instance(object) => IterState::Object { object },
                    other => {
                        return Err(RuntimeError::new(
                            ErrorKind::IncompatibleType,
                            format!("'__iter__' returned a non-iterator '{}'", other.type_name()),
                            pos,
                        ))
                    }
                }
            } else {
                IterState::Object {
                    object: object.clone(),
                }
            }
        }
        other => {
            return Err(RuntimeError::new(
                ErrorKind::IncompatibleType,
                format!("type '{}' is not iterable", other.type_name()),
                pos,
            ))
        }
    };
    Ok(Value::Iter(Rc::new(RefCell::new(state))))
}

/// Whether the iterator has another value to yield.
///
/// For object-driven iterators, `__has_next__` must answer with a bool.
pub fn iter_has_next(rt: &mut Runtime, iter: &Value, pos: Pos) -> EvalResult<bool> {
    let state = match iter {
        Value::Iter(state) => state,
        other => {
            return Err(RuntimeError::new(
                ErrorKind::IncompatibleType,
                format!("type '{}' is not an iterator", other.type_name()),
                pos,
            ))
        }
    };
    let object = match &*state.borrow() {
        IterState::Array { source, pos } => return Ok(*pos < source.borrow().len()),
        IterState::Tuple { source, pos } => return Ok(*pos < source.len()),
        IterState::Sequence { items, pos } => return Ok(*pos < items.len()),
        IterState::Words { items, pos, .. } => return Ok(*pos < items.len()),
        IterState::Range { next, end, step } => {
            return Ok(if *step > 0 { next < end } else { next > end })
        }
        IterState::Object { object } => Value::Instance(object.clone()),
    };
    match dispatch::call_dunder(rt, &object, "__has_next__", vec![], pos)? {
        Value::Boolean(value) => Ok(value),
        _ => Err(RuntimeError::new(
            ErrorKind::IncompatibleType,
            "expect bool from __has_next__",
            pos,
        )),
    }
}

/// Yield the iterator's next value.
pub fn iter_next(rt: &mut Runtime, iter: &Value, pos: Pos) -> EvalResult<Value> {
    let state = match iter {
        Value::Iter(state) => state,
        other => {
            return Err(RuntimeError::new(
                ErrorKind::IncompatibleType,
                format!("type '{}' is not an iterator", other.type_name()),
                pos,
            ))
        }
    };
    let exhausted = || RuntimeError::new(ErrorKind::OutOfRange, "iterator is exhausted", pos);
    let object = match &mut *state.borrow_mut() {
        IterState::Array { source, pos } => {
            let value = source.borrow().get(*pos).cloned().ok_or_else(exhausted)?;
            *pos += 1;
            return Ok(value);
        }
        IterState::Tuple { source, pos } => {
            let value = source.get(*pos).cloned().ok_or_else(exhausted)?;
            *pos += 1;
            return Ok(value);
        }
        IterState::Sequence { items, pos } => {
            let value = items.get(*pos).cloned().ok_or_else(exhausted)?;
            *pos += 1;
            return Ok(value);
        }
        IterState::Words { items, pos, .. } => {
            let word = items.get(*pos).cloned().ok_or_else(exhausted)?;
            *pos += 1;
            return Ok(Value::string(word));
        }
        IterState::Range { next, end, step } => {
            let done = if *step > 0 { *next >= *end } else { *next <= *end };
            if done {
                return Err(exhausted());
            }
            let value = *next;
            *next += *step;
            return Ok(Value::Integer(value));
        }
        IterState::Object { object } => Value::Instance(object.clone()),
    };
    dispatch::call_dunder(rt, &object, "__next__", vec![], pos)
}

/// Drain an iterable into a vector, used by unpacking and coercions.
pub fn collect_values(rt: &mut Runtime, value: &Value, pos: Pos) -> EvalResult<Vec<Value>> {
    let iter = iter_value(rt, value, pos)?;
    let mut items = Vec::new();
    while iter_has_next(rt, &iter, pos)? {
        items.push(iter_next(rt, &iter, pos)?);
    }
    Ok(items)
}
