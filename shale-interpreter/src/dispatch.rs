use std::cmp::Ordering;
use std::rc::Rc;

use shale_core::ast::{BinOp, UnaryOp};
use shale_core::pos::Pos;

use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::instance::Instance;
use crate::primitives;
use crate::value::{value_eq, Key, Value};

use crate::runtime::Runtime;

fn op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::Equal => "==",
        BinOp::NotEqual => "!=",
        BinOp::Less => "<",
        BinOp::Greater => ">",
        BinOp::LessEq => "<=",
        BinOp::GreaterEq => ">=",
        BinOp::And => "and",
        BinOp::Or => "or",
    }
}

fn dunder_for(op: BinOp) -> Option<&'static str> {
    match op {
        BinOp::Add => Some("__add__"),
        BinOp::Sub => Some("__sub__"),
        BinOp::Mul => Some("__mul__"),
        BinOp::Div => Some("__div__"),
        _ => None,
    }
}

fn type_error(op: BinOp, lhs: &Value, rhs: &Value, pos: Pos) -> RuntimeError {
    RuntimeError::new(
        ErrorKind::IncompatibleType,
        format!(
            "operation '{}' not supported between types '{}' and '{}'",
            op_name(op),
            lhs.type_name(),
            rhs.type_name()
        ),
        pos,
    )
}

/// Apply a binary operation; `and`/`or` short-circuiting happens upstream in
/// the expression executor.
pub fn binary(rt: &mut Runtime, op: BinOp, lhs: Value, rhs: Value, pos: Pos) -> EvalResult {
    use BinOp::*;
    match op {
        And | Or => unreachable!("short-circuit operators are handled by the expression executor"),
        Equal => return Ok(Value::Boolean(values_equal(rt, &lhs, &rhs, pos)?)),
        NotEqual => return Ok(Value::Boolean(!values_equal(rt, &lhs, &rhs, pos)?)),
        Less | Greater | LessEq | GreaterEq => {
            let ordering = compare(&lhs, &rhs).ok_or_else(|| type_error(op, &lhs, &rhs, pos))?;
            let result = match op {
                Less => ordering == Ordering::Less,
                Greater => ordering == Ordering::Greater,
                LessEq => ordering != Ordering::Greater,
                GreaterEq => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            return Ok(Value::Boolean(result));
        }
        _ => {}
    }

    match (&lhs, &rhs) {
        (Value::Integer(a), Value::Integer(b)) => integer_op(op, *a, *b, pos),
        (Value::Real(a), Value::Real(b)) => real_op(op, *a, *b).ok_or_else(|| type_error(op, &lhs, &rhs, pos)),
        (Value::Integer(a), Value::Real(b)) => {
            real_op(op, *a as f64, *b).ok_or_else(|| type_error(op, &lhs, &rhs, pos))
        }
        (Value::Real(a), Value::Integer(b)) => {
            real_op(op, *a, *b as f64).ok_or_else(|| type_error(op, &lhs, &rhs, pos))
        }
        (Value::String(a), Value::String(b)) if op == Add => {
            Ok(Value::string(format!("{}{}", a, b)))
        }
        (Value::String(a), Value::Integer(n)) | (Value::Integer(n), Value::String(a))
            if op == Mul =>
        {
            Ok(Value::string(a.repeat((*n).max(0) as usize)))
        }
        (Value::Cmd(cmd), Value::String(b)) if op == Add => {
            Ok(Value::string(format!("{}{}", cmd.borrow().stdout, b)))
        }
        (Value::String(a), Value::Cmd(cmd)) if op == Add => {
            Ok(Value::string(format!("{}{}", a, cmd.borrow().stdout)))
        }
        (Value::Array(a), Value::Array(b)) if op == Add => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::array(items))
        }
        (Value::Array(a), Value::Integer(n)) if op == Mul => {
            let source = a.borrow();
            let mut items = Vec::with_capacity(source.len() * (*n).max(0) as usize);
            for _ in 0..(*n).max(0) {
                items.extend(source.iter().cloned());
            }
            Ok(Value::array(items))
        }
        (Value::Tuple(a), Value::Tuple(b)) if op == Add => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::tuple(items))
        }
        (Value::Set(a), Value::Set(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            let result: indexmap::IndexSet<Key> = match op {
                BitOr => a.union(&b).cloned().collect(),
                BitAnd => a.intersection(&b).cloned().collect(),
                Sub => a.difference(&b).cloned().collect(),
                _ => return Err(type_error(op, &lhs, &rhs, pos)),
            };
            Ok(Value::Set(Rc::new(std::cell::RefCell::new(result))))
        }
        (Value::Instance(_), _) => {
            let name = dunder_for(op).ok_or_else(|| type_error(op, &lhs, &rhs, pos))?;
            if instance_method(&lhs, name)?.is_some() {
                call_dunder(rt, &lhs, name, vec![rhs.clone()], pos)
            } else {
                Err(type_error(op, &lhs, &rhs, pos))
            }
        }
        _ => Err(type_error(op, &lhs, &rhs, pos)),
    }
}

fn integer_op(op: BinOp, a: i64, b: i64, pos: Pos) -> EvalResult {
    use BinOp::*;
    let zero_div = || RuntimeError::new(ErrorKind::ZeroDiv, "division by zero", pos);
    let value = match op {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Mul => a.wrapping_mul(b),
        Div => {
            if b == 0 {
                return Err(zero_div());
            }
            a.wrapping_div(b)
        }
        Mod => {
            if b == 0 {
                return Err(zero_div());
            }
            a.wrapping_rem(b)
        }
        Pow => {
            if b < 0 {
                return Ok(Value::Real((a as f64).powi(b as i32)));
            }
            a.wrapping_pow(b as u32)
        }
        BitAnd => a & b,
        BitOr => a | b,
        BitXor => a ^ b,
        Shl => a.wrapping_shl(b as u32),
        Shr => a.wrapping_shr(b as u32),
        _ => unreachable!("comparison handled upstream"),
    };
    Ok(Value::Integer(value))
}

fn real_op(op: BinOp, a: f64, b: f64) -> Option<Value> {
    use BinOp::*;
    let value = match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div => a / b,
        Mod => a % b,
        Pow => a.powf(b),
        _ => return None,
    };
    Some(Value::Real(value))
}

/// Apply a unary operation.
pub fn unary(rt: &mut Runtime, op: UnaryOp, value: Value, pos: Pos) -> EvalResult {
    match (op, &value) {
        (UnaryOp::Neg, Value::Integer(a)) => Ok(Value::Integer(a.wrapping_neg())),
        (UnaryOp::Neg, Value::Real(a)) => Ok(Value::Real(-a)),
        (UnaryOp::BitNot, Value::Integer(a)) => Ok(Value::Integer(!a)),
        (UnaryOp::Not, _) => Ok(Value::Boolean(!truthy(rt, &value, pos)?)),
        _ => Err(RuntimeError::new(
            ErrorKind::IncompatibleType,
            format!("unary operation not supported on type '{}'", value.type_name()),
            pos,
        )),
    }
}

/// Equality, going through `__eq__` when the left side is an instance that
/// defines it.
pub fn values_equal(rt: &mut Runtime, lhs: &Value, rhs: &Value, pos: Pos) -> EvalResult<bool> {
    if let Value::Instance(_) = lhs {
        if instance_method(lhs, "__eq__")?.is_some() {
            let result = call_dunder(rt, lhs, "__eq__", vec![rhs.clone()], pos)?;
            return truthy(rt, &result, pos);
        }
    }
    Ok(value_eq(lhs, rhs))
}

/// Ordering between two values, when their types admit one.
pub fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Real(b)) => (*a as f64).partial_cmp(b),
        (Value::Real(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Coerce a value to a boolean, the way conditions do.
///
/// A command value is true when it exited 0, so `if $(grep -q ...)` reads
/// naturally.
pub fn truthy(rt: &mut Runtime, value: &Value, pos: Pos) -> EvalResult<bool> {
    let result = match value {
        Value::Nil => false,
        Value::Boolean(value) => *value,
        Value::Integer(value) => *value != 0,
        Value::Real(value) => *value != 0.0,
        Value::String(value) => !value.is_empty(),
        Value::Array(items) => !items.borrow().is_empty(),
        Value::Tuple(items) => !items.is_empty(),
        Value::Map(map) => !map.borrow().is_empty(),
        Value::Set(set) => !set.borrow().is_empty(),
        Value::Range(range) => !range.is_empty(),
        Value::Cmd(cmd) => cmd.borrow().status == 0,
        Value::Instance(_) => {
            if instance_method(value, "__bool__")?.is_some() {
                match call_dunder(rt, value, "__bool__", vec![], pos)? {
                    Value::Boolean(result) => result,
                    other => {
                        return Err(RuntimeError::new(
                            ErrorKind::IncompatibleType,
                            format!("expect bool from __bool__, got '{}'", other.type_name()),
                            pos,
                        ))
                    }
                }
            } else {
                true
            }
        }
        _ => true,
    };
    Ok(result)
}

/// Render a value as a string, the way `print` and string coercion do.
pub fn obj_string(rt: &mut Runtime, value: &Value, pos: Pos) -> EvalResult<String> {
    let out = match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(value) => value.to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Real(value) => value.to_string(),
        Value::String(value) => value.as_ref().clone(),
        Value::Array(items) => {
            // Clone first: rendering an element may run user code that
            // touches this same array.
            let items = items.borrow().clone();
            let parts: Vec<String> = items
                .iter()
                .map(|item| obj_string(rt, item, pos))
                .collect::<EvalResult<_>>()?;
            format!("[{}]", parts.join(", "))
        }
        Value::Tuple(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| obj_string(rt, item, pos))
                .collect::<EvalResult<_>>()?;
            format!("({})", parts.join(", "))
        }
        Value::Map(map) => {
            let mut parts = Vec::with_capacity(map.borrow().len());
            let entries: Vec<(Value, Value)> = map
                .borrow()
                .iter()
                .map(|(key, value)| (key.value.clone(), value.clone()))
                .collect();
            for (key, value) in entries {
                parts.push(format!(
                    "{}: {}",
                    obj_string(rt, &key, pos)?,
                    obj_string(rt, &value, pos)?
                ));
            }
            format!("{{{}}}", parts.join(", "))
        }
        Value::Set(set) => {
            let items: Vec<Value> = set.borrow().iter().map(|key| key.value.clone()).collect();
            let parts: Vec<String> = items
                .iter()
                .map(|item| obj_string(rt, item, pos))
                .collect::<EvalResult<_>>()?;
            format!("%{{{}}}", parts.join(", "))
        }
        Value::Range(range) => format!("range({}, {}, {})", range.start, range.end, range.step),
        Value::Slice(_) => "[slice]".to_string(),
        Value::Function(_) | Value::Method(_) | Value::Builtin(_, _) => "[function]".to_string(),
        Value::Class(class) => format!("[class {}]", class.borrow().name()),
        Value::Instance(object) => {
            if instance_method(value, "__str__")?.is_some() {
                match call_dunder(rt, value, "__str__", vec![], pos)? {
                    Value::String(result) => result.as_ref().clone(),
                    other => {
                        return Err(RuntimeError::new(
                            ErrorKind::IncompatibleType,
                            format!("expect string from __str__, got '{}'", other.type_name()),
                            pos,
                        ))
                    }
                }
            } else {
                format!("[object {}]", object.borrow().class_name())
            }
        }
        Value::Iter(_) => "[iter]".to_string(),
        Value::Cmd(cmd) => cmd.borrow().stdout.clone(),
        Value::File(file) => format!("[file {}]", file.borrow().path()),
        Value::Module(module) => format!("[module {}]", module.name),
        Value::Type(tag) => format!("[type {}]", tag.name()),
    };
    Ok(out)
}

/// Look up a method on an instance's class without binding it.
fn instance_method(value: &Value, name: &str) -> EvalResult<Option<Value>> {
    match value {
        Value::Instance(object) => {
            let class = object.borrow().class()?;
            let method = class.borrow().lookup_method(name);
            Ok(method)
        }
        _ => Ok(None),
    }
}

/// Invoke a protocol method on an instance, with the receiver as the first
/// argument.
pub fn call_dunder(
    rt: &mut Runtime,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    pos: Pos,
) -> EvalResult {
    let method = instance_method(receiver, name)?.ok_or_else(|| {
        let class_name = match receiver {
            Value::Instance(object) => object.borrow().class_name().to_string(),
            other => other.type_name().to_string(),
        };
        RuntimeError::new(
            ErrorKind::IncompatibleType,
            format!("object of class '{}' has no method '{}'", class_name, name),
            pos,
        )
    })?;
    let mut full_args = Vec::with_capacity(args.len() + 1);
    full_args.push(receiver.clone());
    full_args.extend(args);
    call_value(rt, &method, full_args, pos)
}

/// Invoke any callable value.
pub fn call_value(rt: &mut Runtime, callee: &Value, args: Vec<Value>, pos: Pos) -> EvalResult {
    match callee {
        Value::Function(function) => function
            .invoke(rt, args)
            .map_err(|err| err.annotate(pos)),
        Value::Builtin(_, builtin) => builtin(rt, args).map_err(|err| err.annotate(pos)),
        Value::Method(method) => {
            let mut full_args = Vec::with_capacity(args.len() + 1);
            full_args.push(method.receiver.clone());
            full_args.extend(args);
            call_value(rt, &method.callable, full_args, pos)
        }
        Value::Class(class) => {
            let object = Rc::new(std::cell::RefCell::new(Instance::from_class(class)));
            let instance = Value::Instance(object);
            let init = class.borrow().lookup_method("__init__");
            match init {
                Some(init) => {
                    let mut full_args = Vec::with_capacity(args.len() + 1);
                    full_args.push(instance.clone());
                    full_args.extend(args);
                    call_value(rt, &init, full_args, pos)?;
                }
                None if !args.is_empty() => {
                    return Err(RuntimeError::new(
                        ErrorKind::FuncParams,
                        format!(
                            "class '{}' takes no constructor arguments",
                            class.borrow().name()
                        ),
                        pos,
                    ))
                }
                None => {}
            }
            Ok(instance)
        }
        Value::Instance(_) => {
            if instance_method(callee, "__call__")?.is_some() {
                call_dunder(rt, callee, "__call__", args, pos)
            } else {
                Err(RuntimeError::new(
                    ErrorKind::IncompatibleType,
                    "object is not callable",
                    pos,
                ))
            }
        }
        Value::Type(tag) => crate::builtins::construct(rt, *tag, args, pos),
        other => Err(RuntimeError::new(
            ErrorKind::IncompatibleType,
            format!("type '{}' is not callable", other.type_name()),
            pos,
        )),
    }
}

/// Read an attribute off a value.
///
/// Instance lookup order: the instance's own attributes, then class methods
/// (bound to the receiver), then class attributes, walking the base chain.
/// Builtin types resolve through their method tables.
pub fn attr_get(object: &Value, name: &str, pos: Pos) -> EvalResult {
    match object {
        Value::Instance(instance) => {
            if let Some(value) = instance.borrow().lookup_attr(name) {
                return Ok(value);
            }
            let class = instance.borrow().class().map_err(|err| err.annotate(pos))?;
            if let Some(method) = class.borrow().lookup_method(name) {
                return Ok(Value::Method(Rc::new(
                    crate::function::BoundMethod::new(object.clone(), method),
                )));
            }
            if let Some(value) = class.borrow().lookup_attr(name) {
                return Ok(value);
            }
            Err(RuntimeError::new(
                ErrorKind::IncompatibleType,
                format!(
                    "object of class '{}' has no attribute '{}'",
                    instance.borrow().class_name(),
                    name
                ),
                pos,
            ))
        }
        Value::Class(class) => {
            let found = {
                let class = class.borrow();
                class.lookup_method(name).or_else(|| class.lookup_attr(name))
            };
            found.ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::IncompatibleType,
                    format!(
                        "class '{}' has no attribute '{}'",
                        class.borrow().name(),
                        name
                    ),
                    pos,
                )
            })
        }
        Value::Module(module) => module.lookup(name).ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::IncompatibleType,
                format!("module '{}' has no attribute '{}'", module.name, name),
                pos,
            )
        }),
        other => {
            if let Some(builtin) = primitives::lookup_method(other.tag(), name) {
                return Ok(Value::Method(Rc::new(crate::function::BoundMethod::new(
                    object.clone(),
                    builtin,
                ))));
            }
            Err(RuntimeError::new(
                ErrorKind::IncompatibleType,
                format!(
                    "type '{}' has no attribute '{}'",
                    other.type_name(),
                    name
                ),
                pos,
            ))
        }
    }
}

/// Assign an attribute on a value.
pub fn attr_set(object: &Value, name: &str, value: Value, pos: Pos) -> EvalResult<()> {
    match object {
        Value::Instance(instance) => {
            instance.borrow_mut().set_attr(name, value);
            Ok(())
        }
        Value::Class(class) => {
            class.borrow_mut().attrs.insert(name.to_string(), value);
            Ok(())
        }
        other => Err(RuntimeError::new(
            ErrorKind::IncompatibleType,
            format!(
                "cannot assign attribute '{}' on type '{}'",
                name,
                other.type_name()
            ),
            pos,
        )),
    }
}

fn index_of(len: usize, index: i64, pos: Pos, what: &str) -> EvalResult<usize> {
    let adjusted = if index < 0 { index + len as i64 } else { index };
    if adjusted < 0 || adjusted >= len as i64 {
        return Err(RuntimeError::new(
            ErrorKind::OutOfRange,
            format!("{} index {} out of range", what, index),
            pos,
        ));
    }
    Ok(adjusted as usize)
}

/// Read an element through a subscript.
pub fn get_item(rt: &mut Runtime, object: &Value, index: &Value, pos: Pos) -> EvalResult {
    match (object, index) {
        (Value::Array(items), Value::Integer(idx)) => {
            let items = items.borrow();
            let idx = index_of(items.len(), *idx, pos, "array")?;
            Ok(items[idx].clone())
        }
        (Value::Array(items), Value::Slice(slice)) => {
            let items = items.borrow();
            let (start, end) = slice.bounds(items.len());
            Ok(Value::array(items[start..end].to_vec()))
        }
        (Value::Tuple(items), Value::Integer(idx)) => {
            let idx = index_of(items.len(), *idx, pos, "tuple")?;
            Ok(items[idx].clone())
        }
        (Value::Tuple(items), Value::Slice(slice)) => {
            let (start, end) = slice.bounds(items.len());
            Ok(Value::tuple(items[start..end].to_vec()))
        }
        (Value::String(text), Value::Integer(idx)) => {
            let chars: Vec<char> = text.chars().collect();
            let idx = index_of(chars.len(), *idx, pos, "string")?;
            Ok(Value::string(chars[idx].to_string()))
        }
        (Value::String(text), Value::Slice(slice)) => {
            let chars: Vec<char> = text.chars().collect();
            let (start, end) = slice.bounds(chars.len());
            Ok(Value::string(chars[start..end].iter().collect::<String>()))
        }
        (Value::Map(map), _) => {
            let key = Key::new(index.clone()).map_err(|err| err.annotate(pos))?;
            match map.borrow().get(&key) {
                Some(value) => Ok(value.clone()),
                None => Err(RuntimeError::new(
                    ErrorKind::KeyNotFound,
                    format!("key '{}' not found", obj_string(rt, index, pos)?),
                    pos,
                )),
            }
        }
        (Value::Instance(_), _) => call_dunder(rt, object, "__getitem__", vec![index.clone()], pos),
        _ => Err(RuntimeError::new(
            ErrorKind::IncompatibleType,
            format!("type '{}' does not support indexing", object.type_name()),
            pos,
        )),
    }
}

/// Write an element through a subscript.
pub fn set_item(
    rt: &mut Runtime,
    object: &Value,
    index: &Value,
    value: Value,
    pos: Pos,
) -> EvalResult<()> {
    match (object, index) {
        (Value::Array(items), Value::Integer(idx)) => {
            let mut items = items.borrow_mut();
            let len = items.len();
            let idx = index_of(len, *idx, pos, "array")?;
            items[idx] = value;
            Ok(())
        }
        (Value::Map(map), _) => {
            let key = Key::new(index.clone()).map_err(|err| err.annotate(pos))?;
            map.borrow_mut().insert(key, value);
            Ok(())
        }
        (Value::Instance(_), _) => {
            call_dunder(rt, object, "__setitem__", vec![index.clone(), value], pos)?;
            Ok(())
        }
        _ => Err(RuntimeError::new(
            ErrorKind::IncompatibleType,
            format!(
                "type '{}' does not support item assignment",
                object.type_name()
            ),
            pos,
        )),
    }
}
