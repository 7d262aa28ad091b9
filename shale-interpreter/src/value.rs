use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::class::Class;
use crate::cmd::CmdResult;
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::function::{BoundMethod, Function};
use crate::instance::Instance;
use crate::iterator::IterState;
use crate::module::Module;
use crate::runtime::Runtime;
use crate::ShaleRef;

/// The signature of a native builtin function or method.
pub type BuiltinFn = fn(&mut Runtime, Vec<Value>) -> EvalResult;

/// A numeric range value, as produced by `range(...)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeValue {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl RangeValue {
    /// The number of values the range yields.
    pub fn len(&self) -> i64 {
        if self.step == 0 {
            return 0;
        }
        let span = if self.step > 0 {
            self.end.saturating_sub(self.start)
        } else {
            self.start.saturating_sub(self.end)
        };
        if span <= 0 {
            0
        } else {
            (span + self.step.abs() - 1) / self.step.abs()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A slice value, as produced by `a[start:end]` subscripts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceValue {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl SliceValue {
    /// Resolve the slice against a sequence length, clamping both bounds.
    /// Negative bounds count from the end.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let len = len as i64;
        let clamp = |idx: i64| -> usize {
            let idx = if idx < 0 { idx + len } else { idx };
            idx.clamp(0, len) as usize
        };
        let start = clamp(self.start.unwrap_or(0));
        let end = clamp(self.end.unwrap_or(len));
        (start, end.max(start))
    }
}

/// The closed set of value type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Nil,
    Bool,
    Int,
    Real,
    String,
    Array,
    Tuple,
    Map,
    Set,
    Func,
    Class,
    Instance,
    Iter,
    Module,
    Cmd,
    CmdIter,
    File,
    Range,
    Slice,
    Type,
}

impl TypeTag {
    /// The user-visible name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Real => "real",
            Self::String => "string",
            Self::Array => "array",
            Self::Tuple => "tuple",
            Self::Map => "map",
            Self::Set => "set",
            Self::Func => "function",
            Self::Class => "class",
            Self::Instance => "object",
            Self::Iter => "iter",
            Self::Module => "module",
            Self::Cmd => "cmdobj",
            Self::CmdIter => "cmd_iter",
            Self::File => "file",
            Self::Range => "range",
            Self::Slice => "slice",
            Self::Type => "type",
        }
    }
}

/// Represents a Shale value.
#[derive(Debug, Clone)]
pub enum Value {
    /// The **nil** value.
    Nil,
    /// A boolean value (**true** or **false**).
    Boolean(bool),
    /// An integer value. Arithmetic wraps on overflow.
    Integer(i64),
    /// A floating-point value.
    Real(f64),
    /// A string value.
    String(Rc<String>),
    /// An array of values.
    Array(ShaleRef<Vec<Value>>),
    /// An immutable tuple of values.
    Tuple(Rc<Vec<Value>>),
    /// A map from hashable keys to values, in insertion order.
    Map(ShaleRef<IndexMap<Key, Value>>),
    /// A set of hashable values, in insertion order.
    Set(ShaleRef<IndexSet<Key>>),
    /// A numeric range.
    Range(RangeValue),
    /// A slice, only ever produced inside a subscript.
    Slice(SliceValue),
    /// A user-defined function with its captured scopes.
    Function(Rc<Function>),
    /// A function or builtin bound to a receiver at attribute-lookup time.
    Method(Rc<BoundMethod>),
    /// A native builtin function.
    Builtin(&'static str, BuiltinFn),
    /// A user-defined class.
    Class(ShaleRef<Class>),
    /// An instance of a user-defined class.
    Instance(ShaleRef<Instance>),
    /// An iterator over some source value.
    Iter(ShaleRef<IterState>),
    /// The captured result of an external command.
    Cmd(ShaleRef<CmdResult>),
    /// An open file.
    File(ShaleRef<crate::builtins::FileState>),
    /// A loaded module.
    Module(Rc<Module>),
    /// A builtin type object, callable to construct or coerce.
    Type(TypeTag),
}

impl Value {
    /// Get the type tag of this value.
    pub fn tag(&self) -> TypeTag {
        match self {
            Self::Nil => TypeTag::Nil,
            Self::Boolean(_) => TypeTag::Bool,
            Self::Integer(_) => TypeTag::Int,
            Self::Real(_) => TypeTag::Real,
            Self::String(_) => TypeTag::String,
            Self::Array(_) => TypeTag::Array,
            Self::Tuple(_) => TypeTag::Tuple,
            Self::Map(_) => TypeTag::Map,
            Self::Set(_) => TypeTag::Set,
            Self::Range(_) => TypeTag::Range,
            Self::Slice(_) => TypeTag::Slice,
            Self::Function(_) | Self::Method(_) | Self::Builtin(_, _) => TypeTag::Func,
            Self::Class(_) => TypeTag::Class,
            Self::Instance(_) => TypeTag::Instance,
            Self::Iter(state) => match &*state.borrow() {
                IterState::Words { .. } => TypeTag::CmdIter,
                _ => TypeTag::Iter,
            },
            Self::Cmd(_) => TypeTag::Cmd,
            Self::File(_) => TypeTag::File,
            Self::Module(_) => TypeTag::Module,
            Self::Type(_) => TypeTag::Type,
        }
    }

    /// The user-visible name of this value's type.
    pub fn type_name(&self) -> &'static str {
        self.tag().name()
    }

    /// Construct a string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(Rc::new(value.into()))
    }

    /// Construct an array value.
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(std::cell::RefCell::new(items)))
    }

    /// Construct a tuple value.
    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }
}

/// Structural equality between values; identity types compare by reference.
///
/// Instance equality through a user `__eq__` goes through the dispatch layer
/// instead, which has runtime access.
pub fn value_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Nil, Value::Nil) => true,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::Real(a), Value::Real(b)) => a == b,
        (Value::Integer(a), Value::Real(b)) | (Value::Real(b), Value::Integer(a)) => {
            (*a as f64) == *b
        }
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| value_eq(x, y))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| value_eq(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| matches!(b.get(key), Some(other) if value_eq(value, other)))
        }
        (Value::Set(a), Value::Set(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len() && a.iter().all(|key| b.contains(key))
        }
        (Value::Range(a), Value::Range(b)) => a == b,
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
        (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
        (Value::Cmd(a), Value::Cmd(b)) => Rc::ptr_eq(a, b),
        (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
        (Value::Type(a), Value::Type(b)) => a == b,
        (Value::Builtin(_, a), Value::Builtin(_, b)) => a == b,
        _ => false,
    }
}

/// A map/set key: a value paired with its precomputed hash.
///
/// Only hashable values can become keys; [`Key::new`] rejects the rest.
#[derive(Debug, Clone)]
pub struct Key {
    pub value: Value,
    hash: u64,
}

impl Key {
    /// Wrap a value as a key, failing for unhashable types.
    pub fn new(value: Value) -> EvalResult<Key> {
        let hash = hash_value(&value)?;
        Ok(Key { value, hash })
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        value_eq(&self.value, &other.value)
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Compute the hash of a hashable value.
pub fn hash_value(value: &Value) -> EvalResult<u64> {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    hash_into(value, &mut hasher)?;
    Ok(hasher.finish())
}

fn hash_into(value: &Value, hasher: &mut impl Hasher) -> EvalResult<()> {
    match value {
        Value::Nil => 0u8.hash(hasher),
        Value::Boolean(value) => (1u8, value).hash(hasher),
        // An integer and the equal real must hash alike.
        Value::Integer(value) => (2u8, (*value as f64).to_bits()).hash(hasher),
        Value::Real(value) => (2u8, value.to_bits()).hash(hasher),
        Value::String(value) => (3u8, value).hash(hasher),
        Value::Tuple(items) => {
            4u8.hash(hasher);
            for item in items.iter() {
                hash_into(item, hasher)?;
            }
        }
        Value::Type(tag) => (5u8, tag).hash(hasher),
        other => {
            return Err(RuntimeError::bare(
                ErrorKind::IncompatibleType,
                format!("type '{}' is not hashable", other.type_name()),
            ))
        }
    }
    Ok(())
}
