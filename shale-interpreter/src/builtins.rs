use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use shale_core::pos::Pos;

use crate::dispatch;
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::iterator;
use crate::runtime::Runtime;
use crate::value::{Key, RangeValue, TypeTag, Value};

/// Bind the builtin functions and type objects in the main table, marked
/// global so they resolve from inside any function body.
pub fn install(rt: &mut Runtime) {
    let builtins: &[(&'static str, crate::value::BuiltinFn)] = &[
        ("print", builtin_print),
        ("print_err", builtin_print_err),
        ("len", builtin_len),
        ("type", builtin_type),
        ("range", builtin_range),
        ("assert", builtin_assert),
        ("open", builtin_open),
        ("glob", builtin_glob),
    ];
    for &(name, func) in builtins {
        rt.scopes.set_global(name, Value::Builtin(name, func));
    }

    let types: &[(&'static str, TypeTag)] = &[
        ("int", TypeTag::Int),
        ("real", TypeTag::Real),
        ("str", TypeTag::String),
        ("bool", TypeTag::Bool),
        ("array", TypeTag::Array),
        ("tuple", TypeTag::Tuple),
        ("map", TypeTag::Map),
        ("set", TypeTag::Set),
    ];
    for &(name, tag) in types {
        rt.scopes.set_global(name, Value::Type(tag));
    }
}

fn builtin_print(rt: &mut Runtime, args: Vec<Value>) -> EvalResult {
    let mut parts = Vec::with_capacity(args.len());
    for arg in &args {
        parts.push(dispatch::obj_string(rt, arg, Pos::default())?);
    }
    rt.print(&format!("{}\n", parts.join(" ")));
    Ok(Value::Nil)
}

fn builtin_print_err(rt: &mut Runtime, args: Vec<Value>) -> EvalResult {
    let mut parts = Vec::with_capacity(args.len());
    for arg in &args {
        parts.push(dispatch::obj_string(rt, arg, Pos::default())?);
    }
    rt.print_err(&format!("{}\n", parts.join(" ")));
    Ok(Value::Nil)
}

fn builtin_len(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    crate::expect_args!("len", args, [value => value]);
    let len = match &value {
        Value::String(text) => text.chars().count() as i64,
        Value::Array(items) => items.borrow().len() as i64,
        Value::Tuple(items) => items.len() as i64,
        Value::Map(map) => map.borrow().len() as i64,
        Value::Set(set) => set.borrow().len() as i64,
        Value::Range(range) => range.len(),
        other => {
            return Err(RuntimeError::bare(
                ErrorKind::IncompatibleType,
                format!("type '{}' has no length", other.type_name()),
            ))
        }
    };
    Ok(Value::Integer(len))
}

fn builtin_type(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    crate::expect_args!("type", args, [value => value]);
    match &value {
        Value::Instance(object) => Ok(Value::Class(object.borrow().class()?)),
        other => Ok(Value::Type(other.tag())),
    }
}

fn builtin_range(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    let ints: Vec<i64> = args
        .iter()
        .map(|arg| match arg {
            Value::Integer(value) => Ok(*value),
            other => Err(RuntimeError::bare(
                ErrorKind::IncompatibleType,
                format!("'range': expected int, got '{}'", other.type_name()),
            )),
        })
        .collect::<EvalResult<_>>()?;
    let range = match ints.as_slice() {
        [end] => RangeValue {
            start: 0,
            end: *end,
            step: 1,
        },
        [start, end] => RangeValue {
            start: *start,
            end: *end,
            step: 1,
        },
        [start, end, step] if *step != 0 => RangeValue {
            start: *start,
            end: *end,
            step: *step,
        },
        [_, _, _] => {
            return Err(RuntimeError::bare(
                ErrorKind::IncompatibleType,
                "'range': step cannot be zero",
            ))
        }
        _ => {
            return Err(RuntimeError::bare(
                ErrorKind::FuncParams,
                "'range': takes 1 to 3 arguments",
            ))
        }
    };
    Ok(Value::Range(range))
}

fn builtin_assert(rt: &mut Runtime, args: Vec<Value>) -> EvalResult {
    if args.is_empty() || args.len() > 2 {
        return Err(RuntimeError::bare(
            ErrorKind::FuncParams,
            "'assert': takes 1 or 2 arguments",
        ));
    }
    let ok = dispatch::truthy(rt, &args[0], Pos::default())?;
    if ok {
        return Ok(Value::Nil);
    }
    let message = match args.get(1) {
        Some(message) => dispatch::obj_string(rt, message, Pos::default())?,
        None => "assertion failed".to_string(),
    };
    Err(RuntimeError::bare(ErrorKind::Assert, message))
}

fn builtin_glob(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    crate::expect_args!("glob", args, [Value::String(pattern) => pattern]);
    let paths = glob::glob(&pattern).map_err(|err| {
        RuntimeError::bare(
            ErrorKind::IncompatibleType,
            format!("'glob': bad pattern: {}", err),
        )
    })?;
    let items: Vec<Value> = paths
        .filter_map(Result::ok)
        .map(|path| Value::string(path.to_string_lossy().into_owned()))
        .collect();
    Ok(Value::array(items))
}

/// The mode a file value was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileMode {
    Read,
    Write,
    Append,
}

/// An open file exposed to scripts.
#[derive(Debug)]
pub struct FileState {
    path: String,
    mode: FileMode,
    file: Option<File>,
}

impl FileState {
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    fn open_file(&mut self, op: &str) -> EvalResult<&mut File> {
        let path = self.path.clone();
        self.file.as_mut().ok_or_else(|| {
            RuntimeError::bare(
                ErrorKind::FileError,
                format!("'{}': file '{}' is closed", op, path),
            )
        })
    }

    /// Read everything from the current position.
    pub fn read_all(&mut self) -> EvalResult<String> {
        if self.mode != FileMode::Read {
            return Err(RuntimeError::bare(
                ErrorKind::FileError,
                format!("file '{}' is not open for reading", self.path),
            ));
        }
        let path = self.path.clone();
        let file = self.open_file("read")?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|err| {
            RuntimeError::bare(
                ErrorKind::FileError,
                format!("cannot read '{}': {}", path, err),
            )
        })?;
        Ok(contents)
    }

    /// Read the remaining lines, without their terminators.
    pub fn read_lines(&mut self) -> EvalResult<Vec<String>> {
        let contents = self.read_all()?;
        Ok(contents.lines().map(str::to_string).collect())
    }

    pub fn write(&mut self, text: &str) -> EvalResult<()> {
        if self.mode == FileMode::Read {
            return Err(RuntimeError::bare(
                ErrorKind::FileError,
                format!("file '{}' is not open for writing", self.path),
            ));
        }
        let path = self.path.clone();
        let file = self.open_file("write")?;
        file.write_all(text.as_bytes()).map_err(|err| {
            RuntimeError::bare(
                ErrorKind::FileError,
                format!("cannot write '{}': {}", path, err),
            )
        })
    }

    pub fn close(&mut self) {
        self.file = None;
    }
}

fn builtin_open(_: &mut Runtime, args: Vec<Value>) -> EvalResult {
    if args.is_empty() || args.len() > 2 {
        return Err(RuntimeError::bare(
            ErrorKind::FuncParams,
            "'open': takes 1 or 2 arguments",
        ));
    }
    let path = match &args[0] {
        Value::String(path) => path.as_ref().clone(),
        other => {
            return Err(RuntimeError::bare(
                ErrorKind::IncompatibleType,
                format!("'open': expected a path string, got '{}'", other.type_name()),
            ))
        }
    };
    let mode = match args.get(1) {
        None => FileMode::Read,
        Some(Value::String(mode)) => match mode.as_str() {
            "r" => FileMode::Read,
            "w" => FileMode::Write,
            "a" => FileMode::Append,
            other => {
                return Err(RuntimeError::bare(
                    ErrorKind::IncompatibleType,
                    format!("'open': unknown mode '{}'", other),
                ))
            }
        },
        Some(other) => {
            return Err(RuntimeError::bare(
                ErrorKind::IncompatibleType,
                format!("'open': expected a mode string, got '{}'", other.type_name()),
            ))
        }
    };

    let result = match mode {
        FileMode::Read => File::open(&path),
        FileMode::Write => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path),
        FileMode::Append => OpenOptions::new().append(true).create(true).open(&path),
    };
    let file = result.map_err(|err| {
        RuntimeError::bare(
            ErrorKind::FileError,
            format!("cannot open '{}': {}", path, err),
        )
    })?;
    Ok(Value::File(Rc::new(RefCell::new(FileState {
        path,
        mode,
        file: Some(file),
    }))))
}

/// Invoke a type object: construct or coerce, per type.
pub fn construct(rt: &mut Runtime, tag: TypeTag, args: Vec<Value>, pos: Pos) -> EvalResult {
    match tag {
        TypeTag::Int => {
            crate::expect_args!("int", args, [value => value]);
            match value {
                Value::Integer(_) => Ok(value),
                Value::Real(real) => Ok(Value::Integer(real as i64)),
                Value::Boolean(flag) => Ok(Value::Integer(i64::from(flag))),
                Value::String(text) => text.trim().parse::<i64>().map(Value::Integer).map_err(|_| {
                    RuntimeError::new(
                        ErrorKind::IncompatibleType,
                        format!("cannot convert '{}' to int", text),
                        pos,
                    )
                }),
                other => Err(RuntimeError::new(
                    ErrorKind::IncompatibleType,
                    format!("cannot convert '{}' to int", other.type_name()),
                    pos,
                )),
            }
        }
        TypeTag::Real => {
            crate::expect_args!("real", args, [value => value]);
            match value {
                Value::Real(_) => Ok(value),
                Value::Integer(int) => Ok(Value::Real(int as f64)),
                Value::Boolean(flag) => Ok(Value::Real(f64::from(u8::from(flag)))),
                Value::String(text) => text.trim().parse::<f64>().map(Value::Real).map_err(|_| {
                    RuntimeError::new(
                        ErrorKind::IncompatibleType,
                        format!("cannot convert '{}' to real", text),
                        pos,
                    )
                }),
                other => Err(RuntimeError::new(
                    ErrorKind::IncompatibleType,
                    format!("cannot convert '{}' to real", other.type_name()),
                    pos,
                )),
            }
        }
        TypeTag::String => {
            if args.is_empty() {
                return Ok(Value::string(String::new()));
            }
            crate::expect_args!("str", args, [value => value]);
            Ok(Value::string(dispatch::obj_string(rt, &value, pos)?))
        }
        TypeTag::Bool => {
            crate::expect_args!("bool", args, [value => value]);
            Ok(Value::Boolean(dispatch::truthy(rt, &value, pos)?))
        }
        TypeTag::Array => {
            if args.is_empty() {
                return Ok(Value::array(Vec::new()));
            }
            crate::expect_args!("array", args, [value => value]);
            Ok(Value::array(iterator::collect_values(rt, &value, pos)?))
        }
        TypeTag::Tuple => {
            if args.is_empty() {
                return Ok(Value::tuple(Vec::new()));
            }
            crate::expect_args!("tuple", args, [value => value]);
            Ok(Value::tuple(iterator::collect_values(rt, &value, pos)?))
        }
        TypeTag::Map => {
            if args.is_empty() {
                return Ok(Value::Map(Rc::new(RefCell::new(IndexMap::new()))));
            }
            crate::expect_args!("map", args, [value => value]);
            let mut map = IndexMap::new();
            for entry in iterator::collect_values(rt, &value, pos)? {
                let pair = crate::assign::unpack(rt, &entry, pos)?;
                if pair.len() != 2 {
                    return Err(RuntimeError::new(
                        ErrorKind::IncompatibleType,
                        "'map': expected (key, value) pairs",
                        pos,
                    ));
                }
                let mut pair = pair.into_iter();
                let key = Key::new(pair.next().expect("pair has two items"))
                    .map_err(|err| err.annotate(pos))?;
                map.insert(key, pair.next().expect("pair has two items"));
            }
            Ok(Value::Map(Rc::new(RefCell::new(map))))
        }
        TypeTag::Set => {
            if args.is_empty() {
                return Ok(Value::Set(Rc::new(RefCell::new(IndexSet::new()))));
            }
            crate::expect_args!("set", args, [value => value]);
            let mut set = IndexSet::new();
            for item in iterator::collect_values(rt, &value, pos)? {
                set.insert(Key::new(item).map_err(|err| err.annotate(pos))?);
            }
            Ok(Value::Set(Rc::new(RefCell::new(set))))
        }
        other => Err(RuntimeError::new(
            ErrorKind::FuncParams,
            format!("type '{}' is not constructable", other.name()),
            pos,
        )),
    }
}
