//!
//! This is the interpreter for the Shale shell-scripting language.
//!

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Facilities for the assignment engine.
pub mod assign;
/// Definitions of the free builtin functions and callable type objects.
pub mod builtins;
/// Facilities for manipulating classes.
pub mod class;
/// The external-command subsystem: pipelines, redirections, jobs.
pub mod cmd;
/// Per-type operation dispatch (arithmetic, comparison, indexing, attributes).
pub mod dispatch;
/// The runtime error type and its closed kind set.
pub mod error;
/// Facilities for evaluating expressions and executing statements.
pub mod evaluate;
/// The stop-flag type threaded through statement execution.
pub mod flow;
/// Facilities for manipulating function values.
pub mod function;
/// Facilities for manipulating class instances.
pub mod instance;
/// Facilities for iterating over values.
pub mod iterator;
/// Facilities for loading modules.
pub mod module;
/// Definitions for all builtin per-type methods.
pub mod primitives;
/// The interpreter's main data structure.
pub mod runtime;
/// Symbol tables and the scope stack.
pub mod scope;
/// Facilities for manipulating values.
pub mod value;

/// A strong and owning reference to an object.
pub type ShaleRef<T> = Rc<RefCell<T>>;
/// A weak reference to an object.
pub type ShaleWeakRef<T> = Weak<RefCell<T>>;
