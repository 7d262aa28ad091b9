use std::fmt;
use std::rc::Rc;

use shale_core::ast::FuncDecl;

use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::evaluate::{Evaluate, Execute};
use crate::flow::Flow;
use crate::runtime::Runtime;
use crate::scope::{ScopeStack, TableKind};
use crate::value::Value;

/// Represents a user-defined function: its declaration, the default values
/// evaluated at construction time, and the captured scope snapshot.
pub struct Function {
    pub name: String,
    pub decl: Rc<FuncDecl>,
    /// Evaluated defaults for the trailing defaulted parameters.
    pub defaults: Vec<Value>,
    /// The scope snapshot taken when the function value was constructed.
    pub closure: ScopeStack,
}

impl Function {
    /// Construct a function value, evaluating parameter defaults and taking
    /// the closure snapshot.
    ///
    /// A closure captures the scopes up to and including the nearest
    /// enclosing class or function table; anything else only sees the main
    /// table through the stack's weak handle.
    pub fn from_decl(rt: &mut Runtime, decl: &Rc<FuncDecl>) -> EvalResult<Function> {
        let mut defaults = Vec::new();
        for param in &decl.params {
            if let Some(default) = &param.default {
                defaults.push(default.evaluate(rt)?);
            }
        }

        let mut closure = ScopeStack::with_main(&rt.scopes.main());
        if decl.is_closure {
            let captured = if rt.scopes.has_class_table() {
                rt.scopes.until_table(TableKind::Class)
            } else {
                rt.scopes.until_table(TableKind::Func)
            };
            for table in captured {
                closure.push(table);
            }
        }

        Ok(Function {
            name: decl
                .name
                .clone()
                .unwrap_or_else(|| "<anonymous>".to_string()),
            decl: decl.clone(),
            defaults,
            closure,
        })
    }

    /// The number of arguments the function requires.
    fn required(&self) -> usize {
        self.decl
            .params
            .iter()
            .filter(|param| param.default.is_none() && !param.variadic)
            .count()
    }

    /// Whether the last parameter collects remaining arguments.
    fn is_variadic(&self) -> bool {
        self.decl.params.last().map_or(false, |param| param.variadic)
    }

    /// Invoke the function with the given arguments.
    ///
    /// The body runs on the function's own captured stack, with a fresh
    /// function table on top holding parameters and locals; the caller's
    /// stack is restored on every exit path.
    pub fn invoke(&self, rt: &mut Runtime, args: Vec<Value>) -> EvalResult<Value> {
        let positional = self.decl.params.len() - usize::from(self.is_variadic());
        if args.len() < self.required() {
            return Err(RuntimeError::bare(
                ErrorKind::FuncParams,
                format!(
                    "function '{}' takes at least {} arguments ({} given)",
                    self.name,
                    self.required(),
                    args.len()
                ),
            ));
        }
        if !self.is_variadic() && args.len() > positional {
            return Err(RuntimeError::bare(
                ErrorKind::FuncParams,
                format!(
                    "function '{}' takes at most {} arguments ({} given)",
                    self.name,
                    positional,
                    args.len()
                ),
            ));
        }

        let mut stack = self.closure.clone();
        stack.push_new(TableKind::Func);

        let mut args = args.into_iter();
        let defaults_from = positional - self.defaults.len();
        for (idx, param) in self.decl.params.iter().enumerate() {
            if param.variadic {
                let rest: Vec<Value> = args.by_ref().collect();
                stack.set_entry(&param.name, Value::tuple(rest));
                break;
            }
            let value = match args.next() {
                Some(value) => value,
                None => self.defaults[idx - defaults_from].clone(),
            };
            stack.set_entry(&param.name, value);
        }

        let saved = std::mem::replace(&mut rt.scopes, stack);
        let mut flow = Flow::Go;
        for stmt in &self.decl.body.stmts {
            flow = stmt.execute(rt);
            if !matches!(flow, Flow::Go) {
                break;
            }
        }
        rt.scopes = saved;

        match flow {
            Flow::Go => Ok(Value::Nil),
            Flow::Return(value) => Ok(value),
            Flow::Throw(err) => Err(err),
            Flow::Break | Flow::Continue => {
                unreachable!("loop flow escaped a function body")
            }
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.decl.params.len())
            .finish()
    }
}

/// A callable bound to its receiver at attribute-lookup time.
///
/// Both user methods and builtin per-type methods go through this: the
/// receiver is prepended to the arguments on invocation.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub callable: Value,
}

impl BoundMethod {
    pub fn new(receiver: Value, callable: Value) -> Self {
        Self { receiver, callable }
    }
}
