use std::cell::RefCell;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use shale_core::ast;
use shale_core::ast::{BinOp, Expr, Stmt};

use crate::assign;
use crate::class::Class;
use crate::cmd;
use crate::dispatch;
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::eval;
use crate::flow::Flow;
use crate::function::Function;
use crate::iterator;
use crate::module;
use crate::runtime::Runtime;
use crate::scope::{CmdEntry, SymbolTable, TableKind, TableRef};
use crate::value::{Key, SliceValue, Value};

/// The trait for evaluating expression nodes.
pub trait Evaluate {
    /// Evaluate the node within a given runtime.
    fn evaluate(&self, rt: &mut Runtime) -> EvalResult;
}

/// The trait for executing statement nodes.
pub trait Execute {
    /// Execute the node, producing the stop flag the enclosing construct
    /// inspects.
    fn execute(&self, rt: &mut Runtime) -> Flow;
}

impl Evaluate for Expr {
    fn evaluate(&self, rt: &mut Runtime) -> EvalResult {
        match self {
            Self::Literal(literal, _) => Ok(match literal {
                ast::Literal::Integer(value) => Value::Integer(*value),
                ast::Literal::Real(value) => Value::Real(*value),
                ast::Literal::String(value) => Value::string(value.clone()),
                ast::Literal::Boolean(value) => Value::Boolean(*value),
                ast::Literal::Nil => Value::Nil,
            }),
            Self::Identifier(name, pos) => rt.scopes.lookup_obj(name).ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::SymbolNotFound,
                    format!("symbol {} not found", name),
                    *pos,
                )
            }),
            Self::Unary(op, operand, pos) => {
                let value = operand.evaluate(rt)?;
                dispatch::unary(rt, *op, value, *pos)
            }
            Self::Binary(BinOp::And, lhs, rhs, pos) => {
                let lhs = lhs.evaluate(rt)?;
                // The result is the last evaluated operand, not a coerced
                // boolean.
                if dispatch::truthy(rt, &lhs, *pos)? {
                    rhs.evaluate(rt)
                } else {
                    Ok(lhs)
                }
            }
            Self::Binary(BinOp::Or, lhs, rhs, pos) => {
                let lhs = lhs.evaluate(rt)?;
                if dispatch::truthy(rt, &lhs, *pos)? {
                    Ok(lhs)
                } else {
                    rhs.evaluate(rt)
                }
            }
            Self::Binary(op, lhs, rhs, pos) => {
                let lhs = lhs.evaluate(rt)?;
                let rhs = rhs.evaluate(rt)?;
                dispatch::binary(rt, *op, lhs, rhs, *pos)
            }
            Self::Call { callee, args, pos } => {
                let callee = callee.evaluate(rt)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(rt)?);
                }
                dispatch::call_value(rt, &callee, values, *pos)
            }
            Self::Attribute { object, name, pos } => {
                let object = object.evaluate(rt)?;
                dispatch::attr_get(&object, name, *pos)
            }
            Self::Index { object, index, pos } => {
                let object = object.evaluate(rt)?;
                let index = index.evaluate(rt)?;
                dispatch::get_item(rt, &object, &index, *pos)
            }
            Self::Slice { start, end, pos } => {
                let eval_bound = |rt: &mut Runtime, expr: &Option<Box<Expr>>| -> EvalResult<Option<i64>> {
                    match expr {
                        None => Ok(None),
                        Some(expr) => match expr.evaluate(rt)? {
                            Value::Integer(value) => Ok(Some(value)),
                            other => Err(RuntimeError::new(
                                ErrorKind::IncompatibleType,
                                format!("slice bound must be an int, got '{}'", other.type_name()),
                                *pos,
                            )),
                        },
                    }
                };
                let start = eval_bound(rt, start)?;
                let end = eval_bound(rt, end)?;
                Ok(Value::Slice(SliceValue { start, end }))
            }
            Self::Tuple(items, _) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.evaluate(rt)?);
                }
                Ok(Value::tuple(values))
            }
            Self::Array(items, _) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.evaluate(rt)?);
                }
                Ok(Value::array(values))
            }
            Self::Map(pairs, pos) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key_value = key.evaluate(rt)?;
                    let value = value.evaluate(rt)?;
                    let key = Key::new(key_value).map_err(|err| err.annotate(*pos))?;
                    map.insert(key, value);
                }
                Ok(Value::Map(Rc::new(RefCell::new(map))))
            }
            Self::Set(items, pos) => {
                let mut set = IndexSet::with_capacity(items.len());
                for item in items {
                    let value = item.evaluate(rt)?;
                    set.insert(Key::new(value).map_err(|err| err.annotate(*pos))?);
                }
                Ok(Value::Set(Rc::new(RefCell::new(set))))
            }
            Self::Lambda(decl, _) => {
                let function = Function::from_decl(rt, decl)?;
                Ok(Value::Function(Rc::new(function)))
            }
            Self::CmdSub(and_or, pos) => cmd::exec_get_result(rt, and_or, *pos),
        }
    }
}

impl Execute for Stmt {
    fn execute(&self, rt: &mut Runtime) -> Flow {
        let flow = exec_stmt(self, rt);
        match flow {
            // Annotate the unwinding error with this statement's position.
            Flow::Throw(err) => Flow::Throw(err.annotate(self.pos())),
            flow => flow,
        }
    }
}

fn exec_stmt(stmt: &Stmt, rt: &mut Runtime) -> Flow {
    if !matches!(stmt, Stmt::Cmd(_)) {
        rt.last_stmt_was_cmd = false;
    }
    match stmt {
        Stmt::Expr(expr) => {
            // A bare unbound name falls back to running the command of the
            // same name, so `ls` works without arguments.
            if let Expr::Identifier(name, pos) = expr {
                if rt.scopes.lookup_obj(name).is_none() {
                    let status = eval!(cmd::exec_bare_word(rt, name, *pos));
                    rt.last_status = status;
                    rt.last_stmt_was_cmd = true;
                    rt.last_value = None;
                    return Flow::Go;
                }
            }
            let value = eval!(expr.evaluate(rt));
            rt.last_value = Some(value);
            Flow::Go
        }
        Stmt::Assignment(assign_stmt) => {
            rt.last_value = None;
            eval!(assign::exec(rt, assign_stmt));
            Flow::Go
        }
        Stmt::If(if_stmt) => {
            let cond = eval!(if_stmt.cond.evaluate(rt));
            if eval!(dispatch::truthy(rt, &cond, if_stmt.pos)) {
                if_stmt.then.execute(rt)
            } else if let Some(alt) = &if_stmt.alt {
                alt.execute(rt)
            } else {
                Flow::Go
            }
        }
        Stmt::While(while_stmt) => loop {
            let cond = eval!(while_stmt.cond.evaluate(rt));
            if !eval!(dispatch::truthy(rt, &cond, while_stmt.pos)) {
                break Flow::Go;
            }
            match while_stmt.body.execute(rt) {
                Flow::Go | Flow::Continue => {}
                Flow::Break => break Flow::Go,
                flow => break flow,
            }
        },
        Stmt::ForIn(for_stmt) => {
            let source = eval!(for_stmt.iterable.evaluate(rt));
            let iter = eval!(iterator::iter_value(rt, &source, for_stmt.pos));
            loop {
                if !eval!(iterator::iter_has_next(rt, &iter, for_stmt.pos)) {
                    break Flow::Go;
                }
                let value = eval!(iterator::iter_next(rt, &iter, for_stmt.pos));
                eval!(assign::assign(
                    rt,
                    &for_stmt.targets,
                    vec![value],
                    ast::AssignOp::Assign,
                    false,
                    for_stmt.pos,
                ));
                match for_stmt.body.execute(rt) {
                    Flow::Go | Flow::Continue => {}
                    Flow::Break => break Flow::Go,
                    flow => break flow,
                }
            }
        }
        Stmt::Switch(switch_stmt) => {
            let subject = eval!(switch_stmt.subject.evaluate(rt));
            for case in &switch_stmt.cases {
                for value_expr in &case.values {
                    let value = eval!(value_expr.evaluate(rt));
                    if eval!(dispatch::values_equal(rt, &subject, &value, switch_stmt.pos)) {
                        return match case.body.execute(rt) {
                            Flow::Break => Flow::Go,
                            flow => flow,
                        };
                    }
                }
            }
            match &switch_stmt.default {
                Some(body) => match body.execute(rt) {
                    Flow::Break => Flow::Go,
                    flow => flow,
                },
                None => Flow::Go,
            }
        }
        Stmt::Break(_) => Flow::Break,
        Stmt::Continue(_) => Flow::Continue,
        Stmt::Return(expr, _) => {
            let value = match expr {
                Some(expr) => eval!(expr.evaluate(rt)),
                None => Value::Nil,
            };
            Flow::Return(value)
        }
        Stmt::FuncDecl(decl) => {
            let function = eval!(Function::from_decl(rt, decl));
            let name = decl.name.clone().expect("declared function has a name");
            rt.define(&name, Value::Function(Rc::new(function)));
            Flow::Go
        }
        Stmt::ClassDecl(decl) => exec_class_decl(rt, decl),
        Stmt::Try(try_stmt) => match try_stmt.body.execute(rt) {
            Flow::Throw(err) => {
                rt.scopes.push_new(TableKind::Scope);
                if let Some(name) = &try_stmt.catch_name {
                    rt.scopes.set_entry(name, err.catch_value());
                }
                let flow = exec_block_stmts(&try_stmt.catch_body, rt);
                rt.scopes.pop();
                flow
            }
            flow => flow,
        },
        Stmt::Throw(expr, pos) => {
            let value = eval!(expr.evaluate(rt));
            let message = eval!(dispatch::obj_string(rt, &value, *pos));
            Flow::Throw(RuntimeError::thrown(value, message, *pos))
        }
        Stmt::Import(import_stmt) => {
            let value = eval!(module::import(rt, import_stmt));
            rt.define(&import_stmt.name, value);
            Flow::Go
        }
        Stmt::Alias(decl) => {
            rt.scopes
                .set_cmd(&decl.name, CmdEntry::Alias(decl.words.clone()));
            Flow::Go
        }
        Stmt::CmdDecl(decl) => {
            rt.scopes
                .set_cmd(&decl.name, CmdEntry::Decl(decl.body.clone()));
            Flow::Go
        }
        Stmt::Block(block) => block.execute(rt),
        Stmt::Cmd(full) => {
            rt.last_value = None;
            let status = eval!(cmd::exec_full(rt, full));
            rt.last_status = status;
            rt.last_stmt_was_cmd = true;
            Flow::Go
        }
    }
}

impl Execute for ast::Block {
    fn execute(&self, rt: &mut Runtime) -> Flow {
        rt.scopes.push_new(TableKind::Scope);
        let flow = exec_block_stmts(self, rt);
        rt.scopes.pop();
        flow
    }
}

/// Run a block's statements in the current scope, without pushing one.
pub fn exec_block_stmts(block: &ast::Block, rt: &mut Runtime) -> Flow {
    for stmt in &block.stmts {
        match stmt.execute(rt) {
            Flow::Go => {}
            flow => return flow,
        }
    }
    Flow::Go
}

fn exec_class_decl(rt: &mut Runtime, decl: &ast::ClassDecl) -> Flow {
    let base = match &decl.base {
        Some(expr) => match eval!(expr.evaluate(rt)) {
            Value::Class(class) => Some(class),
            other => {
                return Flow::Throw(RuntimeError::new(
                    ErrorKind::IncompatibleType,
                    format!("base of class must be a class, got '{}'", other.type_name()),
                    decl.pos,
                ))
            }
        },
        None => None,
    };

    // The class body runs in a class-kind table; what it binds becomes the
    // method and attribute tables.
    let table: TableRef = Rc::new(RefCell::new(SymbolTable::new(TableKind::Class)));
    rt.scopes.push(table.clone());
    let flow = exec_block_stmts(&decl.body, rt);
    rt.scopes.pop();
    if let Flow::Throw(err) = flow {
        return Flow::Throw(err);
    }

    let mut methods = IndexMap::new();
    let mut attrs = IndexMap::new();
    for (name, attr) in table.borrow().symbols() {
        match &attr.value {
            Value::Function(_) => {
                methods.insert(name.clone(), attr.value.clone());
            }
            _ => {
                attrs.insert(name.clone(), attr.value.clone());
            }
        }
    }

    let class = Class {
        name: decl.name.clone(),
        base,
        methods,
        attrs,
    };
    rt.define(&decl.name, Value::Class(Rc::new(RefCell::new(class))));
    Flow::Go
}
