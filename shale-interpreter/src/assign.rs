use shale_core::ast::{AssignOp, AssignmentStmt, BinOp, Expr};
use shale_core::pos::Pos;

use crate::dispatch;
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::evaluate::Evaluate;
use crate::iterator;
use crate::runtime::Runtime;
use crate::value::Value;

/// Execute an assignment statement: evaluate the right side, then push the
/// values down into the left-side locations.
pub fn exec(rt: &mut Runtime, stmt: &AssignmentStmt) -> EvalResult<()> {
    let mut values = Vec::with_capacity(stmt.values.len());
    for expr in &stmt.values {
        values.push(expr.evaluate(rt)?);
    }
    assign(rt, &stmt.targets, values, stmt.op, stmt.global, stmt.pos)
}

/// Distribute right-side values over the left-side expressions.
///
/// Sizes must agree, except that a single left side packs the values into a
/// tuple and a single right side gets unpacked by iteration.
pub fn assign(
    rt: &mut Runtime,
    targets: &[Expr],
    mut values: Vec<Value>,
    op: AssignOp,
    global: bool,
    pos: Pos,
) -> EvalResult<()> {
    if targets.len() != 1 && values.len() != 1 && targets.len() != values.len() {
        return Err(RuntimeError::new(
            ErrorKind::IncompatibleType,
            "different size of tuples",
            pos,
        ));
    }

    if targets.len() == 1 && values.len() == 1 {
        assign_one(rt, &targets[0], values.remove(0), op, global)
    } else if targets.len() == 1 {
        let tuple = Value::tuple(values);
        assign_one(rt, &targets[0], tuple, op, global)
    } else if values.len() == 1 {
        let rvalues = unpack(rt, &values[0], pos)?;
        if targets.len() != rvalues.len() {
            return Err(RuntimeError::new(
                ErrorKind::IncompatibleType,
                format!(
                    "unpack values size different from left values (expected {}, got {})",
                    targets.len(),
                    rvalues.len()
                ),
                pos,
            ));
        }
        for (target, value) in targets.iter().zip(rvalues) {
            assign_one(rt, target, value, op, global)?;
        }
        Ok(())
    } else {
        for (target, value) in targets.iter().zip(values) {
            assign_one(rt, target, value, op, global)?;
        }
        Ok(())
    }
}

/// Unpack a value into a sequence: tuples and arrays directly, everything
/// else by draining its iterator.
pub fn unpack(rt: &mut Runtime, value: &Value, pos: Pos) -> EvalResult<Vec<Value>> {
    match value {
        Value::Tuple(items) => Ok(items.as_ref().clone()),
        Value::Array(items) => Ok(items.borrow().clone()),
        other => iterator::collect_values(rt, other, pos),
    }
}

fn bin_op(op: AssignOp) -> Option<BinOp> {
    match op {
        AssignOp::Assign => None,
        AssignOp::Add => Some(BinOp::Add),
        AssignOp::Sub => Some(BinOp::Sub),
        AssignOp::Mul => Some(BinOp::Mul),
        AssignOp::Div => Some(BinOp::Div),
        AssignOp::Mod => Some(BinOp::Mod),
        AssignOp::BitAnd => Some(BinOp::BitAnd),
        AssignOp::BitOr => Some(BinOp::BitOr),
        AssignOp::BitXor => Some(BinOp::BitXor),
        AssignOp::Shl => Some(BinOp::Shl),
        AssignOp::Shr => Some(BinOp::Shr),
    }
}

fn assign_one(
    rt: &mut Runtime,
    target: &Expr,
    value: Value,
    op: AssignOp,
    global: bool,
) -> EvalResult<()> {
    match target {
        Expr::Identifier(name, pos) => assign_identifier(rt, name, value, op, global, *pos),
        Expr::Attribute { object, name, pos } => {
            let object = object.evaluate(rt)?;
            let value = match bin_op(op) {
                // Two-call protocol: read the attribute, apply the operation,
                // write it back.
                Some(op) => {
                    let current = dispatch::attr_get(&object, name, *pos)?;
                    dispatch::binary(rt, op, current, value, *pos)?
                }
                None => value,
            };
            dispatch::attr_set(&object, name, value, *pos)
        }
        Expr::Index {
            object,
            index,
            pos,
        } => {
            let object = object.evaluate(rt)?;
            let index = index.evaluate(rt)?;
            let value = match bin_op(op) {
                Some(op) => {
                    let current = dispatch::get_item(rt, &object, &index, *pos)?;
                    dispatch::binary(rt, op, current, value, *pos)?
                }
                None => value,
            };
            dispatch::set_item(rt, &object, &index, value, *pos)
        }
        Expr::Tuple(items, pos) | Expr::Array(items, pos) => {
            if items.is_empty() {
                return Err(RuntimeError::new(
                    ErrorKind::IncompatibleType,
                    "tuple can't be empty in assignment operation",
                    *pos,
                ));
            }
            let rvalues = unpack(rt, &value, *pos)?;
            if items.len() != rvalues.len() {
                return Err(RuntimeError::new(
                    ErrorKind::IncompatibleType,
                    format!(
                        "unpack values size different from left values (expected {}, got {})",
                        items.len(),
                        rvalues.len()
                    ),
                    *pos,
                ));
            }
            for (item, rvalue) in items.iter().zip(rvalues) {
                assign_one(rt, item, rvalue, op, global)?;
            }
            Ok(())
        }
        other => Err(RuntimeError::new(
            ErrorKind::IncompatibleType,
            "not valid left side expression",
            other.pos(),
        )),
    }
}

fn assign_identifier(
    rt: &mut Runtime,
    name: &str,
    value: Value,
    op: AssignOp,
    global: bool,
    pos: Pos,
) -> EvalResult<()> {
    match bin_op(op) {
        Some(op) => {
            let current = rt
                .scopes
                .lookup_for_compound(name)
                .map_err(|err| err.annotate(pos))?;
            let value = dispatch::binary(rt, op, current, value, pos)?;
            if global {
                rt.scopes.set_global(name, value);
            } else {
                rt.scopes.assign(name, value);
            }
            Ok(())
        }
        None => {
            if global {
                rt.scopes.set_global(name, value);
            } else {
                rt.scopes.assign(name, value);
            }
            Ok(())
        }
    }
}
