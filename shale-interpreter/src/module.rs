use std::cell::RefCell;
use std::rc::Rc;

use shale_core::ast::ImportStmt;

use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::flow::Flow;
use crate::runtime::Runtime;
use crate::scope::{ScopeStack, SymbolTable, TableKind, TableRef};
use crate::value::Value;

/// A loaded module: the main table its file produced, exposed read-only
/// through attribute access.
pub struct Module {
    pub name: String,
    pub table: TableRef,
}

impl Module {
    /// Look up a binding exported by the module.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.table.borrow().get(name).map(|attr| attr.value.clone())
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module").field("name", &self.name).finish()
    }
}

/// Load a module: read and parse the file, execute it against a fresh main
/// table, and wrap that table as a module value.
///
/// Modules are cached by canonical path, and import cycles are refused.
pub fn import(rt: &mut Runtime, stmt: &ImportStmt) -> EvalResult<Value> {
    let path = rt.base_dir.join(&stmt.path);
    let canonical = path.canonicalize().map_err(|err| {
        RuntimeError::new(
            ErrorKind::ImportError,
            format!("cannot import '{}': {}", stmt.path, err),
            stmt.pos,
        )
    })?;

    if let Some(module) = rt.modules.get(&canonical) {
        return Ok(module.clone());
    }
    if rt.importing.contains(&canonical) {
        return Err(RuntimeError::new(
            ErrorKind::ImportError,
            format!("circular import of '{}'", stmt.path),
            stmt.pos,
        ));
    }

    let source = std::fs::read_to_string(&canonical).map_err(|err| {
        RuntimeError::new(
            ErrorKind::ImportError,
            format!("cannot import '{}': {}", stmt.path, err),
            stmt.pos,
        )
    })?;
    let program = shale_parser::parse(&source).map_err(|err| {
        RuntimeError::new(
            ErrorKind::ImportError,
            format!("cannot parse '{}': {}", stmt.path, err),
            stmt.pos,
        )
    })?;

    // Execute against a fresh main table with the builtins rebound, then
    // swap the caller's world back in whatever happened.
    let main: TableRef = Rc::new(RefCell::new(SymbolTable::new(TableKind::Scope)));
    let mut scopes = ScopeStack::with_main(&main);
    scopes.push(main.clone());

    let saved_scopes = std::mem::replace(&mut rt.scopes, scopes);
    let saved_dir = std::mem::replace(
        &mut rt.base_dir,
        canonical.parent().map(Into::into).unwrap_or_default(),
    );
    crate::builtins::install(rt);
    rt.importing.push(canonical.clone());

    let mut flow = Flow::Go;
    for module_stmt in &program.stmts {
        flow = crate::evaluate::Execute::execute(module_stmt, rt);
        if !matches!(flow, Flow::Go) {
            break;
        }
    }

    rt.importing.pop();
    rt.base_dir = saved_dir;
    rt.scopes = saved_scopes;

    if let Flow::Throw(err) = flow {
        return Err(RuntimeError::new(
            ErrorKind::ImportError,
            format!("error while importing '{}': {}", stmt.path, err.message),
            stmt.pos,
        ));
    }

    let module = Value::Module(Rc::new(Module {
        name: stmt.name.clone(),
        table: main,
    }));
    rt.modules.insert(canonical, module.clone());
    Ok(module)
}
