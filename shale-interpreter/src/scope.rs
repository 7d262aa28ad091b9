use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use shale_core::ast::{Block, CmdWord};

use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::value::Value;
use crate::{ShaleRef, ShaleWeakRef};

/// A named cell: the bound value plus its global flag.
///
/// Only entries marked global are visible when a read falls through to the
/// main table from inside a function body.
#[derive(Debug, Clone)]
pub struct SymbolAttr {
    pub value: Value,
    pub global: bool,
}

impl SymbolAttr {
    pub fn new(value: Value, global: bool) -> Self {
        Self { value, global }
    }
}

/// The kind of a symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// A plain block scope.
    Scope,
    /// The parameter/local table of a function invocation.
    Func,
    /// The table a class body executes in.
    Class,
}

/// An entry in the main table's command map.
#[derive(Debug, Clone)]
pub enum CmdEntry {
    /// A user-declared command; the block runs in place of an external program.
    Decl(Rc<Block>),
    /// A textual alias, spliced in front of the remaining words.
    Alias(Vec<CmdWord>),
}

/// A single symbol table: name bindings plus, on the main table, the
/// command-entry map.
#[derive(Debug)]
pub struct SymbolTable {
    kind: TableKind,
    symbols: IndexMap<String, SymbolAttr>,
    cmds: HashMap<String, CmdEntry>,
}

impl SymbolTable {
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            symbols: IndexMap::new(),
            cmds: HashMap::new(),
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<&SymbolAttr> {
        self.symbols.get(name)
    }

    /// Bind a name, preserving the global flag of an existing entry.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.symbols.get_mut(name) {
            Some(attr) => attr.value = value,
            None => {
                self.symbols
                    .insert(name.to_string(), SymbolAttr::new(value, false));
            }
        }
    }

    /// Bind a name with an explicit global flag, overriding any existing one.
    pub fn set_with_flag(&mut self, name: &str, value: Value, global: bool) {
        self.symbols
            .insert(name.to_string(), SymbolAttr::new(value, global));
    }

    pub fn set_cmd(&mut self, name: &str, entry: CmdEntry) {
        self.cmds.insert(name.to_string(), entry);
    }

    pub fn lookup_cmd(&self, name: &str) -> Option<CmdEntry> {
        self.cmds.get(name).cloned()
    }

    /// Iterate the bound names, in insertion order.
    pub fn symbols(&self) -> impl Iterator<Item = (&String, &SymbolAttr)> {
        self.symbols.iter()
    }
}

/// A reference to a shared symbol table.
pub type TableRef = ShaleRef<SymbolTable>;

/// The stack of lexical scopes an executor resolves names against.
///
/// The main table is weakly held; the interpreter root owns it, so it
/// outlives every stack cloned into closures.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    stack: Vec<TableRef>,
    main: ShaleWeakRef<SymbolTable>,
}

impl ScopeStack {
    /// Construct an empty stack referencing the given main table.
    pub fn with_main(main: &TableRef) -> Self {
        Self {
            stack: Vec::new(),
            main: Rc::downgrade(main),
        }
    }

    /// Push an existing table on the stack.
    pub fn push(&mut self, table: TableRef) {
        self.stack.push(table);
    }

    /// Create and push a new table of the given kind.
    pub fn push_new(&mut self, kind: TableKind) {
        self.stack
            .push(Rc::new(std::cell::RefCell::new(SymbolTable::new(kind))));
    }

    /// Pop the top table.
    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// Get the main table; the interpreter root keeps it alive for as long
    /// as any executor can run.
    pub fn main(&self) -> TableRef {
        self.main.upgrade().expect("main table dropped")
    }

    fn top(&self) -> Option<&TableRef> {
        self.stack.last()
    }

    /// Read a name for expression evaluation: the stack top-down, then the
    /// main table, where only entries marked global are visible.
    pub fn lookup_obj(&self, name: &str) -> Option<Value> {
        for table in self.stack.iter().rev() {
            if let Some(attr) = table.borrow().get(name) {
                return Some(attr.value.clone());
            }
        }
        let main = self.main();
        let main = main.borrow();
        match main.get(name) {
            Some(attr) if attr.global => Some(attr.value.clone()),
            _ => None,
        }
    }

    /// Read a name for assignment-target resolution: like [`lookup_obj`],
    /// but main-table hits are unconditional.
    ///
    /// [`lookup_obj`]: ScopeStack::lookup_obj
    pub fn lookup(&self, name: &str) -> Option<Value> {
        for table in self.stack.iter().rev() {
            if let Some(attr) = table.borrow().get(name) {
                return Some(attr.value.clone());
            }
        }
        let main = self.main();
        let main = main.borrow();
        main.get(name).map(|attr| attr.value.clone())
    }

    /// Assign to a name: overwrite it where it resolves, creating it
    /// otherwise.
    ///
    /// Creation binds in the innermost function table when there is one, so
    /// block statements do not leak locals out of their function; at the top
    /// level it binds in the topmost scope (or main when the stack is empty).
    /// From inside a function the main table is only written through when
    /// the existing entry is marked global.
    pub fn assign(&self, name: &str, value: Value) {
        for table in self.stack.iter().rev() {
            let mut table = table.borrow_mut();
            if table.get(name).is_some() {
                table.set(name, value);
                return;
            }
        }
        let has_func = self.has_func_table();
        let main = self.main();
        {
            let mut main = main.borrow_mut();
            if let Some(attr) = main.get(name) {
                if !has_func || attr.global {
                    main.set(name, value);
                    return;
                }
            }
        }
        // Inside a class body, new names belong to the class table.
        if self.top_kind() == Some(TableKind::Class) {
            self.set_entry(name, value);
        } else if has_func {
            self.set_entry_on_func(name, value);
        } else {
            match self.top() {
                Some(table) => table.borrow_mut().set(name, value),
                None => main.borrow_mut().set(name, value),
            }
        }
    }

    /// The kind of the topmost table.
    pub fn top_kind(&self) -> Option<TableKind> {
        self.top().map(|table| table.borrow().kind())
    }

    /// Whether the topmost table is the main table itself.
    pub fn top_is_main(&self) -> bool {
        match (self.top(), self.main.upgrade()) {
            (Some(top), Some(main)) => Rc::ptr_eq(top, &main),
            _ => false,
        }
    }

    /// Read a name for a compound assignment; absent names fail rather than
    /// get created.
    pub fn lookup_for_compound(&self, name: &str) -> EvalResult<Value> {
        self.lookup(name).ok_or_else(|| {
            RuntimeError::bare(
                ErrorKind::SymbolNotFound,
                format!("symbol {} not found", name),
            )
        })
    }

    /// Bind a name in the topmost table (or main when the stack is empty).
    pub fn set_entry(&self, name: &str, value: Value) {
        match self.top() {
            Some(table) => table.borrow_mut().set(name, value),
            None => self.main().borrow_mut().set(name, value),
        }
    }

    /// Bind a name in the innermost function table.
    pub fn set_entry_on_func(&self, name: &str, value: Value) {
        for table in self.stack.iter().rev() {
            if table.borrow().kind() == TableKind::Func {
                table.borrow_mut().set(name, value);
                return;
            }
        }
    }

    /// Bind a name in the main table, marked global.
    pub fn set_global(&self, name: &str, value: Value) {
        self.main().borrow_mut().set_with_flag(name, value, true);
    }

    /// Whether any table on the stack is a function table.
    pub fn has_func_table(&self) -> bool {
        self.stack
            .iter()
            .any(|table| table.borrow().kind() == TableKind::Func)
    }

    /// Whether any table on the stack is a class table.
    pub fn has_class_table(&self) -> bool {
        self.stack
            .iter()
            .any(|table| table.borrow().kind() == TableKind::Class)
    }

    /// The tables from the bottom of the stack up to and including the first
    /// table of the given kind; all of them when none matches.
    ///
    /// Closure construction captures this slice, shared, so mutations made
    /// through either side stay visible to both. The main table never enters
    /// the slice: closures reach it through their weak handle, which keeps
    /// the main table from owning the closures it stores.
    pub fn until_table(&self, kind: TableKind) -> Vec<TableRef> {
        let main = self.main.upgrade();
        let mut tables = Vec::new();
        for table in &self.stack {
            if matches!(&main, Some(main) if Rc::ptr_eq(table, main)) {
                continue;
            }
            let is_boundary = table.borrow().kind() == kind;
            tables.push(table.clone());
            if is_boundary {
                break;
            }
        }
        tables
    }

    /// Look up a command entry on the main table.
    pub fn lookup_cmd(&self, name: &str) -> Option<CmdEntry> {
        self.main().borrow().lookup_cmd(name)
    }

    /// Register a command entry on the main table.
    pub fn set_cmd(&self, name: &str, entry: CmdEntry) {
        self.main().borrow_mut().set_cmd(name, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn new_table(kind: TableKind) -> TableRef {
        Rc::new(RefCell::new(SymbolTable::new(kind)))
    }

    fn stack_with_main() -> (TableRef, ScopeStack) {
        let main = new_table(TableKind::Scope);
        let mut scopes = ScopeStack::with_main(&main);
        scopes.push(main.clone());
        (main, scopes)
    }

    #[test]
    fn created_symbol_binds_in_top_table() {
        let (main, scopes) = stack_with_main();
        let mut scopes = scopes;
        scopes.push_new(TableKind::Scope);
        scopes.assign("x", Value::Integer(1));
        assert!(main.borrow().get("x").is_none());
        assert!(matches!(scopes.lookup("x"), Some(Value::Integer(1))));
        scopes.pop();
        assert!(scopes.lookup("x").is_none());
    }

    #[test]
    fn creation_inside_function_binds_on_func_table() {
        let (_main, mut scopes) = stack_with_main();
        scopes.push_new(TableKind::Func);
        scopes.push_new(TableKind::Scope);
        scopes.assign("x", Value::Integer(1));
        scopes.pop();
        // Still visible after the block scope is gone.
        assert!(matches!(scopes.lookup("x"), Some(Value::Integer(1))));
    }

    #[test]
    fn main_reads_from_functions_require_global() {
        let (main, scopes) = stack_with_main();
        main.borrow_mut().set("hidden", Value::Integer(1));
        main.borrow_mut()
            .set_with_flag("shown", Value::Integer(2), true);

        let mut inner = ScopeStack::with_main(&main);
        inner.push_new(TableKind::Func);
        assert!(inner.lookup_obj("hidden").is_none());
        assert!(matches!(inner.lookup_obj("shown"), Some(Value::Integer(2))));
        // Assignment-target resolution reaches main unconditionally.
        assert!(matches!(scopes.lookup("hidden"), Some(Value::Integer(1))));
    }

    #[test]
    fn global_assignment_from_function_writes_main() {
        let (main, _scopes) = stack_with_main();
        main.borrow_mut()
            .set_with_flag("count", Value::Integer(0), true);

        let mut inner = ScopeStack::with_main(&main);
        inner.push_new(TableKind::Func);
        inner.assign("count", Value::Integer(5));
        match main.borrow().get("count") {
            Some(attr) => assert!(matches!(attr.value, Value::Integer(5))),
            None => panic!("count should still be bound in main"),
        };
    }

    #[test]
    fn capture_stops_at_first_func_table() {
        let (_main, mut scopes) = stack_with_main();
        scopes.push_new(TableKind::Func);
        scopes.push_new(TableKind::Scope);
        let captured = scopes.until_table(TableKind::Func);
        // The function table, but neither the inner block scope nor main.
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].borrow().kind(), TableKind::Func);
    }
}
