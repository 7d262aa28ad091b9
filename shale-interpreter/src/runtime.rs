use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Child;
use std::rc::Rc;

use shale_core::ast::Block;

use crate::builtins;
use crate::error::RuntimeError;
use crate::evaluate::Execute;
use crate::flow::Flow;
use crate::scope::{ScopeStack, SymbolTable, TableKind, TableRef};
use crate::value::Value;

/// Where `print` and friends write; tests swap in a buffer.
#[derive(Debug)]
pub enum OutputSink {
    Stdout,
    Buffer(String),
}

/// The central data structure for the interpreter.
///
/// It owns the main symbol table (every scope stack only holds it weakly),
/// the background job list, the module cache, and the bookkeeping the CLI
/// needs for its exit code.
pub struct Runtime {
    /// The scope stack the current executor resolves names against.
    pub scopes: ScopeStack,
    /// The owning reference to the main table.
    main_holder: TableRef,
    /// The exit status of the last executed command statement.
    pub last_status: i32,
    /// Whether the last executed statement was a command.
    pub last_stmt_was_cmd: bool,
    /// The value of the last expression statement, for the REPL to echo.
    pub last_value: Option<Value>,
    /// The directory imports resolve relative paths against.
    pub base_dir: PathBuf,
    /// The name used when rendering error traces.
    pub script_name: String,
    /// Children spawned with `&`, reaped opportunistically.
    background: Vec<Child>,
    /// Modules already loaded, by canonical path.
    pub(crate) modules: HashMap<PathBuf, Value>,
    /// Module paths currently being loaded, to refuse import cycles.
    pub(crate) importing: Vec<PathBuf>,
    out: OutputSink,
}

impl Runtime {
    /// Initialize a runtime with the builtins bound in its main table.
    pub fn new() -> Self {
        let main: TableRef = Rc::new(RefCell::new(SymbolTable::new(TableKind::Scope)));
        let mut scopes = ScopeStack::with_main(&main);
        scopes.push(main.clone());
        let mut rt = Self {
            scopes,
            main_holder: main,
            last_status: 0,
            last_stmt_was_cmd: false,
            last_value: None,
            base_dir: PathBuf::from("."),
            script_name: "<stdin>".to_string(),
            background: Vec::new(),
            modules: HashMap::new(),
            importing: Vec::new(),
            out: OutputSink::Stdout,
        };
        builtins::install(&mut rt);
        rt
    }

    /// The owning reference to the main table; scope stacks only hold it
    /// weakly, so this keeps it alive while a closure's stack is swapped in.
    pub fn main_table(&self) -> TableRef {
        self.main_holder.clone()
    }

    /// Bind a declaration's name where it belongs: the class table inside a
    /// class body, the function table inside a function, and the main table
    /// (marked global, so function bodies can see it) at the top level.
    pub fn define(&mut self, name: &str, value: Value) {
        if self.scopes.top_kind() == Some(TableKind::Class) {
            self.scopes.set_entry(name, value);
        } else if self.scopes.has_func_table() {
            self.scopes.set_entry_on_func(name, value);
        } else if self.scopes.top_is_main() {
            self.scopes.set_global(name, value);
        } else {
            self.scopes.set_entry(name, value);
        }
    }

    /// Execute a parsed program in the top-level scope.
    pub fn run_program(&mut self, program: &Block) -> Result<(), RuntimeError> {
        for stmt in &program.stmts {
            match stmt.execute(self) {
                Flow::Go => {}
                Flow::Throw(err) => return Err(err),
                // The parser rejects stray break/continue/return.
                _ => unreachable!("loop flow escaped the top level"),
            }
        }
        Ok(())
    }

    /// The exit code the process should finish with: the last command's
    /// status if the program ended on a command statement, otherwise 0.
    pub fn exit_code(&self) -> i32 {
        if self.last_stmt_was_cmd {
            self.last_status
        } else {
            0
        }
    }

    /// Write a line through the configured sink.
    pub fn print(&mut self, text: &str) {
        match &mut self.out {
            OutputSink::Stdout => {
                let stdout = std::io::stdout();
                let mut stdout = stdout.lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            OutputSink::Buffer(buffer) => buffer.push_str(text),
        }
    }

    /// Write a line to stderr (never captured).
    pub fn print_err(&mut self, text: &str) {
        let stderr = std::io::stderr();
        let mut stderr = stderr.lock();
        let _ = stderr.write_all(text.as_bytes());
    }

    /// Redirect `print` output into an internal buffer (used by tests).
    pub fn capture_output(&mut self) {
        self.out = OutputSink::Buffer(String::new());
    }

    /// Take everything printed since the last call.
    pub fn take_output(&mut self) -> String {
        match &mut self.out {
            OutputSink::Stdout => String::new(),
            OutputSink::Buffer(buffer) => std::mem::take(buffer),
        }
    }

    /// Track a backgrounded child process.
    pub fn add_background(&mut self, child: Child) {
        self.background.push(child);
    }

    /// Drop finished background children without blocking.
    pub fn reap_background(&mut self) {
        self.background
            .retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_))));
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
