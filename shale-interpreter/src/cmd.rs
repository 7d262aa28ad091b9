use std::fs::{File, OpenOptions};
use std::process::{Child, Command, Stdio};
use std::rc::Rc;

use shale_core::ast::{
    AndOrOp, CmdAndOr, CmdFull, CmdIoRedirectList, CmdPiece, CmdWord, IoRedirect, SimpleCmd,
};
use shale_core::pos::Pos;

use crate::dispatch;
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::evaluate::{exec_block_stmts, Evaluate};
use crate::flow::Flow;
use crate::runtime::Runtime;
use crate::scope::{CmdEntry, ScopeStack, TableKind};
use crate::value::Value;

/// The default word delimiter for command output: any whitespace.
pub const DEFAULT_DELIM: &str = " \t\n";

/// The captured result of an external command execution.
#[derive(Debug, Clone)]
pub struct CmdResult {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    /// The delimiter set used when the value is iterated or split.
    pub delim: String,
}

impl CmdResult {
    pub fn new(status: i32, stdout: String, stderr: String) -> Self {
        Self {
            status,
            stdout,
            stderr,
            delim: DEFAULT_DELIM.to_string(),
        }
    }
}

/// How a pipeline's final stage is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    /// Stdout/stderr go to the interpreter's own descriptors.
    Inherit,
    /// The last stage's stdout and stderr are captured into strings.
    Capture,
}

/// Execute a full command statement, waiting unless it is backgrounded.
pub fn exec_full(rt: &mut Runtime, full: &CmdFull) -> EvalResult<i32> {
    rt.reap_background();
    if full.background {
        if !full.cmd.rest.is_empty() {
            return Err(RuntimeError::new(
                ErrorKind::InvalidOpcode,
                "cannot background a command list",
                full.pos,
            ));
        }
        spawn_background(rt, &full.cmd.first.stages, full.pos)?;
        return Ok(0);
    }
    let (status, _, _) = exec_and_or(rt, &full.cmd, OutputMode::Inherit, full.pos)?;
    Ok(status)
}

/// Execute a command substitution and wrap the captured result.
pub fn exec_get_result(rt: &mut Runtime, and_or: &CmdAndOr, pos: Pos) -> EvalResult<Value> {
    rt.reap_background();
    let (status, stdout, stderr) = exec_and_or(rt, and_or, OutputMode::Capture, pos)?;
    Ok(Value::Cmd(Rc::new(std::cell::RefCell::new(CmdResult::new(
        status, stdout, stderr,
    )))))
}

/// Run a single bare word as a command; the fallback for unbound names in
/// statement position.
pub fn exec_bare_word(rt: &mut Runtime, name: &str, pos: Pos) -> EvalResult<i32> {
    rt.reap_background();
    let stage = CmdIoRedirectList {
        cmd: SimpleCmd {
            words: vec![CmdWord {
                pieces: vec![CmdPiece::Lit(name.to_string())],
            }],
            pos,
        },
        redirects: Vec::new(),
    };
    let (status, _, _) = run_pipeline(rt, std::slice::from_ref(&stage), OutputMode::Inherit, pos)?;
    Ok(status)
}

/// Run a `&&`/`||` chain; captured output accumulates across the executed
/// pipelines, the status is the last executed one's.
fn exec_and_or(
    rt: &mut Runtime,
    and_or: &CmdAndOr,
    mode: OutputMode,
    pos: Pos,
) -> EvalResult<(i32, String, String)> {
    let (mut status, mut stdout, mut stderr) =
        run_pipeline(rt, &and_or.first.stages, mode, pos)?;
    for (op, pipeline) in &and_or.rest {
        let run = match op {
            AndOrOp::And => status == 0,
            AndOrOp::Or => status != 0,
        };
        if run {
            let (next_status, out, err) = run_pipeline(rt, &pipeline.stages, mode, pos)?;
            status = next_status;
            stdout.push_str(&out);
            stderr.push_str(&err);
        }
    }
    Ok((status, stdout, stderr))
}

/// The expanded argv of one pipeline stage.
struct Stage {
    argv: Vec<String>,
    redirects: Vec<IoRedirect>,
}

/// Expand a stage's words: alias splicing first, then interpolation,
/// substitution and glob expansion.
fn expand_stage(rt: &mut Runtime, stage: &CmdIoRedirectList, pos: Pos) -> EvalResult<Stage> {
    let mut words: Vec<CmdWord> = Vec::with_capacity(stage.cmd.words.len());
    let mut rest = stage.cmd.words.iter();
    if let Some(first) = rest.next() {
        match word_literal(first).and_then(|name| rt.scopes.lookup_cmd(name)) {
            Some(CmdEntry::Alias(replacement)) => words.extend(replacement),
            _ => words.push(first.clone()),
        }
    }
    words.extend(rest.cloned());

    let mut argv = Vec::with_capacity(words.len());
    for word in &words {
        argv.extend(expand_word(rt, word, pos)?);
    }
    Ok(Stage {
        argv,
        redirects: stage.redirects.clone(),
    })
}

/// The literal text of a word made of a single unquoted piece, used for
/// alias and declared-command lookup.
fn word_literal(word: &CmdWord) -> Option<&str> {
    match word.pieces.as_slice() {
        [CmdPiece::Lit(text)] => Some(text),
        _ => None,
    }
}

/// Render a value into command-word text; sequences join with spaces.
fn word_text(rt: &mut Runtime, value: &Value, pos: Pos) -> EvalResult<String> {
    match value {
        Value::Array(items) => {
            let items = items.borrow().clone();
            let parts: Vec<String> = items
                .iter()
                .map(|item| dispatch::obj_string(rt, item, pos))
                .collect::<EvalResult<_>>()?;
            Ok(parts.join(" "))
        }
        Value::Tuple(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| dispatch::obj_string(rt, item, pos))
                .collect::<EvalResult<_>>()?;
            Ok(parts.join(" "))
        }
        other => dispatch::obj_string(rt, other, pos),
    }
}

/// Expand one word into its argv entries (several when a glob matches).
fn expand_word(rt: &mut Runtime, word: &CmdWord, pos: Pos) -> EvalResult<Vec<String>> {
    let mut text = String::new();
    let mut globbable = false;
    for piece in &word.pieces {
        match piece {
            CmdPiece::Lit(lit) => {
                if lit.contains(['*', '?', '[']) {
                    globbable = true;
                }
                text.push_str(lit);
            }
            CmdPiece::Quoted(quoted) => text.push_str(quoted),
            CmdPiece::Var(name) => {
                // Interpreter bindings first, then the environment.
                let value = rt.scopes.lookup_obj(name);
                match value {
                    Some(value) => text.push_str(&word_text(rt, &value, pos)?),
                    None => match std::env::var(name) {
                        Ok(value) => text.push_str(&value),
                        Err(_) => {
                            return Err(RuntimeError::new(
                                ErrorKind::SymbolNotFound,
                                format!("symbol {} not found", name),
                                pos,
                            ))
                        }
                    },
                }
            }
            CmdPiece::Expr(expr) => {
                let value = expr.evaluate(rt)?;
                text.push_str(&word_text(rt, &value, pos)?);
            }
            CmdPiece::Sub(and_or) => {
                let (_, stdout, _) = exec_and_or(rt, and_or, OutputMode::Capture, pos)?;
                text.push_str(stdout.trim_end_matches('\n'));
            }
        }
    }

    if globbable {
        if let Ok(paths) = glob::glob(&text) {
            let matches: Vec<String> = paths
                .filter_map(Result::ok)
                .map(|path| path.to_string_lossy().into_owned())
                .collect();
            if !matches.is_empty() {
                return Ok(matches);
            }
        }
    }
    Ok(vec![text])
}

/// `[n]> file`: truncate-create; `[n]>> file`: append-create.
fn create_file(path: &str, append: bool, pos: Pos) -> EvalResult<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path).map_err(|err| {
        RuntimeError::new(
            ErrorKind::FileError,
            format!("cannot open '{}': {}", path, err),
            pos,
        )
    })
}

/// `[n]< file`: read-only.
fn read_file(path: &str, pos: Pos) -> EvalResult<File> {
    File::open(path).map_err(|err| {
        RuntimeError::new(
            ErrorKind::FileError,
            format!("cannot open '{}': {}", path, err),
            pos,
        )
    })
}

/// Per-stage wiring state computed from the redirect list.
#[derive(Default)]
struct Wiring {
    stdin: Option<File>,
    stdout: Option<File>,
    stderr: Option<File>,
    /// `2>&1`: stderr follows wherever stdout goes.
    merge_stderr: bool,
}

fn resolve_redirects(rt: &mut Runtime, redirects: &[IoRedirect], pos: Pos) -> EvalResult<Wiring> {
    let mut wiring = Wiring::default();
    for redirect in redirects {
        match redirect {
            IoRedirect::Out { fd, path, append } => {
                let path = expand_word(rt, path, pos)?.join(" ");
                let file = create_file(&path, *append, pos)?;
                match fd {
                    1 => wiring.stdout = Some(file),
                    2 => wiring.stderr = Some(file),
                    other => {
                        return Err(RuntimeError::new(
                            ErrorKind::FileError,
                            format!("unsupported file descriptor {}", other),
                            pos,
                        ))
                    }
                }
            }
            IoRedirect::In { fd, path } => {
                let path = expand_word(rt, path, pos)?.join(" ");
                let file = read_file(&path, pos)?;
                match fd {
                    0 => wiring.stdin = Some(file),
                    other => {
                        return Err(RuntimeError::new(
                            ErrorKind::FileError,
                            format!("unsupported file descriptor {}", other),
                            pos,
                        ))
                    }
                }
            }
            IoRedirect::OutAll { path, append } => {
                let path = expand_word(rt, path, pos)?.join(" ");
                let file = create_file(&path, *append, pos)?;
                wiring.stderr = Some(file.try_clone().map_err(|err| {
                    RuntimeError::new(ErrorKind::FileError, err.to_string(), pos)
                })?);
                wiring.stdout = Some(file);
            }
            IoRedirect::Dup { from: 2, to: 1 } => wiring.merge_stderr = true,
            IoRedirect::Dup { from, to } => {
                return Err(RuntimeError::new(
                    ErrorKind::FileError,
                    format!("unsupported descriptor duplication {}>&{}", from, to),
                    pos,
                ))
            }
        }
    }
    Ok(wiring)
}

/// Spawn a pipeline's stages, wiring stage N's stdout into stage N+1's
/// stdin, and collect the last stage's output according to the mode.
fn run_pipeline(
    rt: &mut Runtime,
    stages: &[CmdIoRedirectList],
    mode: OutputMode,
    pos: Pos,
) -> EvalResult<(i32, String, String)> {
    let expanded: Vec<Stage> = stages
        .iter()
        .map(|stage| expand_stage(rt, stage, pos))
        .collect::<EvalResult<_>>()?;

    // In-process commands only make sense as a lone stage.
    if expanded.len() == 1 {
        let stage = &expanded[0];
        if stage.argv.first().map(String::as_str) == Some("cd") {
            return Ok((exec_cd(rt, &stage.argv), String::new(), String::new()));
        }
        if let Some(CmdEntry::Decl(block)) = stage
            .argv
            .first()
            .and_then(|name| rt.scopes.lookup_cmd(name))
        {
            let status = run_decl(rt, &block, &stage.argv[1..])?;
            return Ok((status, String::new(), String::new()));
        }
    }

    let capture = mode == OutputMode::Capture;
    let last = expanded.len() - 1;
    let mut children: Vec<Option<Child>> = Vec::with_capacity(expanded.len());
    let mut merge_last = false;
    let mut spawn_failure: Option<String> = None;

    for (idx, stage) in expanded.iter().enumerate() {
        if spawn_failure.is_some() {
            break;
        }
        let wiring = resolve_redirects(rt, &stage.redirects, pos)?;
        let mut command = Command::new(&stage.argv[0]);
        command.args(&stage.argv[1..]);

        // stdin: redirect, else the previous stage's pipe.
        if let Some(file) = wiring.stdin {
            command.stdin(Stdio::from(file));
        } else if idx > 0 {
            let upstream = children[idx - 1]
                .as_mut()
                .and_then(|child| child.stdout.take());
            match upstream {
                Some(out) => command.stdin(Stdio::from(out)),
                None => command.stdin(Stdio::null()),
            };
        }

        // stdout: redirect wins over the pipe and over capture.
        let stdout_is_file = wiring.stdout.is_some();
        if let Some(file) = wiring.stdout {
            if wiring.merge_stderr {
                let clone = file.try_clone().map_err(|err| {
                    RuntimeError::new(ErrorKind::FileError, err.to_string(), pos)
                })?;
                command.stderr(Stdio::from(clone));
            }
            command.stdout(Stdio::from(file));
        } else if idx < last || capture {
            command.stdout(Stdio::piped());
        }

        // `2>&1` with stdout on the terminal needs nothing: stderr already
        // shares it. With captured stdout the merge happens post-wait.
        if let Some(file) = wiring.stderr {
            command.stderr(Stdio::from(file));
        } else if idx == last && capture {
            command.stderr(Stdio::piped());
        }
        if idx == last && wiring.merge_stderr {
            merge_last = capture && !stdout_is_file;
        }

        match command.spawn() {
            Ok(child) => children.push(Some(child)),
            Err(err) => {
                spawn_failure = Some(format!("shale: {}: {}", stage.argv[0], err));
                children.push(None);
            }
        }
    }

    // Wait the final stage first: draining its captured output while the
    // upstream stages are still running is what keeps a long pipeline from
    // deadlocking on a full pipe buffer.
    let mut status = 0;
    let mut stdout = String::new();
    let mut stderr = String::new();
    let spawned_all = children.len() == expanded.len();
    let io_error = |err: std::io::Error| RuntimeError::new(ErrorKind::FileError, err.to_string(), pos);
    match children.pop() {
        Some(Some(child)) if spawned_all && capture => {
            let output = child.wait_with_output().map_err(io_error)?;
            check_interrupted(&output.status, pos)?;
            status = output.status.code().unwrap_or(-1);
            stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        }
        Some(Some(mut child)) => {
            let exit = child.wait().map_err(io_error)?;
            check_interrupted(&exit, pos)?;
            if spawned_all {
                status = exit.code().unwrap_or(-1);
            } else {
                status = 127;
            }
        }
        Some(None) | None => status = 127,
    }
    for child in children {
        if let Some(mut child) = child {
            let exit = child.wait().map_err(io_error)?;
            check_interrupted(&exit, pos)?;
        }
    }

    if let Some(message) = spawn_failure {
        status = 127;
        if capture {
            stderr.push_str(&message);
            stderr.push('\n');
        } else {
            rt.print_err(&format!("{}\n", message));
        }
    }
    if merge_last {
        stdout.push_str(&stderr);
        stderr.clear();
    }
    Ok((status, stdout, stderr))
}

/// Spawn a pipeline without waiting; children are reaped opportunistically.
fn spawn_background(rt: &mut Runtime, stages: &[CmdIoRedirectList], pos: Pos) -> EvalResult<()> {
    let expanded: Vec<Stage> = stages
        .iter()
        .map(|stage| expand_stage(rt, stage, pos))
        .collect::<EvalResult<_>>()?;
    let last = expanded.len() - 1;
    let mut previous: Option<Child> = None;
    for (idx, stage) in expanded.iter().enumerate() {
        let wiring = resolve_redirects(rt, &stage.redirects, pos)?;
        let mut command = Command::new(&stage.argv[0]);
        command.args(&stage.argv[1..]);
        if let Some(file) = wiring.stdin {
            command.stdin(Stdio::from(file));
        } else if let Some(out) = previous.as_mut().and_then(|child| child.stdout.take()) {
            command.stdin(Stdio::from(out));
        }
        if let Some(file) = wiring.stdout {
            command.stdout(Stdio::from(file));
        } else if idx < last {
            command.stdout(Stdio::piped());
        }
        if let Some(file) = wiring.stderr {
            command.stderr(Stdio::from(file));
        }
        match command.spawn() {
            Ok(child) => {
                if let Some(done) = previous.replace(child) {
                    rt.add_background(done);
                }
            }
            Err(err) => {
                rt.print_err(&format!("shale: {}: {}\n", stage.argv[0], err));
                break;
            }
        }
    }
    if let Some(child) = previous {
        rt.add_background(child);
    }
    Ok(())
}

/// The `cd` builtin; it must run in the interpreter's own process.
fn exec_cd(rt: &mut Runtime, argv: &[String]) -> i32 {
    let target = match argv.get(1) {
        Some(dir) => dir.clone(),
        None => std::env::var("HOME").unwrap_or_else(|_| "/".to_string()),
    };
    match std::env::set_current_dir(&target) {
        Ok(()) => 0,
        Err(err) => {
            rt.print_err(&format!("shale: cd: {}: {}\n", target, err));
            1
        }
    }
}

/// Run a declared command's block with `args` bound to the remaining words.
fn run_decl(rt: &mut Runtime, block: &shale_core::ast::Block, args: &[String]) -> EvalResult<i32> {
    let mut stack = ScopeStack::with_main(&rt.main_table());
    stack.push_new(TableKind::Func);
    let args: Vec<Value> = args.iter().map(|arg| Value::string(arg.clone())).collect();
    stack.set_entry("args", Value::array(args));

    let saved = std::mem::replace(&mut rt.scopes, stack);
    let flow = exec_block_stmts(block, rt);
    rt.scopes = saved;

    match flow {
        Flow::Go => Ok(0),
        Flow::Return(Value::Integer(status)) => Ok(status as i32),
        Flow::Return(_) => Ok(0),
        Flow::Throw(err) => Err(err),
        Flow::Break | Flow::Continue => unreachable!("loop flow escaped a declared command"),
    }
}

/// SIGINT delivered to a foreground child surfaces as an interpreter error,
/// so a ctrl-C unwinds the script like any other thrown condition.
#[cfg(unix)]
fn check_interrupted(status: &std::process::ExitStatus, pos: Pos) -> EvalResult<()> {
    use std::os::unix::process::ExitStatusExt;
    const SIGINT: i32 = 2;
    if status.signal() == Some(SIGINT) {
        return Err(RuntimeError::new(ErrorKind::Custom, "interrupted", pos));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_interrupted(_status: &std::process::ExitStatus, _pos: Pos) -> EvalResult<()> {
    Ok(())
}
