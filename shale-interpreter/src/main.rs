//!
//! This is the command-line front-end for the Shale shell-scripting language.
//!
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
#[cfg(feature = "jemalloc")]
use jemallocator::Jemalloc;

mod shell;

use shale_interpreter::runtime::Runtime;
use shale_interpreter::value::Value;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Debug, Clone, PartialEq, Parser)]
#[clap(about, author)]
struct Options {
    /// Script to run.
    #[clap(name = "FILE")]
    file: Option<PathBuf>,

    /// Arguments passed to the script as the global `args` array.
    #[clap(name = "ARGS")]
    args: Vec<String>,

    /// Evaluate a program given on the command line.
    #[clap(short = 'c', long = "command", conflicts_with = "FILE")]
    command: Option<String>,

    /// Enable verbose output (with timing information).
    #[clap(short = 'v')]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let opts: Options = Options::parse();

    let mut rt = Runtime::new();
    let script_args = Value::array(opts.args.iter().cloned().map(Value::string).collect());
    rt.scopes.set_global("args", script_args);

    if let Some(program) = opts.command {
        rt.script_name = "<command>".to_string();
        run_source(&mut rt, &program);
    } else if let Some(file) = opts.file {
        let source = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("could not read '{}': {}", file.display(), err))?;
        rt.script_name = file.display().to_string();
        if let Some(directory) = file.parent() {
            rt.base_dir = directory.to_path_buf();
        }
        run_source(&mut rt, &source);
    } else {
        shell::interactive(&mut rt, opts.verbose)?;
    }

    std::process::exit(rt.exit_code());
}

/// Parse and run a program; parse errors exit 2, unhandled script errors
/// exit 1, and a clean run adopts the last command's status.
fn run_source(rt: &mut Runtime, source: &str) {
    let program = match shale_parser::parse(source) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{}: parse error: {}", rt.script_name, err);
            std::process::exit(2);
        }
    };
    if let Err(err) = rt.run_program(&program) {
        eprintln!("{}", err.render(&rt.script_name));
        std::process::exit(1);
    }
}
